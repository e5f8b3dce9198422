//! Financial Document Analyzer
//!
//! This library provides the core functionality for the financial-analyzer
//! system: an HTTP front end that accepts document uploads, a Redis-backed
//! job queue, a worker that runs a sequential multi-agent analysis pipeline,
//! and a SQLite store holding users and analysis history.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod services;
