pub mod analyses;
pub mod analyze;
pub mod health;
pub mod metrics;
pub mod users;
