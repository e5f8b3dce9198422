mod app_state;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{documents::DocumentStore, llm::GeminiClient, queue::TaskQueue, tools::ToolSet};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing financial-analyzer server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "analysis_processing_seconds",
        "Time to run the analysis pipeline for one job"
    );
    metrics::describe_counter!("analysis_jobs_total", "Total analysis jobs submitted");
    metrics::describe_counter!(
        "analysis_jobs_completed",
        "Total analysis jobs completed successfully"
    );
    metrics::describe_counter!("analysis_jobs_failed", "Total analysis jobs that failed");
    metrics::describe_counter!(
        "analysis_jobs_retried",
        "Total delayed retries scheduled after rate limiting"
    );
    metrics::describe_gauge!(
        "analysis_queue_depth",
        "Current number of ready jobs in the queue"
    );

    // Initialize database
    tracing::info!("Connecting to SQLite store");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = TaskQueue::new(&config.redis_url, config.result_expires_secs)
        .expect("Failed to initialize job queue");

    // Transient upload store and pipeline collaborators
    let documents = DocumentStore::new(&config.upload_dir);
    let llm = GeminiClient::new(&config.gemini_api_key);
    let tools = ToolSet::new(config.serper_api_key.clone());

    // Create shared application state
    let state = AppState::new(db_pool, queue, documents, llm, tools);

    // Build API routes
    let app = Router::new()
        .route("/", get(routes::analyze::root))
        .route("/health", get(routes::health::health_check))
        .route("/analyze", post(routes::analyze::submit_analysis))
        .route("/status/{task_id}", get(routes::analyze::get_task_status))
        .route("/analyses", get(routes::analyses::list_analyses))
        .route("/analyses/stats", get(routes::analyses::analysis_stats))
        .route(
            "/analyses/{task_id}",
            get(routes::analyses::get_analysis).delete(routes::analyses::delete_analysis),
        )
        .route(
            "/users",
            post(routes::users::create_user).get(routes::users::list_users),
        )
        .route(
            "/users/{user_id}",
            get(routes::users::get_user).delete(routes::users::delete_user),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    tracing::info!("Starting financial-analyzer on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
