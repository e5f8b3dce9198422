use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000"). Unused by worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SQLite connection string for the persistent store
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Redis connection string for the job queue and task-state channel
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Gemini API key for the analysis pipeline
    pub gemini_api_key: String,

    /// Serper API key for the web-search tool; search is skipped when absent
    #[serde(default)]
    pub serper_api_key: Option<String>,

    /// Directory for transient uploaded documents
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Expiry window for queue-held task results, in seconds
    #[serde(default = "default_result_expires_secs")]
    pub result_expires_secs: u64,

    /// Request body limit for document uploads, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_database_url() -> String {
    "sqlite://financial_analyzer.db".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_upload_dir() -> String {
    "data".to_string()
}

fn default_result_expires_secs() -> u64 {
    3600
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
