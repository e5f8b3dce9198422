use sqlx::SqlitePool;
use std::sync::Arc;

use crate::services::{documents::DocumentStore, llm::GeminiClient, queue::TaskQueue, tools::ToolSet};

/// Shared application state passed to route handlers and the worker.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub queue: Arc<TaskQueue>,
    pub documents: Arc<DocumentStore>,
    pub llm: Arc<GeminiClient>,
    pub tools: Arc<ToolSet>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        queue: TaskQueue,
        documents: DocumentStore,
        llm: GeminiClient,
        tools: ToolSet,
    ) -> Self {
        Self {
            db,
            queue: Arc::new(queue),
            documents: Arc::new(documents),
            llm: Arc::new(llm),
            tools: Arc::new(tools),
        }
    }
}
