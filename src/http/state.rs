use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::nats::StatusPublisher;
use crate::session::{SessionEngine, TaskConfig, TaskSessionController};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Task sessions (task_id → controller)
    pub sessions: Arc<RwLock<HashMap<String, Arc<TaskSessionController>>>>,

    /// Builds controllers for new sessions
    pub engine: SessionEngine,

    /// Known tasks; a request naming one of these inherits its settings
    pub catalog: Arc<Vec<TaskConfig>>,

    /// Mirrors every session's status to NATS when enabled
    pub publisher: Option<Arc<StatusPublisher>>,
}

impl AppState {
    pub fn new(engine: SessionEngine, catalog: Vec<TaskConfig>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            engine,
            catalog: Arc::new(catalog),
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<StatusPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub async fn session(&self, task_id: &str) -> Option<Arc<TaskSessionController>> {
        self.sessions.read().await.get(task_id).cloned()
    }
}
