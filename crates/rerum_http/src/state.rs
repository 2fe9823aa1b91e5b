//! Shared handler state and the blocking bridge into core services.

use crate::error::ApiError;
use rerum_core::{DocumentService, RerumConfig, ServiceResult, SqliteDocumentRepository};
use rusqlite::Connection;
use std::sync::{Arc, Mutex, PoisonError};

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    conn: Arc<Mutex<Connection>>,
    config: Arc<RerumConfig>,
}

impl AppState {
    /// Wraps a migrated connection and the process configuration.
    pub fn new(conn: Connection, config: RerumConfig) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RerumConfig {
        &self.config
    }

    /// Runs one service call on the blocking pool.
    ///
    /// The connection lock is held for the whole call, so each use-case sees
    /// a consistent store. A panic in an earlier call leaves no open
    /// transaction behind, so a poisoned lock is taken over.
    pub(crate) async fn run<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&mut DocumentService<'_, SqliteDocumentRepository<'_>>) -> ServiceResult<T>
            + Send
            + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let config = Arc::clone(&self.config);
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            let repo = SqliteDocumentRepository::new(&mut guard);
            let mut service = DocumentService::new(repo, &config);
            op(&mut service).map_err(ApiError::from)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(err) => Err(ApiError::internal(format!("storage task failed: {err}"))),
        }
    }
}
