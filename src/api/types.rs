//! Shared API state and request-scoped context.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use super::ApiError;
use crate::db::sqlite::open_database;
use crate::pipeline::dedup::DuplicateQueue;
use crate::pipeline::extraction::ChatClient;
use crate::pipeline::ocr::OcrEngine;

/// Shared state injected into every handler.
///
/// SQLite connections are opened per request; only the path is shared.
/// Duplicate review queues live in memory, one per tenant, replaced
/// wholesale by each preview run.
#[derive(Clone)]
pub struct ApiContext {
    pub db_path: Arc<PathBuf>,
    pub ocr: Arc<dyn OcrEngine>,
    pub llm: Arc<dyn ChatClient>,
    pub duplicate_queues: Arc<Mutex<HashMap<i64, DuplicateQueue>>>,
}

impl ApiContext {
    pub fn new(db_path: PathBuf, ocr: Arc<dyn OcrEngine>, llm: Arc<dyn ChatClient>) -> Self {
        Self {
            db_path: Arc::new(db_path),
            ocr,
            llm,
            duplicate_queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open a connection for the current request.
    pub fn open_db(&self) -> Result<Connection, ApiError> {
        Ok(open_database(&self.db_path)?)
    }
}

/// Tenant identity resolved by the tenant middleware, available to
/// handlers as a request extension.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub tenant_id: i64,
}

/// Run blocking work (SQLite, reqwest::blocking) off the async runtime.
pub async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("blocking task failed: {e}")))?
}
