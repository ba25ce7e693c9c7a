//! Shared application state for the Axum server.

use std::sync::Arc;

use labpush_common::config::AppConfig;
use labpush_engine::PushWorker;
use labpush_engine::store::RecordStore;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<PushWorker>,
    pub store: Arc<dyn RecordStore>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(worker: Arc<PushWorker>, store: Arc<dyn RecordStore>, config: AppConfig) -> Self {
        Self {
            worker,
            store,
            config,
        }
    }
}
