use std::sync::Arc;

use docvault_core::{BackupRecord, EngineError};
use docvault_storage::{RecordStore, StatusStats};
use uuid::Uuid;

/// Read-only query surface over the record store, consumed by whatever
/// fronts the engine (an API layer, a CLI, the daemon).
#[derive(Clone)]
pub struct BackupCatalog {
    records: Arc<dyn RecordStore>,
}

impl BackupCatalog {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    pub async fn get(&self, id: Uuid) -> Result<BackupRecord, EngineError> {
        self.records
            .get(id)
            .await
            .map_err(EngineError::Store)?
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<BackupRecord>, EngineError> {
        self.records
            .list_recent(limit)
            .await
            .map_err(EngineError::Store)
    }

    pub async fn list_scheduled(&self) -> Result<Vec<BackupRecord>, EngineError> {
        self.records.list_scheduled().await.map_err(EngineError::Store)
    }

    pub async fn stats(&self) -> Result<Vec<StatusStats>, EngineError> {
        self.records
            .stats_by_status()
            .await
            .map_err(EngineError::Store)
    }
}
