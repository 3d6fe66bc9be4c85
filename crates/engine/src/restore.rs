use std::sync::Arc;
use std::time::Instant;

use docvault_core::{archive, cipher, codec, BackupStatus, EngineError};
use docvault_storage::{ArtifactStore, AuditEvent, AuditLevel, AuditLog, DocumentStore, RecordStore};
use serde_json::json;
use uuid::Uuid;

/// Result of a fully successful restore.
#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub success: bool,
    pub duration_ms: i64,
    /// Collections whose contents were replaced, in restore order.
    pub collections: Vec<String>,
}

/// Reverses the backup pipeline and replaces the document store's contents.
///
/// Restore is destructive and not transactional across collections: when a
/// later collection fails, earlier ones stay replaced. The error carries the
/// list of collections already replaced so callers can see the partial state.
pub struct RestoreOrchestrator {
    documents: Arc<dyn DocumentStore>,
    records: Arc<dyn RecordStore>,
    artifacts: ArtifactStore,
    audit: Arc<dyn AuditLog>,
}

impl RestoreOrchestrator {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        records: Arc<dyn RecordStore>,
        artifacts: ArtifactStore,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            documents,
            records,
            artifacts,
            audit,
        }
    }

    pub async fn restore_backup(
        &self,
        backup_id: Uuid,
        key: Option<&str>,
        actor: &str,
    ) -> Result<RestoreOutcome, EngineError> {
        match self.run(backup_id, key, actor).await {
            Ok(outcome) => {
                self.audit.record(
                    AuditEvent::new(
                        AuditLevel::Info,
                        "restore.completed",
                        format!("restored {} collections", outcome.collections.len()),
                        actor,
                    )
                    .resource(backup_id)
                    .metadata(json!({
                        "duration_ms": outcome.duration_ms,
                        "collections": outcome.collections,
                    })),
                );
                Ok(outcome)
            }
            Err(err) => {
                self.audit.record(
                    AuditEvent::new(
                        AuditLevel::Error,
                        "restore.failed",
                        format!("restore failed: {err}"),
                        actor,
                    )
                    .resource(backup_id),
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        backup_id: Uuid,
        key: Option<&str>,
        actor: &str,
    ) -> Result<RestoreOutcome, EngineError> {
        let start = Instant::now();

        let record = self
            .records
            .get(backup_id)
            .await
            .map_err(EngineError::Store)?
            .ok_or(EngineError::NotFound(backup_id))?;
        if record.status != BackupStatus::Completed {
            return Err(EngineError::Precondition {
                id: record.id,
                status: record.status,
            });
        }
        let location = record
            .location
            .as_deref()
            .ok_or(EngineError::NotFound(backup_id))?;

        let bytes = self.artifacts.read(location).map_err(EngineError::Artifact)?;
        let payload = unwrap_artifact(bytes, &record.key_ref, record.id, key)?;

        let mut restored: Vec<String> = Vec::new();
        for (name, documents) in payload.collections {
            let count = documents.len();
            match self.documents.replace_all(&name, documents).await {
                Ok(()) => {
                    self.audit.record(
                        AuditEvent::new(
                            AuditLevel::Info,
                            "restore.collection_replaced",
                            format!("replaced collection {name}"),
                            actor,
                        )
                        .resource(record.id)
                        .metadata(json!({"collection": name, "documents": count})),
                    );
                    restored.push(name);
                }
                // Fatal on first failure; collections already replaced stay
                // replaced, the rest keep their pre-restore contents.
                Err(err) => {
                    return Err(EngineError::PartialRestore {
                        collection: name,
                        restored,
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        Ok(RestoreOutcome {
            success: true,
            duration_ms: start.elapsed().as_millis() as i64,
            collections: restored,
        })
    }
}

/// Peel the encryption and compression envelopes off stored artifact bytes
/// and decode the inner payload. Shared by restore and verify.
pub(crate) fn unwrap_artifact(
    bytes: Vec<u8>,
    key_ref: &Option<String>,
    backup_id: Uuid,
    key: Option<&str>,
) -> Result<codec::ArtifactPayload, EngineError> {
    let mut bytes = bytes;
    if cipher::is_encrypted(&bytes) {
        let key = key.ok_or(EngineError::MissingKey)?;
        if let Some(expected) = key_ref {
            if cipher::key_fingerprint(key) != *expected {
                return Err(EngineError::KeyMismatch(backup_id));
            }
        }
        bytes = cipher::decrypt(&bytes, key)?;
    }
    if archive::is_compressed(&bytes) {
        bytes = archive::decompress(&bytes)?;
    }
    codec::decode(&bytes)
}
