use std::sync::Arc;

use docvault_core::{artifact_checksum, BackupStatus, EngineError};
use docvault_storage::{ArtifactStore, AuditEvent, AuditLevel, AuditLog, RecordStore};
use serde_json::json;
use uuid::Uuid;

use crate::restore::unwrap_artifact;

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub verified: bool,
    pub checksum: String,
}

/// Proves a completed artifact is still readable end to end and records its
/// digest. Reverses the same stages as restore but discards the payload;
/// never touches the document store.
pub struct ChecksumVerifier {
    records: Arc<dyn RecordStore>,
    artifacts: ArtifactStore,
    audit: Arc<dyn AuditLog>,
}

impl ChecksumVerifier {
    pub fn new(
        records: Arc<dyn RecordStore>,
        artifacts: ArtifactStore,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            records,
            artifacts,
            audit,
        }
    }

    pub async fn verify_backup(
        &self,
        backup_id: Uuid,
        key: Option<&str>,
        actor: &str,
    ) -> Result<VerifyOutcome, EngineError> {
        match self.run(backup_id, key, actor).await {
            Ok(outcome) => {
                self.audit.record(
                    AuditEvent::new(
                        AuditLevel::Info,
                        "verify.completed",
                        "artifact verified".to_owned(),
                        actor,
                    )
                    .resource(backup_id)
                    .metadata(json!({"checksum": outcome.checksum})),
                );
                Ok(outcome)
            }
            // Fatal: the record's verification fields stay unset.
            Err(err) => {
                self.audit.record(
                    AuditEvent::new(
                        AuditLevel::Error,
                        "verify.failed",
                        format!("verification failed: {err}"),
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
    ) -> Result<VerifyOutcome, EngineError> {
        let mut record = self
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
        // Digest covers the raw stored bytes, envelopes included.
        let checksum = artifact_checksum(&bytes);

        // Prove the artifact decodes all the way down, then discard it.
        unwrap_artifact(bytes, &record.key_ref, record.id, key)?;

        record.mark_verified(checksum.clone(), actor)?;
        self.records
            .update(&record)
            .await
            .map_err(EngineError::Store)?;

        Ok(VerifyOutcome {
            verified: true,
            checksum,
        })
    }
}
