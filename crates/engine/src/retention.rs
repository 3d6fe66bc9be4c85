use std::sync::Arc;

use chrono::{Duration, Utc};
use docvault_core::{EngineError, RetentionPolicy};
use docvault_storage::{ArtifactStore, AuditEvent, AuditLevel, AuditLog, RecordStore};
use serde_json::json;

#[derive(Debug, Clone, Copy)]
pub struct PurgeOutcome {
    pub deleted: usize,
}

/// Deletes expired terminal backups and their artifacts.
pub struct RetentionManager {
    records: Arc<dyn RecordStore>,
    artifacts: ArtifactStore,
    audit: Arc<dyn AuditLog>,
}

impl RetentionManager {
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

    /// Purge terminal records created strictly before `now - days_to_keep`.
    /// A record created exactly at the cutoff survives. When
    /// `max_backups_to_keep` is non-zero, terminal records beyond the newest
    /// N are purged as well. A single artifact's delete failure is
    /// recoverable: the warning is logged, the record is still removed, and
    /// the pass continues.
    pub async fn purge_expired(
        &self,
        policy: RetentionPolicy,
        actor: &str,
    ) -> Result<PurgeOutcome, EngineError> {
        let cutoff = Utc::now() - Duration::days(policy.days_to_keep);
        let mut candidates = self
            .records
            .list_terminal_created_before(cutoff)
            .await
            .map_err(EngineError::Store)?;

        if policy.max_backups_to_keep > 0 {
            let terminal = self
                .records
                .list_terminal()
                .await
                .map_err(EngineError::Store)?;
            for excess in terminal
                .into_iter()
                .skip(policy.max_backups_to_keep as usize)
            {
                if !candidates.iter().any(|c| c.id == excess.id) {
                    candidates.push(excess);
                }
            }
        }

        let mut deleted = 0usize;
        for record in candidates {
            if let Some(location) = &record.location {
                if let Err(err) = self.artifacts.delete(location) {
                    self.audit.record(
                        AuditEvent::new(
                            AuditLevel::Warning,
                            "retention.artifact_delete_failed",
                            format!("could not delete artifact for {}: {err:#}", record.id),
                            actor,
                        )
                        .resource(record.id)
                        .metadata(json!({"location": location})),
                    );
                }
            }

            if self
                .records
                .delete(record.id)
                .await
                .map_err(EngineError::Store)?
            {
                deleted += 1;
                self.audit.record(
                    AuditEvent::new(
                        AuditLevel::Info,
                        "retention.purged",
                        format!("purged backup {}", record.name),
                        actor,
                    )
                    .resource(record.id),
                );
            }
        }

        self.audit.record(
            AuditEvent::new(
                AuditLevel::Info,
                "retention.completed",
                format!("retention pass removed {deleted} backups"),
                actor,
            )
            .metadata(json!({
                "deleted": deleted,
                "days_to_keep": policy.days_to_keep,
                "max_backups_to_keep": policy.max_backups_to_keep,
            })),
        );
        Ok(PurgeOutcome { deleted })
    }
}
