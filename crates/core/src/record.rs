use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Artifact format identifier stored on every record.
pub const ARTIFACT_FORMAT: &str = "docvault/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::InProgress => "in_progress",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
            BackupStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BackupStatus::Completed | BackupStatus::Failed | BackupStatus::Cancelled
        )
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Full,
    Incremental,
    Differential,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::Incremental => "incremental",
            BackupKind::Differential => "differential",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success-only counters, populated when a backup completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub total_documents: u64,
    pub total_collections: u64,
    pub store_version: String,
    pub artifact_format_version: u32,
}

/// Failure details, populated when a backup fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFailure {
    pub message: String,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Terminal records older than this many days are purge candidates.
    pub days_to_keep: i64,
    /// When non-zero, only the newest N terminal records are kept.
    pub max_backups_to_keep: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            days_to_keep: 90,
            max_backups_to_keep: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

/// Declarative trigger configuration. The engine never acts on this; the
/// daemon's scheduler (or any external scheduler) consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSchedule {
    pub frequency: ScheduleFrequency,
    /// "HH:MM" wall-clock time for daily and coarser frequencies.
    pub time: Option<String>,
    pub day_of_week: Option<u8>,
    pub day_of_month: Option<u8>,
    pub enabled: bool,
}

/// Caller-facing configuration for one backup attempt.
#[derive(Debug, Clone, Default)]
pub struct CreateBackupRequest {
    pub name: Option<String>,
    pub kind: Option<BackupKind>,
    pub collections: Vec<String>,
    pub excluded_collections: Vec<String>,
    pub compression: bool,
    pub encryption: bool,
    /// Required when `encryption` is set; never persisted.
    pub encryption_key: Option<String>,
    pub schedule: Option<BackupSchedule>,
    pub retention: Option<RetentionPolicy>,
}

/// One row per backup attempt. Mutated only through the transition helpers
/// below, which enforce the status state machine and keep the
/// populated-iff-completed / populated-iff-failed invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub name: String,
    pub kind: BackupKind,
    pub status: BackupStatus,

    pub location: Option<String>,
    pub format: String,
    pub size_bytes: Option<i64>,
    pub compression: bool,
    pub encryption: bool,
    /// Fingerprint of the encryption passphrase; the secret itself is never
    /// stored. Restore and verify check the caller-supplied key against this.
    pub key_ref: Option<String>,

    pub collections: Vec<String>,
    pub excluded_collections: Vec<String>,

    pub metadata: Option<BackupMetadata>,
    pub schedule: Option<BackupSchedule>,
    pub retention: RetentionPolicy,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,

    pub error: Option<BackupFailure>,

    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub checksum: Option<String>,

    pub created_by: String,
}

impl BackupRecord {
    /// Construct a pending record from a validated request.
    pub fn new(request: &CreateBackupRequest, key_ref: Option<String>, created_by: &str) -> Self {
        let now = Utc::now();
        let kind = request.kind.unwrap_or(BackupKind::Full);
        let name = request
            .name
            .clone()
            .unwrap_or_else(|| default_name(kind, now));
        Self {
            id: Uuid::new_v4(),
            name,
            kind,
            status: BackupStatus::Pending,
            location: None,
            format: ARTIFACT_FORMAT.to_owned(),
            size_bytes: None,
            compression: request.compression,
            encryption: request.encryption,
            key_ref,
            collections: request.collections.clone(),
            excluded_collections: request.excluded_collections.clone(),
            metadata: None,
            schedule: request.schedule.clone(),
            retention: request.retention.unwrap_or_default(),
            created_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error: None,
            verified: false,
            verified_at: None,
            verified_by: None,
            checksum: None,
            created_by: created_by.to_owned(),
        }
    }

    /// Enforce the status state machine: pending -> in_progress ->
    /// {completed, failed}; cancellation is representable from the two
    /// non-terminal statuses; terminal statuses admit nothing.
    pub fn transition(&mut self, next: BackupStatus) -> Result<(), EngineError> {
        let ok = matches!(
            (self.status, next),
            (BackupStatus::Pending, BackupStatus::InProgress)
                | (BackupStatus::Pending, BackupStatus::Cancelled)
                | (BackupStatus::InProgress, BackupStatus::Completed)
                | (BackupStatus::InProgress, BackupStatus::Failed)
                | (BackupStatus::InProgress, BackupStatus::Cancelled)
        );
        if !ok {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn begin(&mut self) -> Result<(), EngineError> {
        self.transition(BackupStatus::InProgress)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(
        &mut self,
        location: String,
        size_bytes: i64,
        metadata: BackupMetadata,
    ) -> Result<(), EngineError> {
        self.transition(BackupStatus::Completed)?;
        let now = Utc::now();
        self.location = Some(location);
        self.size_bytes = Some(size_bytes);
        self.metadata = Some(metadata);
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds());
        Ok(())
    }

    pub fn fail(&mut self, failure: BackupFailure) -> Result<(), EngineError> {
        self.transition(BackupStatus::Failed)?;
        self.error = Some(failure);
        Ok(())
    }

    /// Record a successful verification. Only valid on completed records.
    pub fn mark_verified(&mut self, checksum: String, verified_by: &str) -> Result<(), EngineError> {
        if self.status != BackupStatus::Completed {
            return Err(EngineError::Precondition {
                id: self.id,
                status: self.status,
            });
        }
        self.verified = true;
        self.verified_at = Some(Utc::now());
        self.verified_by = Some(verified_by.to_owned());
        self.checksum = Some(checksum);
        Ok(())
    }

    /// Effective collection selection: the explicit include list wins when
    /// non-empty; otherwise everything available minus the exclude list.
    pub fn resolve_selection(&self, available: &[String]) -> Vec<String> {
        resolve_selection(&self.collections, &self.excluded_collections, available)
    }
}

pub fn resolve_selection(
    collections: &[String],
    excluded: &[String],
    available: &[String],
) -> Vec<String> {
    let mut selected: Vec<String> = if !collections.is_empty() {
        collections.to_vec()
    } else {
        available
            .iter()
            .filter(|name| !excluded.contains(name))
            .cloned()
            .collect()
    };
    selected.sort();
    selected.dedup();
    selected
}

fn default_name(kind: BackupKind, now: DateTime<Utc>) -> String {
    format!("{}-{}", kind, now.format("%Y%m%dT%H%M%SZ"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateBackupRequest {
        CreateBackupRequest {
            compression: true,
            ..CreateBackupRequest::default()
        }
    }

    #[test]
    fn new_record_is_pending_with_generated_name() {
        let record = BackupRecord::new(&request(), None, "tester");
        assert_eq!(record.status, BackupStatus::Pending);
        assert!(record.name.starts_with("full-"));
        assert_eq!(record.created_by, "tester");
        assert_eq!(record.retention, RetentionPolicy::default());
        assert!(record.size_bytes.is_none());
        assert!(record.error.is_none());
    }

    #[test]
    fn explicit_name_is_kept() {
        let mut req = request();
        req.name = Some("nightly".to_owned());
        let record = BackupRecord::new(&req, None, "tester");
        assert_eq!(record.name, "nightly");
    }

    #[test]
    fn happy_path_transitions() {
        let mut record = BackupRecord::new(&request(), None, "tester");
        record.begin().unwrap();
        assert_eq!(record.status, BackupStatus::InProgress);
        assert!(record.started_at.is_some());

        record
            .complete(
                "artifacts/x.dvlt".to_owned(),
                42,
                BackupMetadata {
                    total_documents: 3,
                    total_collections: 1,
                    store_version: "sqlite".to_owned(),
                    artifact_format_version: 1,
                },
            )
            .unwrap();
        assert_eq!(record.status, BackupStatus::Completed);
        assert_eq!(record.size_bytes, Some(42));
        assert!(record.duration_ms.is_some());
        assert!(record.metadata.is_some());
        assert!(record.error.is_none());
    }

    #[test]
    fn failure_populates_error_only() {
        let mut record = BackupRecord::new(&request(), None, "tester");
        record.begin().unwrap();
        record
            .fail(BackupFailure {
                message: "disk full".to_owned(),
                code: "artifact_write".to_owned(),
            })
            .unwrap();
        assert_eq!(record.status, BackupStatus::Failed);
        assert!(record.error.is_some());
        assert!(record.size_bytes.is_none());
        assert!(record.duration_ms.is_none());
        assert!(record.metadata.is_none());
    }

    #[test]
    fn cannot_reenter_pending_or_leave_terminal() {
        let mut record = BackupRecord::new(&request(), None, "tester");
        record.begin().unwrap();
        assert!(matches!(
            record.transition(BackupStatus::Pending),
            Err(EngineError::InvalidTransition { .. })
        ));
        record.transition(BackupStatus::Completed).unwrap();
        assert!(matches!(
            record.transition(BackupStatus::InProgress),
            Err(EngineError::InvalidTransition { .. })
        ));
        assert!(matches!(
            record.transition(BackupStatus::Failed),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn cannot_complete_without_begin() {
        let mut record = BackupRecord::new(&request(), None, "tester");
        let err = record.transition(BackupStatus::Completed);
        assert!(matches!(err, Err(EngineError::InvalidTransition { .. })));
    }

    #[test]
    fn verify_requires_completed() {
        let mut record = BackupRecord::new(&request(), None, "tester");
        assert!(matches!(
            record.mark_verified("abc".to_owned(), "tester"),
            Err(EngineError::Precondition { .. })
        ));

        record.begin().unwrap();
        record
            .complete(
                "artifacts/x.dvlt".to_owned(),
                1,
                BackupMetadata {
                    total_documents: 0,
                    total_collections: 0,
                    store_version: "mem".to_owned(),
                    artifact_format_version: 1,
                },
            )
            .unwrap();
        record.mark_verified("abc".to_owned(), "auditor").unwrap();
        assert!(record.verified);
        assert_eq!(record.verified_by.as_deref(), Some("auditor"));
        assert_eq!(record.checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn selection_precedence() {
        let available = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];

        // Explicit includes win, excludes ignored.
        let selected = resolve_selection(
            &["a".to_owned()],
            &["a".to_owned(), "b".to_owned()],
            &available,
        );
        assert_eq!(selected, vec!["a".to_owned()]);

        // No includes: complement of excludes.
        let selected = resolve_selection(&[], &["b".to_owned()], &available);
        assert_eq!(selected, vec!["a".to_owned(), "c".to_owned()]);

        // Neither: everything.
        let selected = resolve_selection(&[], &[], &available);
        assert_eq!(selected, available);
    }

    #[test]
    fn terminal_statuses() {
        assert!(BackupStatus::Completed.is_terminal());
        assert!(BackupStatus::Failed.is_terminal());
        assert!(BackupStatus::Cancelled.is_terminal());
        assert!(!BackupStatus::Pending.is_terminal());
        assert!(!BackupStatus::InProgress.is_terminal());
    }
}
