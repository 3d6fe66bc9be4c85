use thiserror::Error;
use uuid::Uuid;

use crate::record::{BackupKind, BackupStatus};

/// Operation-level error taxonomy for the backup/restore pipeline.
///
/// Per-item failures (a single collection read during backup, a single
/// artifact delete during retention purge) are recoverable and never surface
/// here; the orchestrators log them and continue. Everything below aborts the
/// operation it occurs in.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backup {0} not found")]
    NotFound(Uuid),

    #[error("backup {id} has status {status}, expected completed")]
    Precondition { id: Uuid, status: BackupStatus },

    #[error("backup kind {0} is not implemented; only full backups are supported")]
    UnsupportedKind(BackupKind),

    #[error("encryption requested but no key supplied")]
    MissingKey,

    #[error("supplied key does not match the key used to create backup {0}")]
    KeyMismatch(Uuid),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: BackupStatus, to: BackupStatus },

    #[error("artifact encode/decode failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unsupported artifact format version {0}")]
    FormatVersion(u32),

    #[error("compression stage failed: {0}")]
    Archive(String),

    #[error("decryption failed (wrong key or corrupted artifact)")]
    Decrypt,

    #[error("artifact storage: {0}")]
    Artifact(#[source] anyhow::Error),

    #[error("record store: {0}")]
    Store(#[source] anyhow::Error),

    #[error("document store: {0}")]
    Documents(#[source] anyhow::Error),

    #[error(
        "restore of collection {collection:?} failed after {restored:?} were already replaced: {message}"
    )]
    PartialRestore {
        collection: String,
        restored: Vec<String>,
        message: String,
    },
}
