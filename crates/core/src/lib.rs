pub mod archive;
pub mod checksum;
pub mod cipher;
pub mod codec;
pub mod error;
pub mod record;

pub use checksum::artifact_checksum;
pub use codec::{ArtifactPayload, Document, ARTIFACT_FORMAT_VERSION};
pub use error::EngineError;
pub use record::{
    BackupFailure, BackupKind, BackupMetadata, BackupRecord, BackupSchedule, BackupStatus,
    CreateBackupRequest, RetentionPolicy, ScheduleFrequency, ARTIFACT_FORMAT,
};
