pub mod backup;
pub mod catalog;
pub mod restore;
pub mod retention;
pub mod verify;

pub use backup::{BackupOrchestrator, DEFAULT_LARGE_COLLECTION_THRESHOLD};
pub use catalog::BackupCatalog;
pub use restore::{RestoreOrchestrator, RestoreOutcome};
pub use retention::{PurgeOutcome, RetentionManager};
pub use verify::{ChecksumVerifier, VerifyOutcome};
