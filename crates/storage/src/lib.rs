pub mod artifact_store;
pub mod audit;
pub mod document_store;
pub mod record_store;
pub mod sqlite_document_store;
pub mod sqlite_record_store;

pub use artifact_store::ArtifactStore;
pub use audit::{AuditEvent, AuditLevel, AuditLog, MemoryAuditLog, TracingAuditLog};
pub use document_store::{DocumentStore, MemoryDocumentStore};
pub use record_store::{MemoryRecordStore, RecordStore, StatusStats};
pub use sqlite_document_store::SqliteDocumentStore;
pub use sqlite_record_store::SqliteRecordStore;
