use std::sync::Arc;

use chrono::Utc;
use docvault_core::codec::{self, ArtifactPayload};
use docvault_core::{
    archive, cipher, BackupFailure, BackupKind, BackupMetadata, BackupRecord,
    CreateBackupRequest, EngineError,
};
use docvault_storage::{ArtifactStore, AuditEvent, AuditLevel, AuditLog, DocumentStore, RecordStore};
use serde_json::json;

/// Collections with more documents than this emit a progress audit event
/// while being read.
pub const DEFAULT_LARGE_COLLECTION_THRESHOLD: usize = 10_000;

/// Drives the full backup pipeline: record state machine, collection
/// selection, per-collection failure isolation, compress-then-encrypt
/// layering, and artifact persistence.
pub struct BackupOrchestrator {
    documents: Arc<dyn DocumentStore>,
    records: Arc<dyn RecordStore>,
    artifacts: ArtifactStore,
    audit: Arc<dyn AuditLog>,
    large_collection_threshold: usize,
}

impl BackupOrchestrator {
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
            large_collection_threshold: DEFAULT_LARGE_COLLECTION_THRESHOLD,
        }
    }

    pub fn with_large_collection_threshold(mut self, threshold: usize) -> Self {
        self.large_collection_threshold = threshold;
        self
    }

    /// Run one backup attempt end to end.
    ///
    /// Invalid requests (non-full kind, encryption without a key) are
    /// rejected before any record is persisted. After the record exists,
    /// a single collection's read failure is recoverable; everything else
    /// marks the record failed and propagates.
    pub async fn create_backup(
        &self,
        request: CreateBackupRequest,
        actor: &str,
    ) -> Result<BackupRecord, EngineError> {
        let kind = request.kind.unwrap_or(BackupKind::Full);
        if kind != BackupKind::Full {
            return Err(EngineError::UnsupportedKind(kind));
        }
        if request.encryption && request.encryption_key.is_none() {
            return Err(EngineError::MissingKey);
        }
        let key_ref = if request.encryption {
            request
                .encryption_key
                .as_deref()
                .map(cipher::key_fingerprint)
        } else {
            None
        };

        let mut record = BackupRecord::new(&request, key_ref, actor);
        self.records
            .insert(&record)
            .await
            .map_err(EngineError::Store)?;
        self.audit.record(
            AuditEvent::new(
                AuditLevel::Info,
                "backup.created",
                format!("backup {} created", record.name),
                actor,
            )
            .resource(record.id),
        );

        record.begin()?;
        self.records
            .update(&record)
            .await
            .map_err(EngineError::Store)?;
        self.audit.record(
            AuditEvent::new(
                AuditLevel::Info,
                "backup.started",
                format!("backup {} in progress", record.name),
                actor,
            )
            .resource(record.id),
        );

        match self.run_pipeline(&record, &request, actor).await {
            Ok((location, size_bytes, metadata)) => {
                record.complete(location, size_bytes, metadata)?;
                self.records
                    .update(&record)
                    .await
                    .map_err(EngineError::Store)?;
                self.audit.record(
                    AuditEvent::new(
                        AuditLevel::Info,
                        "backup.completed",
                        format!("backup {} completed", record.name),
                        actor,
                    )
                    .resource(record.id)
                    .metadata(json!({
                        "size_bytes": record.size_bytes,
                        "duration_ms": record.duration_ms,
                        "collections": record.metadata.as_ref().map(|m| m.total_collections),
                        "documents": record.metadata.as_ref().map(|m| m.total_documents),
                    })),
                );
                Ok(record)
            }
            Err(err) => {
                record.fail(BackupFailure {
                    message: err.to_string(),
                    code: failure_code(&err).to_owned(),
                })?;
                self.records
                    .update(&record)
                    .await
                    .map_err(EngineError::Store)?;
                self.audit.record(
                    AuditEvent::new(
                        AuditLevel::Error,
                        "backup.failed",
                        format!("backup {} failed: {err}", record.name),
                        actor,
                    )
                    .resource(record.id),
                );
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        record: &BackupRecord,
        request: &CreateBackupRequest,
        actor: &str,
    ) -> Result<(String, i64, BackupMetadata), EngineError> {
        let available = if record.collections.is_empty() {
            self.documents
                .list_collections()
                .await
                .map_err(EngineError::Documents)?
        } else {
            Vec::new()
        };
        let selected = record.resolve_selection(&available);

        let mut payload = ArtifactPayload::new(&self.documents.version());
        for name in &selected {
            match self.documents.read_all(name).await {
                Ok(documents) => {
                    if documents.len() > self.large_collection_threshold {
                        self.audit.record(
                            AuditEvent::new(
                                AuditLevel::Info,
                                "backup.collection_progress",
                                format!("read large collection {name}"),
                                actor,
                            )
                            .resource(record.id)
                            .metadata(json!({"collection": name, "documents": documents.len()})),
                        );
                    }
                    payload.collections.insert(name.clone(), documents);
                }
                // Recoverable: the collection is omitted, the backup goes on.
                Err(err) => {
                    self.audit.record(
                        AuditEvent::new(
                            AuditLevel::Warning,
                            "backup.collection_skipped",
                            format!("skipping collection {name}: {err:#}"),
                            actor,
                        )
                        .resource(record.id)
                        .metadata(json!({"collection": name, "error": err.to_string()})),
                    );
                }
            }
        }

        let mut bytes = codec::encode(&payload)?;
        // Fixed ordering: compressing ciphertext gains nothing, so the
        // compression envelope always sits inside the encryption envelope.
        if record.compression {
            bytes = archive::compress(&bytes)?;
        }
        if record.encryption {
            let key = request
                .encryption_key
                .as_deref()
                .ok_or(EngineError::MissingKey)?;
            bytes = cipher::encrypt(&bytes, key)?;
        }

        let name = ArtifactStore::artifact_name(record.id, Utc::now());
        let location = self
            .artifacts
            .write(&name, &bytes)
            .map_err(EngineError::Artifact)?;

        let metadata = BackupMetadata {
            total_documents: payload.total_documents(),
            total_collections: payload.collections.len() as u64,
            store_version: self.documents.version(),
            artifact_format_version: codec::ARTIFACT_FORMAT_VERSION,
        };
        Ok((location, bytes.len() as i64, metadata))
    }
}

fn failure_code(err: &EngineError) -> &'static str {
    match err {
        EngineError::Codec(_) | EngineError::FormatVersion(_) => "serialize",
        EngineError::Archive(_) => "compress",
        EngineError::Decrypt => "encrypt",
        EngineError::Artifact(_) => "artifact_write",
        EngineError::Documents(_) => "document_read",
        EngineError::Store(_) => "record_store",
        _ => "internal",
    }
}
