use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

/// Version of the innermost serialized payload. Bumped on any change to the
/// payload structure; `decode` rejects versions it does not know.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

pub type Document = Value;

/// The innermost artifact layer: every successfully-read collection keyed by
/// name. A BTreeMap keeps the encoding canonical so identical inputs produce
/// identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    pub format_version: u32,
    pub store_version: String,
    pub collections: BTreeMap<String, Vec<Document>>,
}

impl ArtifactPayload {
    pub fn new(store_version: &str) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            store_version: store_version.to_owned(),
            collections: BTreeMap::new(),
        }
    }

    pub fn total_documents(&self) -> u64 {
        self.collections.values().map(|docs| docs.len() as u64).sum()
    }
}

pub fn encode(payload: &ArtifactPayload) -> Result<Vec<u8>, EngineError> {
    Ok(serde_json::to_vec(payload)?)
}

pub fn decode(bytes: &[u8]) -> Result<ArtifactPayload, EngineError> {
    let payload: ArtifactPayload = serde_json::from_slice(bytes)?;
    if payload.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(EngineError::FormatVersion(payload.format_version));
    }
    Ok(payload)
}
