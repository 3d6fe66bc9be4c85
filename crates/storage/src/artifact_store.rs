use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// Filesystem-backed artifact storage. Artifacts live under
/// `<root>/artifacts/`; records hold locations relative to the root so the
/// whole tree can be relocated.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("artifacts")).context("create artifacts directory")?;
        Ok(Self { root })
    }

    /// Path-safe artifact file name for a new backup.
    pub fn artifact_name(id: Uuid, now: DateTime<Utc>) -> String {
        let stamp = now
            .to_rfc3339_opts(SecondsFormat::Secs, true)
            .replace(':', "-");
        format!("{stamp}-{id}.dvlt")
    }

    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let location = format!("artifacts/{name}");
        let path = self.root.join(&location);
        fs::write(&path, bytes).with_context(|| format!("write artifact: {}", path.display()))?;
        Ok(location)
    }

    pub fn read(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.root.join(location);
        fs::read(&path).with_context(|| format!("read artifact: {}", path.display()))
    }

    pub fn delete(&self, location: &str) -> Result<()> {
        let path = self.root.join(location);
        fs::remove_file(&path).with_context(|| format!("delete artifact: {}", path.display()))
    }

    pub fn path(&self, location: &str) -> PathBuf {
        self.root.join(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path()).unwrap();

        let name = ArtifactStore::artifact_name(Uuid::new_v4(), Utc::now());
        let location = store.write(&name, b"artifact bytes").unwrap();
        assert!(location.starts_with("artifacts/"));
        assert_eq!(store.read(&location).unwrap(), b"artifact bytes");

        store.delete(&location).unwrap();
        assert!(store.read(&location).is_err());
        assert!(store.delete(&location).is_err());
    }

    #[test]
    fn artifact_name_is_path_safe() {
        let now = DateTime::parse_from_rfc3339("2026-02-13T01:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let name = ArtifactStore::artifact_name(Uuid::nil(), now);
        assert!(name.starts_with("2026-02-13T01-00-00Z-"));
        assert!(name.ends_with(".dvlt"));
        assert!(!Path::new(&name).has_root());
        assert!(!name.contains(':'));
    }
}
