use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for artifacts and the record database.
    pub root: Option<String>,
    /// Record/document database path; defaults to `<root>/docvault.db`.
    pub database_path: Option<String>,
    pub retention_days: Option<i64>,
    pub max_backups_to_keep: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between due-job checks; defaults to 60.
    pub tick_secs: Option<u64>,
}

/// One recurring backup job.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobConfig {
    pub name: String,
    pub collections: Vec<String>,
    pub excluded_collections: Vec<String>,
    pub compression: bool,
    pub encryption_key: Option<String>,
    /// Seconds between runs; defaults to hourly.
    pub interval_secs: Option<u64>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading config file {path:?}"))?;
    toml::from_str(&contents).with_context(|| format!("parsing config file {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_sections_missing() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.storage.root.is_none());
        assert!(cfg.scheduler.tick_secs.is_none());
        assert!(cfg.jobs.is_empty());
    }

    #[test]
    fn parses_jobs_and_storage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[storage]
root = "/var/lib/docvault"
retention_days = 30

[scheduler]
tick_secs = 300

[[jobs]]
name = "nightly"
excluded_collections = ["sessions"]
compression = true
interval_secs = 86400

[[jobs]]
name = "secrets"
collections = ["credentials"]
encryption_key = "hunter2"
"#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.storage.root.as_deref(), Some("/var/lib/docvault"));
        assert_eq!(cfg.storage.retention_days, Some(30));
        assert_eq!(cfg.scheduler.tick_secs, Some(300));
        assert_eq!(cfg.jobs.len(), 2);
        assert_eq!(cfg.jobs[0].name, "nightly");
        assert_eq!(cfg.jobs[0].excluded_collections, vec!["sessions"]);
        assert!(cfg.jobs[0].compression);
        assert_eq!(cfg.jobs[0].interval_secs, Some(86400));
        assert_eq!(cfg.jobs[1].collections, vec!["credentials"]);
        assert_eq!(cfg.jobs[1].encryption_key.as_deref(), Some("hunter2"));
    }
}
