use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use docvault_core::{BackupRecord, BackupStatus};
use uuid::Uuid;

/// Aggregate statistics for one status bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusStats {
    pub status: BackupStatus,
    pub count: u64,
    pub total_size_bytes: i64,
    pub avg_duration_ms: Option<f64>,
}

/// BackupRecord persistence, implemented by SQLite and in-memory backends.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &BackupRecord) -> Result<()>;

    /// Overwrite the stored record. Callers go through the state-machine
    /// helpers on BackupRecord before persisting.
    async fn update(&self, record: &BackupRecord) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<BackupRecord>>;

    /// Newest-first, capped at `limit`.
    async fn list_recent(&self, limit: u32) -> Result<Vec<BackupRecord>>;

    /// Records carrying an enabled schedule.
    async fn list_scheduled(&self) -> Result<Vec<BackupRecord>>;

    /// Terminal (completed or failed) records created strictly before
    /// `cutoff`, oldest first. Retention purge candidates.
    async fn list_terminal_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BackupRecord>>;

    /// All terminal records, newest first. Used for max-count retention.
    async fn list_terminal(&self) -> Result<Vec<BackupRecord>>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Count, total artifact size and mean duration grouped by status.
    async fn stats_by_status(&self) -> Result<Vec<StatusStats>>;
}

fn is_purgeable(status: BackupStatus) -> bool {
    matches!(status, BackupStatus::Completed | BackupStatus::Failed)
}

/// In-memory record store for tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<Uuid, BackupRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_newest_first(&self) -> Vec<BackupRecord> {
        let mut records: Vec<BackupRecord> =
            self.records.lock().unwrap().values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &BackupRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &BackupRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BackupRecord>> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<BackupRecord>> {
        let mut records = self.sorted_newest_first();
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn list_scheduled(&self) -> Result<Vec<BackupRecord>> {
        Ok(self
            .sorted_newest_first()
            .into_iter()
            .filter(|r| r.schedule.as_ref().is_some_and(|s| s.enabled))
            .collect())
    }

    async fn list_terminal_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BackupRecord>> {
        let mut records: Vec<BackupRecord> = self
            .sorted_newest_first()
            .into_iter()
            .filter(|r| is_purgeable(r.status) && r.created_at < cutoff)
            .collect();
        records.reverse();
        Ok(records)
    }

    async fn list_terminal(&self) -> Result<Vec<BackupRecord>> {
        Ok(self
            .sorted_newest_first()
            .into_iter()
            .filter(|r| is_purgeable(r.status))
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.records.lock().unwrap().remove(&id).is_some())
    }

    async fn stats_by_status(&self) -> Result<Vec<StatusStats>> {
        let records = self.records.lock().unwrap();
        let mut buckets: BTreeMap<&'static str, (BackupStatus, u64, i64, Vec<i64>)> =
            BTreeMap::new();
        for record in records.values() {
            let bucket = buckets.entry(record.status.as_str()).or_insert((
                record.status,
                0,
                0,
                Vec::new(),
            ));
            bucket.1 += 1;
            bucket.2 += record.size_bytes.unwrap_or(0);
            if let Some(duration) = record.duration_ms {
                bucket.3.push(duration);
            }
        }
        Ok(buckets
            .into_values()
            .map(|(status, count, total_size_bytes, durations)| StatusStats {
                status,
                count,
                total_size_bytes,
                avg_duration_ms: if durations.is_empty() {
                    None
                } else {
                    Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use docvault_core::{BackupSchedule, CreateBackupRequest, ScheduleFrequency};

    fn record() -> BackupRecord {
        BackupRecord::new(&CreateBackupRequest::default(), None, "tester")
    }

    #[tokio::test]
    async fn insert_get_delete() {
        let store = MemoryRecordStore::new();
        let r = record();
        store.insert(&r).await.unwrap();
        assert_eq!(store.get(r.id).await.unwrap().unwrap().id, r.id);
        assert!(store.delete(r.id).await.unwrap());
        assert!(!store.delete(r.id).await.unwrap());
        assert!(store.get(r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_capped() {
        let store = MemoryRecordStore::new();
        let mut oldest = record();
        oldest.created_at = Utc::now() - Duration::hours(2);
        let mut middle = record();
        middle.created_at = Utc::now() - Duration::hours(1);
        let newest = record();
        for r in [&oldest, &middle, &newest] {
            store.insert(r).await.unwrap();
        }

        let recent = store.list_recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, newest.id);
        assert_eq!(recent[1].id, middle.id);
    }

    #[tokio::test]
    async fn scheduled_listing_requires_enabled() {
        let store = MemoryRecordStore::new();
        let mut on = record();
        on.schedule = Some(BackupSchedule {
            frequency: ScheduleFrequency::Daily,
            time: Some("02:00".to_owned()),
            day_of_week: None,
            day_of_month: None,
            enabled: true,
        });
        let mut off = record();
        off.schedule = Some(BackupSchedule {
            frequency: ScheduleFrequency::Daily,
            time: None,
            day_of_week: None,
            day_of_month: None,
            enabled: false,
        });
        let plain = record();
        for r in [&on, &off, &plain] {
            store.insert(r).await.unwrap();
        }

        let scheduled = store.list_scheduled().await.unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].id, on.id);
    }

    #[tokio::test]
    async fn terminal_cutoff_is_strict() {
        let store = MemoryRecordStore::new();
        let cutoff = Utc::now();

        let mut at_cutoff = record();
        at_cutoff.status = BackupStatus::Completed;
        at_cutoff.created_at = cutoff;

        let mut older = record();
        older.status = BackupStatus::Failed;
        older.created_at = cutoff - Duration::seconds(1);

        let mut pending_old = record();
        pending_old.created_at = cutoff - Duration::days(400);

        for r in [&at_cutoff, &older, &pending_old] {
            store.insert(r).await.unwrap();
        }

        let doomed = store.list_terminal_created_before(cutoff).await.unwrap();
        assert_eq!(doomed.len(), 1);
        assert_eq!(doomed[0].id, older.id);
    }

    #[tokio::test]
    async fn stats_group_by_status() {
        let store = MemoryRecordStore::new();
        let mut done = record();
        done.status = BackupStatus::Completed;
        done.size_bytes = Some(100);
        done.duration_ms = Some(50);
        let mut done2 = record();
        done2.status = BackupStatus::Completed;
        done2.size_bytes = Some(300);
        done2.duration_ms = Some(150);
        let failed = record();
        for r in [&done, &done2, &failed] {
            store.insert(r).await.unwrap();
        }

        let stats = store.stats_by_status().await.unwrap();
        let completed = stats
            .iter()
            .find(|s| s.status == BackupStatus::Completed)
            .unwrap();
        assert_eq!(completed.count, 2);
        assert_eq!(completed.total_size_bytes, 400);
        assert_eq!(completed.avg_duration_ms, Some(100.0));

        let pending = stats
            .iter()
            .find(|s| s.status == BackupStatus::Pending)
            .unwrap();
        assert_eq!(pending.count, 1);
        assert_eq!(pending.avg_duration_ms, None);
    }
}
