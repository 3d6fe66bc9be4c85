use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use docvault_core::{
    BackupFailure, BackupKind, BackupMetadata, BackupRecord, BackupSchedule, BackupStatus,
    RetentionPolicy,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::record_store::{RecordStore, StatusStats};

const SELECT_COLUMNS: &str = "id, name, kind, status, location, format, size_bytes, compression, \
     encryption, key_ref, collections_json, excluded_json, metadata_json, schedule_json, \
     retention_days, retention_max, created_at, started_at, completed_at, duration_ms, \
     error_json, verified, verified_at, verified_by, checksum, created_by";

/// SQLite-backed record store. Each method opens a fresh connection on a
/// blocking thread. Timestamps are stored as fixed-width RFC3339 strings so
/// cutoff comparisons can run in SQL.
pub struct SqliteRecordStore {
    db_path: PathBuf,
}

impl SqliteRecordStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let store = Self { db_path };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path).context("open record db")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS backups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                location TEXT,
                format TEXT NOT NULL,
                size_bytes INTEGER,
                compression INTEGER NOT NULL,
                encryption INTEGER NOT NULL,
                key_ref TEXT,
                collections_json TEXT NOT NULL,
                excluded_json TEXT NOT NULL,
                metadata_json TEXT,
                schedule_json TEXT,
                retention_days INTEGER NOT NULL,
                retention_max INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                duration_ms INTEGER,
                error_json TEXT,
                verified INTEGER NOT NULL DEFAULT 0,
                verified_at TEXT,
                verified_by TEXT,
                checksum TEXT,
                created_by TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: &BackupRecord) -> Result<()> {
        let record = record.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open record db")?;
            let values = record_params(&record)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|v| v.as_ref()).collect();
            conn.execute(
                "INSERT INTO backups (id, name, kind, status, location, format, size_bytes,
                    compression, encryption, key_ref, collections_json, excluded_json,
                    metadata_json, schedule_json, retention_days, retention_max, created_at,
                    started_at, completed_at, duration_ms, error_json, verified, verified_at,
                    verified_by, checksum, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
                params.as_slice(),
            )?;
            Ok(())
        })
        .await?
    }

    async fn update(&self, record: &BackupRecord) -> Result<()> {
        let record = record.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open record db")?;
            let values = record_params(&record)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|v| v.as_ref()).collect();
            let changed = conn.execute(
                "UPDATE backups SET name = ?2, kind = ?3, status = ?4, location = ?5,
                    format = ?6, size_bytes = ?7, compression = ?8, encryption = ?9,
                    key_ref = ?10, collections_json = ?11, excluded_json = ?12,
                    metadata_json = ?13, schedule_json = ?14, retention_days = ?15,
                    retention_max = ?16, created_at = ?17, started_at = ?18,
                    completed_at = ?19, duration_ms = ?20, error_json = ?21, verified = ?22,
                    verified_at = ?23, verified_by = ?24, checksum = ?25, created_by = ?26
                 WHERE id = ?1",
                params.as_slice(),
            )?;
            anyhow::ensure!(changed == 1, "backup {} not present for update", record.id);
            Ok(())
        })
        .await?
    }

    async fn get(&self, id: Uuid) -> Result<Option<BackupRecord>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open record db")?;
            let mut stmt = conn
                .prepare(&format!("SELECT {SELECT_COLUMNS} FROM backups WHERE id = ?1"))?;
            let found = stmt
                .query_row([id.to_string()], row_to_record)
                .optional()?;
            Ok(found)
        })
        .await?
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<BackupRecord>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open record db")?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM backups ORDER BY created_at DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map([limit], row_to_record)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
        .await?
    }

    async fn list_scheduled(&self) -> Result<Vec<BackupRecord>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open record db")?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM backups
                 WHERE schedule_json IS NOT NULL ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([], row_to_record)?;
            let records = rows.collect::<std::result::Result<Vec<BackupRecord>, _>>()?;
            Ok(records
                .into_iter()
                .filter(|r| r.schedule.as_ref().is_some_and(|s| s.enabled))
                .collect())
        })
        .await?
    }

    async fn list_terminal_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<BackupRecord>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open record db")?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM backups
                 WHERE status IN ('completed', 'failed') AND created_at < ?1
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map([format_ts(cutoff)], row_to_record)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
        .await?
    }

    async fn list_terminal(&self) -> Result<Vec<BackupRecord>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open record db")?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM backups
                 WHERE status IN ('completed', 'failed') ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([], row_to_record)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
        .await?
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open record db")?;
            let changed = conn.execute("DELETE FROM backups WHERE id = ?1", [id.to_string()])?;
            Ok(changed > 0)
        })
        .await?
    }

    async fn stats_by_status(&self) -> Result<Vec<StatusStats>> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path).context("open record db")?;
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*), COALESCE(SUM(size_bytes), 0), AVG(duration_ms)
                 FROM backups GROUP BY status ORDER BY status",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(StatusStats {
                    status: parse_status(&row.get::<_, String>(0)?),
                    count: row.get::<_, i64>(1)? as u64,
                    total_size_bytes: row.get(2)?,
                    avg_duration_ms: row.get(3)?,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Into::into)
        })
        .await?
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn record_params(record: &BackupRecord) -> Result<Vec<Box<dyn rusqlite::types::ToSql>>> {
    Ok(vec![
        Box::new(record.id.to_string()),
        Box::new(record.name.clone()),
        Box::new(record.kind.as_str()),
        Box::new(record.status.as_str()),
        Box::new(record.location.clone()),
        Box::new(record.format.clone()),
        Box::new(record.size_bytes),
        Box::new(record.compression),
        Box::new(record.encryption),
        Box::new(record.key_ref.clone()),
        Box::new(serde_json::to_string(&record.collections)?),
        Box::new(serde_json::to_string(&record.excluded_collections)?),
        Box::new(
            record
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        ),
        Box::new(
            record
                .schedule
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        ),
        Box::new(record.retention.days_to_keep),
        Box::new(record.retention.max_backups_to_keep),
        Box::new(format_ts(record.created_at)),
        Box::new(record.started_at.map(format_ts)),
        Box::new(record.completed_at.map(format_ts)),
        Box::new(record.duration_ms),
        Box::new(
            record
                .error
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        ),
        Box::new(record.verified),
        Box::new(record.verified_at.map(format_ts)),
        Box::new(record.verified_by.clone()),
        Box::new(record.checksum.clone()),
        Box::new(record.created_by.clone()),
    ])
}

fn row_to_record(row: &Row) -> rusqlite::Result<BackupRecord> {
    let metadata_json: Option<String> = row.get(12)?;
    let schedule_json: Option<String> = row.get(13)?;
    let error_json: Option<String> = row.get(20)?;
    Ok(BackupRecord {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        kind: parse_kind(&row.get::<_, String>(2)?),
        status: parse_status(&row.get::<_, String>(3)?),
        location: row.get(4)?,
        format: row.get(5)?,
        size_bytes: row.get(6)?,
        compression: row.get(7)?,
        encryption: row.get(8)?,
        key_ref: row.get(9)?,
        collections: parse_json_column(row.get::<_, String>(10)?)?,
        excluded_collections: parse_json_column(row.get::<_, String>(11)?)?,
        metadata: metadata_json
            .map(|raw| serde_json::from_str::<BackupMetadata>(&raw))
            .transpose()
            .map_err(to_sql_err)?,
        schedule: schedule_json
            .map(|raw| serde_json::from_str::<BackupSchedule>(&raw))
            .transpose()
            .map_err(to_sql_err)?,
        retention: RetentionPolicy {
            days_to_keep: row.get(14)?,
            max_backups_to_keep: row.get(15)?,
        },
        created_at: parse_ts(row.get::<_, String>(16)?),
        started_at: row.get::<_, Option<String>>(17)?.map(parse_ts),
        completed_at: row.get::<_, Option<String>>(18)?.map(parse_ts),
        duration_ms: row.get(19)?,
        error: error_json
            .map(|raw| serde_json::from_str::<BackupFailure>(&raw))
            .transpose()
            .map_err(to_sql_err)?,
        verified: row.get(21)?,
        verified_at: row.get::<_, Option<String>>(22)?.map(parse_ts),
        verified_by: row.get(23)?,
        checksum: row.get(24)?,
        created_by: row.get(25)?,
    })
}

fn parse_json_column(raw: String) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&raw).map_err(to_sql_err)
}

fn parse_uuid(raw: String) -> Uuid {
    Uuid::parse_str(&raw).unwrap_or_else(|_| Uuid::nil())
}

fn parse_ts(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_status(raw: &str) -> BackupStatus {
    match raw {
        "in_progress" => BackupStatus::InProgress,
        "completed" => BackupStatus::Completed,
        "failed" => BackupStatus::Failed,
        "cancelled" => BackupStatus::Cancelled,
        _ => BackupStatus::Pending,
    }
}

fn parse_kind(raw: &str) -> BackupKind {
    match raw {
        "incremental" => BackupKind::Incremental,
        "differential" => BackupKind::Differential,
        _ => BackupKind::Full,
    }
}

fn to_sql_err(e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}
