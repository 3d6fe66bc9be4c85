use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use docvault_core::{CreateBackupRequest, RetentionPolicy};
use docvault_daemon::config::{self, Config};
use docvault_daemon::{Scheduler, SchedulerJob};
use docvault_engine::{BackupOrchestrator, RetentionManager};
use docvault_storage::{ArtifactStore, SqliteDocumentStore, SqliteRecordStore, TracingAuditLog};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let (cfg, rest) = parse_args()?;

    let root = env::var("DOCVAULT_ROOT")
        .ok()
        .or_else(|| cfg.storage.root.clone())
        .unwrap_or_else(|| "./data".to_owned());
    std::fs::create_dir_all(&root).with_context(|| format!("creating data root {root}"))?;

    let database_path = env::var("DOCVAULT_DATABASE")
        .ok()
        .or_else(|| cfg.storage.database_path.clone())
        .unwrap_or_else(|| format!("{root}/docvault.db"));

    let documents = Arc::new(SqliteDocumentStore::new(PathBuf::from(&database_path))?);
    let records = Arc::new(SqliteRecordStore::new(PathBuf::from(&database_path))?);
    let artifacts = ArtifactStore::new(PathBuf::from(&root))?;
    let audit = Arc::new(TracingAuditLog);

    let backups = Arc::new(BackupOrchestrator::new(
        documents,
        records.clone(),
        artifacts.clone(),
        audit.clone(),
    ));
    let retention = Arc::new(RetentionManager::new(records, artifacts, audit));

    let policy = RetentionPolicy {
        days_to_keep: env::var("DOCVAULT_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .or(cfg.storage.retention_days)
            .unwrap_or_else(|| RetentionPolicy::default().days_to_keep),
        max_backups_to_keep: cfg.storage.max_backups_to_keep.unwrap_or(0),
    };

    match rest.first().map(String::as_str) {
        Some("run-once") => run_once(backups, retention, policy, &cfg, rest.get(1)).await,
        Some(other) => bail!("unknown subcommand: {other}"),
        None => run_service(backups, retention, policy, &cfg).await,
    }
}

/// Parse CLI args, returning the loaded config and remaining positionals.
fn parse_args() -> Result<(Config, Vec<String>)> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut rest = Vec::new();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                if i >= args.len() {
                    bail!("--config requires a path argument");
                }
                config_path = Some(PathBuf::from(&args[i]));
            }
            other => {
                rest.push(other.to_owned());
            }
        }
        i += 1;
    }

    let cfg = match config_path {
        Some(path) => {
            info!(?path, "loading config file");
            config::load_config(&path)?
        }
        None => Config::default(),
    };

    Ok((cfg, rest))
}

/// Run one backup (a named job from the config, or a plain full backup of
/// everything) and a retention pass, then exit.
async fn run_once(
    backups: Arc<BackupOrchestrator>,
    retention: Arc<RetentionManager>,
    policy: RetentionPolicy,
    cfg: &Config,
    job_name: Option<&String>,
) -> Result<()> {
    let request = match job_name {
        Some(name) => {
            let job = cfg
                .jobs
                .iter()
                .find(|j| &j.name == name)
                .with_context(|| format!("no job named {name} in config"))?;
            SchedulerJob::from_config(job).request
        }
        None => CreateBackupRequest::default(),
    };

    let record = backups.create_backup(request, "cli").await?;
    info!(backup_id = %record.id, name = %record.name, "backup completed");

    let outcome = retention.purge_expired(policy, "cli").await?;
    if outcome.deleted > 0 {
        info!(deleted = outcome.deleted, "retention pass removed old backups");
    }
    Ok(())
}

async fn run_service(
    backups: Arc<BackupOrchestrator>,
    retention: Arc<RetentionManager>,
    policy: RetentionPolicy,
    cfg: &Config,
) -> Result<()> {
    if cfg.jobs.is_empty() {
        warn!("no jobs configured; scheduler will only run retention on demand");
    }
    let jobs: Vec<SchedulerJob> = cfg.jobs.iter().map(SchedulerJob::from_config).collect();

    let mut scheduler = Scheduler::new(jobs, backups, retention, policy);
    if let Some(tick_secs) = cfg.scheduler.tick_secs {
        scheduler = scheduler.with_tick(Duration::from_secs(tick_secs));
    }

    info!(jobs = cfg.jobs.len(), "starting scheduler");
    let handle = scheduler.spawn();

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
