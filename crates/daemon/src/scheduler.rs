use std::sync::Arc;
use std::time::Duration;

use docvault_core::{CreateBackupRequest, RetentionPolicy};
use docvault_engine::{BackupOrchestrator, RetentionManager};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::config::JobConfig;

pub const DEFAULT_TICK: Duration = Duration::from_secs(60);
const DEFAULT_JOB_INTERVAL: Duration = Duration::from_secs(3600);

/// One recurring backup, resolved from config into a ready-to-run request.
#[derive(Debug, Clone)]
pub struct SchedulerJob {
    pub name: String,
    pub request: CreateBackupRequest,
    pub interval: Duration,
}

impl SchedulerJob {
    pub fn from_config(job: &JobConfig) -> Self {
        Self {
            name: job.name.clone(),
            request: CreateBackupRequest {
                name: Some(job.name.clone()),
                collections: job.collections.clone(),
                excluded_collections: job.excluded_collections.clone(),
                compression: job.compression,
                encryption: job.encryption_key.is_some(),
                encryption_key: job.encryption_key.clone(),
                ..CreateBackupRequest::default()
            },
            interval: job
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_JOB_INTERVAL),
        }
    }
}

/// Owns the recurring-backup loop. `spawn` moves it onto a task and returns
/// a handle whose `shutdown` stops the loop and waits for it to finish; no
/// global state, so tests can run schedulers side by side with short ticks.
pub struct Scheduler {
    jobs: Vec<SchedulerJob>,
    backups: Arc<BackupOrchestrator>,
    retention: Arc<RetentionManager>,
    policy: RetentionPolicy,
    tick: Duration,
}

impl Scheduler {
    pub fn new(
        jobs: Vec<SchedulerJob>,
        backups: Arc<BackupOrchestrator>,
        retention: Arc<RetentionManager>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            jobs,
            backups,
            retention,
            policy,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        SchedulerHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Every job is due on the first tick.
        let mut last_run: Vec<Option<Instant>> = vec![None; self.jobs.len()];

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_due_jobs(&mut last_run).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn run_due_jobs(&self, last_run: &mut [Option<Instant>]) {
        let now = Instant::now();
        let mut ran_any = false;

        for (job, last) in self.jobs.iter().zip(last_run.iter_mut()) {
            let due = last.map_or(true, |at| now.duration_since(at) >= job.interval);
            if !due {
                continue;
            }
            *last = Some(now);
            ran_any = true;

            // A failed job run is logged and retried on its next interval.
            match self
                .backups
                .create_backup(job.request.clone(), "scheduler")
                .await
            {
                Ok(record) => {
                    info!(job = %job.name, backup_id = %record.id, "scheduled backup completed")
                }
                Err(e) => error!(job = %job.name, error = %e, "scheduled backup failed"),
            }
        }

        if ran_any {
            match self.retention.purge_expired(self.policy, "scheduler").await {
                Ok(outcome) if outcome.deleted > 0 => {
                    info!(deleted = outcome.deleted, "retention pass removed old backups")
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "retention pass failed"),
            }
        }
    }
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
