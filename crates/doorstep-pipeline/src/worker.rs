// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue workers: lease, execute, renew, settle.
//!
//! Each job kind gets its own bounded set of workers. A worker runs one job
//! at a time, renews the job's lease every half lease while the step is in
//! flight, and settles the job as completed, retrying or failed-permanent
//! according to the error classification. A separate sweeper returns jobs
//! whose lease expired to the pool.

use std::sync::Arc;
use std::time::Duration;

use doorstep_config::model::QueueConfig;
use doorstep_core::{DoorstepError, FailOutcome, FailureDisposition, Job, JobKind, JobQueue};
use doorstep_prometheus::{record_job, set_queue_depth};
use strum::IntoEnumIterator;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::Coordinator;

const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(10);

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub lease: Duration,
    pub poll_interval: Duration,
    pub stall_check: Duration,
    /// Concurrent workers per job kind.
    pub concurrency: Vec<(JobKind, usize)>,
}

impl From<&QueueConfig> for WorkerSettings {
    fn from(config: &QueueConfig) -> Self {
        Self {
            lease: Duration::from_secs(config.lease_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            stall_check: Duration::from_secs(config.stall_check_secs),
            concurrency: vec![
                (JobKind::InitiateCall, config.call_workers),
                (JobKind::ProcessRecording, config.recording_workers),
                (JobKind::ProcessTranscription, config.transcription_workers),
            ],
        }
    }
}

/// How a job execution was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Retrying { attempt: u32 },
    FailedPermanent,
}

impl RunOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Retrying { .. } => "retrying",
            Self::FailedPermanent => "failed",
        }
    }
}

/// One settled job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRun {
    pub job_id: i64,
    pub kind: JobKind,
    pub outcome: RunOutcome,
}

/// Runs pipeline jobs from the queue through the coordinator.
#[derive(Clone)]
pub struct WorkerPool {
    coordinator: Arc<Coordinator>,
    queue: Arc<dyn JobQueue>,
    settings: WorkerSettings,
}

impl WorkerPool {
    pub fn new(coordinator: Arc<Coordinator>, settings: WorkerSettings) -> Self {
        let queue = coordinator.queue().clone();
        Self {
            coordinator,
            queue,
            settings,
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Leases and runs the oldest visible job of `kind`, if any.
    pub async fn run_next(&self, kind: JobKind) -> Result<Option<JobRun>, DoorstepError> {
        let Some(job) = self.queue.reserve(kind, self.settings.lease).await? else {
            return Ok(None);
        };
        debug!(job_id = job.id, kind = %kind, attempt = job.attempts + 1, "job leased");

        let outcome = match self.execute(&job).await {
            Ok(()) => {
                self.queue.complete(job.id).await?;
                RunOutcome::Completed
            }
            Err(e) => self.settle_failure(&job, &e).await?,
        };
        record_job(&kind.to_string(), outcome.label());
        Ok(Some(JobRun {
            job_id: job.id,
            kind,
            outcome,
        }))
    }

    /// Runs the job while renewing its lease every half lease.
    async fn execute(&self, job: &Job) -> Result<(), DoorstepError> {
        let renew_every = (self.settings.lease / 2).max(MIN_RENEW_INTERVAL);
        let mut renew = tokio::time::interval_at(tokio::time::Instant::now() + renew_every, renew_every);
        let work = self.coordinator.handle(job);
        tokio::pin!(work);

        loop {
            tokio::select! {
                result = &mut work => return result,
                _ = renew.tick() => {
                    match self.queue.extend_lease(job.id, self.settings.lease).await {
                        Ok(true) => debug!(job_id = job.id, "lease renewed"),
                        Ok(false) => warn!(job_id = job.id, "lease lost, job was recovered elsewhere"),
                        Err(e) => warn!(job_id = job.id, error = %e, "lease renewal failed"),
                    }
                }
            }
        }
    }

    async fn settle_failure(&self, job: &Job, err: &DoorstepError) -> Result<RunOutcome, DoorstepError> {
        let disposition = if err.is_retryable() {
            FailureDisposition::Retry
        } else {
            FailureDisposition::Permanent
        };
        let outcome = match self.queue.fail(job.id, &err.to_string(), disposition).await? {
            FailOutcome::Retrying { attempt, run_at_ms } => {
                warn!(
                    job_id = job.id,
                    kind = %job.kind,
                    attempt,
                    run_at_ms,
                    error = %err,
                    "job failed, retry scheduled"
                );
                RunOutcome::Retrying { attempt }
            }
            FailOutcome::FailedPermanent => {
                error!(
                    job_id = job.id,
                    kind = %job.kind,
                    error = %err,
                    "job failed permanently"
                );
                RunOutcome::FailedPermanent
            }
        };
        Ok(outcome)
    }

    /// Spawns workers and the stall sweeper, then waits until `cancel` fires
    /// and every worker has finished its current job.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tasks = JoinSet::new();

        for (kind, count) in self.settings.concurrency.clone() {
            for index in 0..count {
                let pool = self.clone();
                let cancel = cancel.clone();
                tasks.spawn(async move { pool.worker_loop(kind, index, cancel).await });
            }
        }
        let sweeper = self.clone();
        let sweeper_cancel = cancel.clone();
        tasks.spawn(async move { sweeper.sweep_loop(sweeper_cancel).await });

        info!(workers = tasks.len() - 1, "pipeline workers started");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "pipeline worker task panicked");
            }
        }
        info!("pipeline workers stopped");
    }

    async fn worker_loop(&self, kind: JobKind, index: usize, cancel: CancellationToken) {
        debug!(kind = %kind, index, "worker started");
        while !cancel.is_cancelled() {
            let idle = match self.run_next(kind).await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    warn!(kind = %kind, error = %e, "queue unavailable");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
        }
        debug!(kind = %kind, index, "worker stopped");
    }

    async fn sweep_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.stall_check.max(MIN_RENEW_INTERVAL));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }
    }

    /// Recovers expired leases and refreshes the queue depth gauges.
    pub async fn sweep(&self) {
        match self.queue.requeue_stalled().await {
            Ok((0, 0)) => {}
            Ok((requeued, failed)) => {
                warn!(requeued, failed, "recovered stalled jobs");
            }
            Err(e) => warn!(error = %e, "stall sweep failed"),
        }
        for kind in JobKind::iter() {
            if let Ok(stats) = self.queue.stats(Some(kind)).await {
                set_queue_depth(&kind.to_string(), stats.waiting);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_queue_config() {
        let config = QueueConfig::default();
        let settings = WorkerSettings::from(&config);
        assert_eq!(settings.lease, Duration::from_secs(30));
        assert_eq!(settings.stall_check, Duration::from_secs(15));
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(
            settings.concurrency,
            vec![
                (JobKind::InitiateCall, 2),
                (JobKind::ProcessRecording, 10),
                (JobKind::ProcessTranscription, 2),
            ]
        );
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(RunOutcome::Completed.label(), "completed");
        assert_eq!(RunOutcome::Retrying { attempt: 1 }.label(), "retrying");
        assert_eq!(RunOutcome::FailedPermanent.label(), "failed");
    }
}
