// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DoorstepError;
use crate::jobs::{
    EnqueueOptions, FailOutcome, FailureDisposition, Job, JobKind, JobPayload, QueueStats,
};

/// At-least-once FIFO queue with delayed visibility, leases and retries.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a raw payload for `kind`. The payload is opaque to the queue.
    async fn enqueue_raw(
        &self,
        kind: JobKind,
        payload: &str,
        options: EnqueueOptions,
    ) -> Result<i64, DoorstepError>;

    /// Enqueues a typed payload.
    async fn enqueue(
        &self,
        payload: &JobPayload,
        options: EnqueueOptions,
    ) -> Result<i64, DoorstepError> {
        let raw = payload.encode()?;
        self.enqueue_raw(payload.kind(), &raw, options).await
    }

    /// Atomically leases the oldest visible pending job of `kind`.
    async fn reserve(&self, kind: JobKind, lease: Duration)
    -> Result<Option<Job>, DoorstepError>;

    /// Pushes the lease of an active job forward. Returns `false` if the job
    /// is no longer active (e.g. it was stall-recovered).
    async fn extend_lease(&self, job_id: i64, lease: Duration) -> Result<bool, DoorstepError>;

    async fn complete(&self, job_id: i64) -> Result<(), DoorstepError>;

    /// Records a failed execution and either schedules a retry with
    /// exponential backoff or marks the job failed-permanent.
    async fn fail(
        &self,
        job_id: i64,
        error: &str,
        disposition: FailureDisposition,
    ) -> Result<FailOutcome, DoorstepError>;

    /// Returns expired leases to the pool. Returns `(requeued, failed)`.
    async fn requeue_stalled(&self) -> Result<(u64, u64), DoorstepError>;

    async fn get_job(&self, job_id: i64) -> Result<Option<Job>, DoorstepError>;

    /// Counters for one kind, or for all kinds when `kind` is `None`.
    async fn stats(&self, kind: Option<JobKind>) -> Result<QueueStats, DoorstepError>;
}
