// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue operations.
//!
//! Jobs are FIFO per kind among visible rows (`run_at_ms <= now`). A reserved
//! job holds a lease (`locked_until_ms`); an expired lease is recovered by
//! [`requeue_stalled`]. Times are epoch milliseconds supplied by the caller's
//! clock so visibility does not depend on SQLite's clock.

use std::time::Duration;

use doorstep_core::types::epoch_ms;
use doorstep_core::{
    DoorstepError, EnqueueOptions, FailOutcome, FailureDisposition, Job, JobKind, QueueStats,
};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::database::{Database, NOW, map_tr_err};
use crate::queries::parse_column;

/// Retry, lease and retention policy applied by the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePolicy {
    /// Attempts per job unless the enqueue overrides it.
    pub max_attempts: u32,
    /// First retry delay; doubled per further attempt.
    pub backoff_base: Duration,
    /// Lease expiries recovered before failing a job.
    pub max_stalls: u32,
    /// Completed jobs retained per kind.
    pub keep_completed: u32,
    /// Failed jobs retained per kind.
    pub keep_failed: u32,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
            max_stalls: 1,
            keep_completed: 10,
            keep_failed: 5,
        }
    }
}

impl From<&doorstep_config::model::QueueConfig> for QueuePolicy {
    fn from(config: &doorstep_config::model::QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            max_stalls: config.max_stalls,
            keep_completed: config.keep_completed,
            keep_failed: config.keep_failed,
        }
    }
}

impl QueuePolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

const JOB_COLUMNS: &str = "id, kind, payload, status, attempts, max_attempts, stall_count, \
     run_at_ms, locked_until_ms, last_error, dedupe_key, created_at, updated_at";

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let kind: String = row.get(1)?;
    let status: String = row.get(3)?;
    Ok(Job {
        id: row.get(0)?,
        kind: parse_column(1, &kind)?,
        payload: row.get(2)?,
        status: parse_column(3, &status)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        stall_count: row.get(6)?,
        run_at_ms: row.get(7)?,
        locked_until_ms: row.get(8)?,
        last_error: row.get(9)?,
        dedupe_key: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn select_job(conn: &Connection, id: i64) -> rusqlite::Result<Option<Job>> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
        params![id],
        job_from_row,
    )
    .optional()
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Keeps only the newest `keep` jobs of `kind` in `status`.
fn prune(conn: &Connection, kind: &str, status: &str, keep: u32) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM jobs
         WHERE kind = ?1 AND status = ?2
           AND id NOT IN (
               SELECT id FROM jobs WHERE kind = ?1 AND status = ?2
               ORDER BY id DESC LIMIT ?3
           )",
        params![kind, status, keep],
    )
}

/// Enqueue a job. With a dedupe key, an existing pending or active job
/// carrying the same key is returned instead of inserting a new row.
pub async fn enqueue(
    db: &Database,
    policy: &QueuePolicy,
    kind: JobKind,
    payload: &str,
    options: EnqueueOptions,
) -> Result<i64, DoorstepError> {
    let kind = kind.to_string();
    let payload = payload.to_string();
    let max_attempts = options.max_attempts.unwrap_or(policy.max_attempts).max(1);
    let run_at_ms = epoch_ms().saturating_add(duration_ms(options.delay));
    let dedupe_key = options.dedupe_key;
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if let Some(key) = &dedupe_key {
                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM jobs
                         WHERE dedupe_key = ?1 AND status IN ('pending', 'active')",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(id) = existing {
                    tx.commit()?;
                    return Ok(id);
                }
            }
            tx.execute(
                "INSERT INTO jobs (kind, payload, max_attempts, run_at_ms, dedupe_key)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![kind, payload, max_attempts, run_at_ms, dedupe_key],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically lease the oldest visible pending job of `kind`.
pub async fn reserve(
    db: &Database,
    kind: JobKind,
    lease: Duration,
) -> Result<Option<Job>, DoorstepError> {
    let kind = kind.to_string();
    let now = epoch_ms();
    let locked_until = now.saturating_add(duration_ms(lease));
    db.connection()
        .call(move |conn| -> Result<Option<Job>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let next: Option<i64> = tx
                .query_row(
                    "SELECT id FROM jobs
                     WHERE kind = ?1 AND status = 'pending' AND run_at_ms <= ?2
                     ORDER BY id ASC
                     LIMIT 1",
                    params![kind, now],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(id) = next else {
                tx.commit()?;
                return Ok(None);
            };
            tx.execute(
                &format!(
                    "UPDATE jobs SET status = 'active', locked_until_ms = ?2, updated_at = {NOW}
                     WHERE id = ?1"
                ),
                params![id, locked_until],
            )?;
            let job = select_job(&tx, id)?;
            tx.commit()?;
            Ok(job)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn extend_lease(db: &Database, job_id: i64, lease: Duration) -> Result<bool, DoorstepError> {
    let locked_until = epoch_ms().saturating_add(duration_ms(lease));
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                &format!(
                    "UPDATE jobs SET locked_until_ms = ?2, updated_at = {NOW}
                     WHERE id = ?1 AND status = 'active'"
                ),
                params![job_id, locked_until],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a job completed and trim the completed history of its kind.
pub async fn complete(db: &Database, policy: &QueuePolicy, job_id: i64) -> Result<(), DoorstepError> {
    let keep = policy.keep_completed;
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let kind: Option<String> = tx
                .query_row("SELECT kind FROM jobs WHERE id = ?1", params![job_id], |row| {
                    row.get(0)
                })
                .optional()?;
            tx.execute(
                &format!(
                    "UPDATE jobs SET status = 'completed', locked_until_ms = NULL,
                            updated_at = {NOW}
                     WHERE id = ?1 AND status IN ('pending', 'active')"
                ),
                params![job_id],
            )?;
            if let Some(kind) = kind {
                prune(&tx, &kind, "completed", keep)?;
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed execution. Retries with exponential backoff while the
/// attempt budget allows; otherwise (or for a permanent failure) the job is
/// marked failed and the failed history of its kind is trimmed.
pub async fn fail(
    db: &Database,
    policy: &QueuePolicy,
    job_id: i64,
    error: &str,
    disposition: FailureDisposition,
) -> Result<FailOutcome, DoorstepError> {
    let policy = policy.clone();
    let error = error.to_string();
    let now = epoch_ms();
    let outcome = db
        .connection()
        .call(move |conn| -> Result<Option<FailOutcome>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(job) = select_job(&tx, job_id)? else {
                return Ok(None);
            };

            let attempt = job.attempts + 1;
            let exhausted = attempt >= job.max_attempts;
            let outcome = if disposition == FailureDisposition::Permanent || exhausted {
                tx.execute(
                    &format!(
                        "UPDATE jobs SET status = 'failed', attempts = ?2, last_error = ?3,
                                locked_until_ms = NULL, updated_at = {NOW}
                         WHERE id = ?1"
                    ),
                    params![job_id, attempt, error],
                )?;
                prune(&tx, &job.kind.to_string(), "failed", policy.keep_failed)?;
                FailOutcome::FailedPermanent
            } else {
                let run_at_ms = now.saturating_add(duration_ms(policy.backoff(attempt)));
                tx.execute(
                    &format!(
                        "UPDATE jobs SET status = 'pending', attempts = ?2, last_error = ?3,
                                run_at_ms = ?4, locked_until_ms = NULL, updated_at = {NOW}
                         WHERE id = ?1"
                    ),
                    params![job_id, attempt, error, run_at_ms],
                )?;
                FailOutcome::Retrying { attempt, run_at_ms }
            };
            tx.commit()?;
            Ok(Some(outcome))
        })
        .await
        .map_err(map_tr_err)?;

    outcome.ok_or_else(|| DoorstepError::NotFound {
        entity: "job",
        id: job_id.to_string(),
    })
}

/// Recover jobs whose lease expired. Returns `(requeued, failed)`.
pub async fn requeue_stalled(db: &Database, policy: &QueuePolicy) -> Result<(u64, u64), DoorstepError> {
    let policy = policy.clone();
    let now = epoch_ms();
    db.connection()
        .call(move |conn| -> Result<(u64, u64), rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let stalled: Vec<(i64, String, u32)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, kind, stall_count FROM jobs
                     WHERE status = 'active' AND locked_until_ms < ?1",
                )?;
                let rows = stmt.query_map(params![now], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;
                rows.collect::<Result<_, _>>()?
            };

            let (mut requeued, mut failed) = (0u64, 0u64);
            for (id, kind, stall_count) in stalled {
                let stalls = stall_count + 1;
                if stalls > policy.max_stalls {
                    tx.execute(
                        &format!(
                            "UPDATE jobs SET status = 'failed', stall_count = ?2,
                                    last_error = 'job stalled more than allowable limit',
                                    locked_until_ms = NULL, updated_at = {NOW}
                             WHERE id = ?1"
                        ),
                        params![id, stalls],
                    )?;
                    prune(&tx, &kind, "failed", policy.keep_failed)?;
                    failed += 1;
                } else {
                    tx.execute(
                        &format!(
                            "UPDATE jobs SET status = 'pending', stall_count = ?2,
                                    locked_until_ms = NULL, updated_at = {NOW}
                             WHERE id = ?1"
                        ),
                        params![id, stalls],
                    )?;
                    requeued += 1;
                }
            }
            tx.commit()?;
            Ok((requeued, failed))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_job(db: &Database, job_id: i64) -> Result<Option<Job>, DoorstepError> {
    db.connection()
        .call(move |conn| -> Result<Option<Job>, rusqlite::Error> { select_job(conn, job_id) })
        .await
        .map_err(map_tr_err)
}

pub async fn stats(db: &Database, kind: Option<JobKind>) -> Result<QueueStats, DoorstepError> {
    let kind = kind.map(|k| k.to_string());
    db.connection()
        .call(move |conn| -> Result<QueueStats, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM jobs
                 WHERE ?1 IS NULL OR kind = ?1
                 GROUP BY status",
            )?;
            let rows = stmt.query_map(params![kind], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut stats = QueueStats::default();
            for row in rows {
                let (status, count) = row?;
                let count = u64::try_from(count).unwrap_or_default();
                match status.as_str() {
                    "pending" => stats.waiting = count,
                    "active" => stats.active = count,
                    "completed" => stats.completed = count,
                    "failed" => stats.failed = count,
                    _ => {}
                }
            }
            Ok(stats)
        })
        .await
        .map_err(map_tr_err)
}
