// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage, data plane and job queue traits.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use doorstep_config::model::StorageConfig;
use doorstep_core::{
    AdapterType, Agent, CallLog, CallStatus, CallSync, Customer, DataPlane, Delivery,
    DeliveryStatus, DoorstepError, EnqueueOptions, FailOutcome, FailureDisposition, HealthStatus,
    Intent, Job, JobKind, JobQueue, NewRecording, PluginAdapter, QueueStats, Recording,
    RecordingInsert, RecordingLeg, StorageAdapter,
};

use crate::cache::SqliteCache;
use crate::database::{Database, checkpoint, map_tr_err};
use crate::queries;
use crate::queries::jobs::QueuePolicy;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened on the first call to
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    policy: QueuePolicy,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig, policy: QueuePolicy) -> Self {
        Self {
            config,
            policy,
            db: OnceCell::new(),
        }
    }

    /// Wraps an already opened database (tests and tooling).
    pub fn from_database(db: Database, policy: QueuePolicy) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".to_string(),
                wal_mode: false,
            },
            policy,
            db: OnceCell::new_with(Some(db)),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, DoorstepError> {
        self.db
            .get()
            .ok_or_else(|| DoorstepError::storage("storage not initialized -- call initialize() first"))
    }

    /// A result cache sharing this storage's connection.
    pub fn cache(&self) -> Result<SqliteCache, DoorstepError> {
        Ok(SqliteCache::new(self.db()?.clone()))
    }

    pub fn policy(&self) -> &QueuePolicy {
        &self.policy
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, DoorstepError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DoorstepError> {
        if let Some(db) = self.db.get() {
            checkpoint(db.connection()).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), DoorstepError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| DoorstepError::storage("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), DoorstepError> {
        checkpoint(self.db()?.connection()).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl DataPlane for SqliteStorage {
    async fn insert_delivery(&self, delivery: &Delivery) -> Result<(), DoorstepError> {
        queries::deliveries::insert_delivery(self.db()?, delivery).await
    }

    async fn get_delivery(&self, id: &str) -> Result<Option<Delivery>, DoorstepError> {
        queries::deliveries::get_delivery(self.db()?, id).await
    }

    async fn set_delivery_status(
        &self,
        id: &str,
        status: DeliveryStatus,
    ) -> Result<bool, DoorstepError> {
        queries::deliveries::set_delivery_status(self.db()?, id, status).await
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), DoorstepError> {
        queries::deliveries::insert_customer(self.db()?, customer).await
    }

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>, DoorstepError> {
        queries::deliveries::get_customer(self.db()?, id).await
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<(), DoorstepError> {
        queries::deliveries::insert_agent(self.db()?, agent).await
    }

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, DoorstepError> {
        queries::deliveries::get_agent(self.db()?, id).await
    }

    async fn clear_push_subscription(&self, agent_id: &str) -> Result<(), DoorstepError> {
        queries::deliveries::clear_push_subscription(self.db()?, agent_id).await
    }

    // --- Call logs ---

    async fn active_call(&self, delivery_id: &str) -> Result<Option<CallLog>, DoorstepError> {
        queries::calls::active_call(self.db()?, delivery_id).await
    }

    async fn reserve_call_slot(
        &self,
        delivery_id: &str,
    ) -> Result<Option<CallLog>, DoorstepError> {
        queries::calls::reserve_call_slot(self.db()?, delivery_id).await
    }

    async fn attach_call_sid(
        &self,
        call_log_id: &str,
        call_sid: &str,
        status: CallStatus,
    ) -> Result<CallLog, DoorstepError> {
        queries::calls::attach_call_sid(self.db()?, call_log_id, call_sid, status).await
    }

    async fn ensure_call(&self, delivery_id: &str, call_sid: &str) -> Result<CallLog, DoorstepError> {
        queries::calls::ensure_call(self.db()?, delivery_id, call_sid).await
    }

    async fn get_call(&self, id: &str) -> Result<Option<CallLog>, DoorstepError> {
        queries::calls::get_call(self.db()?, id).await
    }

    async fn get_call_by_sid(&self, call_sid: &str) -> Result<Option<CallLog>, DoorstepError> {
        queries::calls::get_call_by_sid(self.db()?, call_sid).await
    }

    async fn list_calls(&self, delivery_id: &str) -> Result<Vec<CallLog>, DoorstepError> {
        queries::calls::list_calls(self.db()?, delivery_id).await
    }

    async fn apply_call_status(
        &self,
        call_log_id: &str,
        status: CallStatus,
        duration_secs: Option<u32>,
    ) -> Result<CallSync, DoorstepError> {
        queries::calls::apply_call_status(self.db()?, call_log_id, status, duration_secs).await
    }

    async fn attach_recording_leg(
        &self,
        delivery_id: &str,
        call_sid: &str,
        recording_url: &str,
        duration_secs: u32,
    ) -> Result<RecordingLeg, DoorstepError> {
        queries::calls::attach_recording_leg(
            self.db()?,
            delivery_id,
            call_sid,
            recording_url,
            duration_secs,
        )
        .await
    }

    // --- Recordings ---

    async fn insert_recording(
        &self,
        recording: &NewRecording,
    ) -> Result<RecordingInsert, DoorstepError> {
        queries::recordings::insert_recording(self.db()?, recording).await
    }

    async fn get_recording(&self, id: &str) -> Result<Option<Recording>, DoorstepError> {
        queries::recordings::get_recording(self.db()?, id).await
    }

    async fn get_recording_for_call(
        &self,
        call_log_id: &str,
    ) -> Result<Option<Recording>, DoorstepError> {
        queries::recordings::get_recording_for_call(self.db()?, call_log_id).await
    }

    async fn set_transcript_if_absent(
        &self,
        recording_id: &str,
        transcript: &str,
    ) -> Result<bool, DoorstepError> {
        queries::recordings::set_transcript_if_absent(self.db()?, recording_id, transcript).await
    }

    async fn set_intent_if_absent(
        &self,
        recording_id: &str,
        intent: &Intent,
    ) -> Result<bool, DoorstepError> {
        queries::recordings::set_intent_if_absent(self.db()?, recording_id, intent).await
    }

    async fn claim_notification(&self, recording_id: &str) -> Result<bool, DoorstepError> {
        queries::recordings::claim_notification(self.db()?, recording_id).await
    }
}

#[async_trait]
impl JobQueue for SqliteStorage {
    async fn enqueue_raw(
        &self,
        kind: JobKind,
        payload: &str,
        options: EnqueueOptions,
    ) -> Result<i64, DoorstepError> {
        queries::jobs::enqueue(self.db()?, &self.policy, kind, payload, options).await
    }

    async fn reserve(&self, kind: JobKind, lease: Duration) -> Result<Option<Job>, DoorstepError> {
        queries::jobs::reserve(self.db()?, kind, lease).await
    }

    async fn extend_lease(&self, job_id: i64, lease: Duration) -> Result<bool, DoorstepError> {
        queries::jobs::extend_lease(self.db()?, job_id, lease).await
    }

    async fn complete(&self, job_id: i64) -> Result<(), DoorstepError> {
        queries::jobs::complete(self.db()?, &self.policy, job_id).await
    }

    async fn fail(
        &self,
        job_id: i64,
        error: &str,
        disposition: FailureDisposition,
    ) -> Result<FailOutcome, DoorstepError> {
        queries::jobs::fail(self.db()?, &self.policy, job_id, error, disposition).await
    }

    async fn requeue_stalled(&self) -> Result<(u64, u64), DoorstepError> {
        queries::jobs::requeue_stalled(self.db()?, &self.policy).await
    }

    async fn get_job(&self, job_id: i64) -> Result<Option<Job>, DoorstepError> {
        queries::jobs::get_job(self.db()?, job_id).await
    }

    async fn stats(&self, kind: Option<JobKind>) -> Result<QueueStats, DoorstepError> {
        queries::jobs::stats(self.db()?, kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorstep_core::{InitiateCallPayload, JobPayload};
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let storage = SqliteStorage::new(make_config("unused.db"), QueuePolicy::default());
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage =
            SqliteStorage::new(make_config(db_path.to_str().unwrap()), QueuePolicy::default());

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn health_check_requires_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("health.db");
        let storage =
            SqliteStorage::new(make_config(db_path.to_str().unwrap()), QueuePolicy::default());

        assert!(storage.health_check().await.is_err());
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn typed_enqueue_round_trips_through_queue() {
        let storage = SqliteStorage::from_database(
            Database::open_in_memory().await.unwrap(),
            QueuePolicy::default(),
        );
        let payload = JobPayload::InitiateCall(InitiateCallPayload {
            delivery_id: "D1".into(),
        });
        let id = storage.enqueue(&payload, EnqueueOptions::default()).await.unwrap();

        let job = storage
            .reserve(JobKind::InitiateCall, Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.id, id);
        assert_eq!(JobPayload::decode(job.kind, &job.payload).unwrap(), payload);

        storage.complete(id).await.unwrap();
        let stats = storage.stats(None).await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.waiting + stats.active, 0);
    }
}
