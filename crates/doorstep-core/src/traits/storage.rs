// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter and data plane traits.

use async_trait::async_trait;

use crate::error::DoorstepError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    Agent, CallLog, CallStatus, CallSync, Customer, Delivery, DeliveryStatus, Intent,
    NewRecording, Recording, RecordingInsert, RecordingLeg,
};

/// Adapter for storage and persistence backends.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection setup).
    async fn initialize(&self) -> Result<(), DoorstepError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), DoorstepError>;
}

/// Durable access to deliveries, people, call logs and recordings.
///
/// Every coordinator write is a conditional upsert: insert if absent, update
/// only when the precondition still holds. Two concurrent workers calling the
/// same method for the same call id converge on one row.
#[async_trait]
pub trait DataPlane: Send + Sync {
    // --- Deliveries, customers, agents ---

    async fn insert_delivery(&self, delivery: &Delivery) -> Result<(), DoorstepError>;

    async fn get_delivery(&self, id: &str) -> Result<Option<Delivery>, DoorstepError>;

    /// Sets the delivery status. Returns `false` when nothing changed: the
    /// delivery is missing, already at `status`, or already completed/failed.
    async fn set_delivery_status(
        &self,
        id: &str,
        status: DeliveryStatus,
    ) -> Result<bool, DoorstepError>;

    async fn insert_customer(&self, customer: &Customer) -> Result<(), DoorstepError>;

    async fn get_customer(&self, id: &str) -> Result<Option<Customer>, DoorstepError>;

    async fn insert_agent(&self, agent: &Agent) -> Result<(), DoorstepError>;

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>, DoorstepError>;

    /// Drops an agent's stored push subscription after the push service
    /// reported it expired.
    async fn clear_push_subscription(&self, agent_id: &str) -> Result<(), DoorstepError>;

    // --- Call logs ---

    /// Returns the delivery's non-terminal CallLog, if any.
    async fn active_call(&self, delivery_id: &str) -> Result<Option<CallLog>, DoorstepError>;

    /// Inserts a `queued` CallLog without a call id, unless the delivery
    /// already has a non-terminal CallLog. Returns `None` in that case.
    async fn reserve_call_slot(&self, delivery_id: &str)
    -> Result<Option<CallLog>, DoorstepError>;

    /// Stores the provider call id on a reserved slot and advances its status.
    async fn attach_call_sid(
        &self,
        call_log_id: &str,
        call_sid: &str,
        status: CallStatus,
    ) -> Result<CallLog, DoorstepError>;

    /// Finds the CallLog for a call id, or binds the call id to the delivery's
    /// active slot, or creates a fresh CallLog for it.
    async fn ensure_call(&self, delivery_id: &str, call_sid: &str)
    -> Result<CallLog, DoorstepError>;

    async fn get_call(&self, id: &str) -> Result<Option<CallLog>, DoorstepError>;

    async fn get_call_by_sid(&self, call_sid: &str) -> Result<Option<CallLog>, DoorstepError>;

    /// All CallLogs of a delivery, oldest first.
    async fn list_calls(&self, delivery_id: &str) -> Result<Vec<CallLog>, DoorstepError>;

    /// Forward-only status update. Terminal statuses are sticky; a repeat of
    /// the current terminal status may still refresh the duration.
    async fn apply_call_status(
        &self,
        call_log_id: &str,
        status: CallStatus,
        duration_secs: Option<u32>,
    ) -> Result<CallSync, DoorstepError>;

    /// Records the recording leg on the call identified by `call_sid`,
    /// creating the CallLog if no call-status arrived yet.
    ///
    /// The first application stores the provider recording URL and moves the
    /// status: a ringing or answered leg becomes `completed` with the
    /// recording's duration, an earlier or synthesized leg becomes `answered`.
    /// Replays return the row unchanged with `applied == false`.
    async fn attach_recording_leg(
        &self,
        delivery_id: &str,
        call_sid: &str,
        recording_url: &str,
        duration_secs: u32,
    ) -> Result<RecordingLeg, DoorstepError>;

    // --- Recordings ---

    /// Creates the recording for a CallLog unless one exists. The existing
    /// row (and its audio URL) wins.
    async fn insert_recording(
        &self,
        recording: &NewRecording,
    ) -> Result<RecordingInsert, DoorstepError>;

    async fn get_recording(&self, id: &str) -> Result<Option<Recording>, DoorstepError>;

    async fn get_recording_for_call(
        &self,
        call_log_id: &str,
    ) -> Result<Option<Recording>, DoorstepError>;

    /// Writes the transcript if none is set. Returns whether this call wrote it.
    async fn set_transcript_if_absent(
        &self,
        recording_id: &str,
        transcript: &str,
    ) -> Result<bool, DoorstepError>;

    /// Writes the intent if none is set. Returns whether this call wrote it.
    async fn set_intent_if_absent(
        &self,
        recording_id: &str,
        intent: &Intent,
    ) -> Result<bool, DoorstepError>;

    /// Marks the recording as notified. Exactly one caller gets `true`.
    async fn claim_notification(&self, recording_id: &str) -> Result<bool, DoorstepError>;
}
