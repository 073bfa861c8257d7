// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the data plane, adapters, and the pipeline coordinator.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Current UTC time as an RFC 3339 string with millisecond precision.
///
/// All persisted timestamps use this format so they sort lexicographically.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Current UTC time as milliseconds since the Unix epoch.
pub fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues (or running disabled).
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Queue,
    Telephony,
    MediaStore,
    Speech,
    Cache,
    Push,
    Observability,
}

// --- Deliveries and people ---

/// Lifecycle of a delivery.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
    Scheduled,
    InProgress,
    Completed,
    Failed,
}

/// A scheduled drop-off to a customer. Created by the external CRUD layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub customer_id: String,
    pub agent_id: Option<String>,
    pub address: String,
    pub scheduled_at: String,
    pub status: DeliveryStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// The person receiving a delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: String,
}

/// A field agent assigned to deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// SMS destination, if the agent accepts text notifications.
    pub phone: Option<String>,
    /// Stored web-push subscription as JSON (`{endpoint, keys: {p256dh, auth}}`).
    pub push_subscription: Option<String>,
}

// --- Calls ---

/// Lifecycle status of a call leg.
///
/// Status only moves forward (see [`CallStatus::rank`]); terminal statuses are sticky.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Initiated,
    Ringing,
    Answered,
    Completed,
    NoAnswer,
    Busy,
    Failed,
}

impl CallStatus {
    /// Parses a provider-reported status, including provider aliases
    /// (`in-progress` is an answered leg, `canceled` a failed one).
    pub fn from_provider(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "initiated" => Some(Self::Initiated),
            "ringing" => Some(Self::Ringing),
            "answered" | "in-progress" => Some(Self::Answered),
            "completed" => Some(Self::Completed),
            "no-answer" => Some(Self::NoAnswer),
            "busy" => Some(Self::Busy),
            "failed" | "canceled" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal statuses never change once written.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::NoAnswer | Self::Busy | Self::Failed
        )
    }

    /// The leg is connected or about to be.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Ringing | Self::Answered)
    }

    /// The customer was never reached on this leg.
    pub fn is_unreachable(self) -> bool {
        matches!(self, Self::NoAnswer | Self::Busy | Self::Failed)
    }

    /// Monotonic ordering used to ignore stale, out-of-order status reports.
    pub fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Initiated => 1,
            Self::Ringing => 2,
            Self::Answered => 3,
            Self::Completed | Self::NoAnswer | Self::Busy | Self::Failed => 4,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(self, next: CallStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// One outbound voice call attempt for a delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLog {
    pub id: String,
    pub delivery_id: String,
    /// Telephony-side call identifier; the idempotency key for webhooks.
    pub call_sid: Option<String>,
    pub status: CallStatus,
    pub duration_secs: u32,
    /// Provider recording URL as reported by the recording webhook.
    pub recording_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// --- Recordings and intent ---

/// Overall tone of the customer's message.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

/// Urgency of the customer's instructions.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Structured summary of a transcript.
///
/// Every field has a default so consumers never nil-check; list fields are
/// ordered sets (insertion order, no duplicates).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intent {
    pub sentiment: Sentiment,
    pub priority: Priority,
    pub time_sensitive: bool,
    pub conditions: Vec<String>,
    pub concerns: Vec<String>,
    pub instructions: Vec<String>,
}

impl Intent {
    /// Trims entries, drops empty ones, and removes duplicates while
    /// preserving first-seen order.
    pub fn normalized(mut self) -> Self {
        self.conditions = ordered_set(self.conditions);
        self.concerns = ordered_set(self.concerns);
        self.instructions = ordered_set(self.instructions);
        self
    }
}

fn ordered_set(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|existing| existing == item) {
            out.push(item.to_string());
        }
    }
    out
}

/// The customer's recorded audio for one call leg, plus derived text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub call_log_id: String,
    /// Canonical audio URL. Immutable once the row exists.
    pub audio_url: String,
    /// `false` when the media store was unavailable and `audio_url` is the
    /// provider's own (expiring) URL.
    pub audio_durable: bool,
    pub duration_secs: u32,
    pub transcript: Option<String>,
    pub intent: Option<Intent>,
    /// Set once when the agent fanout was claimed.
    pub notified_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to create a [`Recording`] row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecording {
    pub call_log_id: String,
    pub audio_url: String,
    pub audio_durable: bool,
    pub duration_secs: u32,
}

// --- Adapter payloads ---

/// Outbound call placement request.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub delivery_id: String,
    pub to: String,
    /// Public base URL the provider calls back into.
    pub callback_base: String,
}

/// Provider acknowledgement of a placed call.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedCall {
    pub call_sid: String,
    pub status: CallStatus,
}

/// Where persisted audio ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedAudio {
    pub url: String,
    /// `true` only when backed by the system's object store.
    pub durable: bool,
}

/// Outcome of a transcription request. A failure is a value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TranscriptionOutcome {
    Transcribed { text: String },
    TranscriptionFailed { reason: String, retryable: bool },
}

/// Transcription result envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub recording_id: String,
    pub processed_at: String,
    pub outcome: TranscriptionOutcome,
}

impl TranscriptionResult {
    pub fn success(&self) -> bool {
        matches!(self.outcome, TranscriptionOutcome::Transcribed { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            TranscriptionOutcome::Transcribed { text } => Some(text),
            TranscriptionOutcome::TranscriptionFailed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            TranscriptionOutcome::Transcribed { .. } => None,
            TranscriptionOutcome::TranscriptionFailed { reason, .. } => Some(reason),
        }
    }
}

/// Outcome of an intent analysis request.
///
/// `AnalyzedByFallback` is a first-class success: the provider answered but
/// not with parseable JSON, so the keyword grammar produced the intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Analyzed { intent: Intent },
    AnalyzedByFallback { intent: Intent },
    AnalysisFailed { reason: String, retryable: bool },
}

/// Analysis result envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub recording_id: String,
    pub processed_at: String,
    pub outcome: AnalysisOutcome,
}

impl AnalysisResult {
    pub fn success(&self) -> bool {
        !matches!(self.outcome, AnalysisOutcome::AnalysisFailed { .. })
    }

    pub fn intent(&self) -> Option<&Intent> {
        match &self.outcome {
            AnalysisOutcome::Analyzed { intent } | AnalysisOutcome::AnalyzedByFallback { intent } => {
                Some(intent)
            }
            AnalysisOutcome::AnalysisFailed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            AnalysisOutcome::AnalysisFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

// --- Data plane write results ---

/// Outcome of a conditional call-status update.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSync {
    /// Row state after the update.
    pub call: CallLog,
    /// Status before the update.
    pub previous: CallStatus,
    /// Whether this update moved the status forward.
    pub transitioned: bool,
}

impl CallSync {
    /// First transition into an unreachable terminal status.
    pub fn became_unreachable(&self) -> bool {
        self.transitioned && self.call.status.is_unreachable()
    }
}

/// Outcome of attaching a recording leg to its CallLog.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingLeg {
    pub call: CallLog,
    /// The CallLog did not exist and was created from the webhook's call id.
    pub synthesized: bool,
    /// This call applied the leg; `false` on replays.
    pub applied: bool,
}

/// Outcome of an insert-if-absent on recordings.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingInsert {
    Inserted(Recording),
    Existing(Recording),
}

impl RecordingInsert {
    pub fn recording(&self) -> &Recording {
        match self {
            Self::Inserted(r) | Self::Existing(r) => r,
        }
    }

    pub fn into_recording(self) -> Recording {
        match self {
            Self::Inserted(r) | Self::Existing(r) => r,
        }
    }

    pub fn inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

// --- Notifications ---

/// What an agent notification is about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NotificationKind {
    NewRecording,
    StatusUpdate,
    NewDelivery,
    Emergency,
}

/// A notification addressed to one agent, rendered per channel by the fanout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub delivery_id: String,
    pub title: String,
    pub body: String,
    /// Structured data for push and socket consumers.
    pub data: serde_json::Value,
}
