// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Doorstep delivery-call pipeline.

use thiserror::Error;

/// The primary error type used across all Doorstep adapter traits and pipeline steps.
///
/// Every variant is classified as transient or permanent through
/// [`DoorstepError::is_retryable`]; workers use that classification to decide
/// between a queue retry and a failed-permanent disposition.
#[derive(Debug, Error)]
pub enum DoorstepError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// External provider errors (telephony, media store, speech, push).
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
        retryable: bool,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The adapter is not configured (missing credentials).
    #[error("{adapter} is not configured")]
    Disabled { adapter: &'static str },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation conflicts with existing state (e.g. a call is already live).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A job payload or webhook body failed validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Webhook signature validation failed.
    #[error("webhook signature rejected")]
    Signature,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DoorstepError {
    /// Builds a storage error from any boxed source.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }

    /// Builds a transient provider error.
    pub fn transient(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable: true,
            source: None,
        }
    }

    /// Builds a permanent provider error.
    pub fn permanent(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
            retryable: false,
            source: None,
        }
    }

    /// Whether a queue retry can plausibly succeed.
    ///
    /// Storage failures, timeouts and provider 5xx/network errors are transient.
    /// Validation, signature, missing entities, conflicts and disabled adapters
    /// are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { .. } | Self::Timeout { .. } => true,
            Self::Provider { retryable, .. } => *retryable,
            Self::Config(_)
            | Self::Disabled { .. }
            | Self::NotFound { .. }
            | Self::Conflict(_)
            | Self::InvalidPayload(_)
            | Self::Signature
            | Self::Internal(_) => false,
        }
    }
}
