// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that all pipeline adapters implement.

use async_trait::async_trait;

use crate::error::DoorstepError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all Doorstep adapters.
///
/// Every adapter (storage, telephony, media, speech) implements this trait,
/// which provides identity, lifecycle, and health check capabilities. An
/// adapter built without credentials is *disabled*: it still implements the
/// trait, reports [`HealthStatus::Degraded`], and returns
/// [`DoorstepError::Disabled`] (or a failed outcome) from its operations.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the type of adapter.
    fn adapter_type(&self) -> AdapterType;

    /// Whether the adapter has the credentials it needs.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, DoorstepError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), DoorstepError>;
}
