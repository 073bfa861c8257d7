// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for the Doorstep pipeline.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Library crates
//! emit through the `metrics` macros; this crate installs the recorder and
//! renders the text exposition served at `/metrics`.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use doorstep_core::{AdapterType, DoorstepError, HealthStatus, PluginAdapter};

pub use recording::{
    STEP_LATENCY, record_call_placed, record_job, record_step_latency, record_webhook,
    register_metrics, set_memory, set_queue_depth,
};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and exposes a handle for rendering
/// metrics in Prometheus text format.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Installs the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call errors.
    pub fn new() -> Result<Self, DoorstepError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            DoorstepError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Builds an adapter around a recorder that is not installed globally.
    ///
    /// Useful for rendering in tests without touching process state.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
        }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, DoorstepError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DoorstepError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detached_adapter_identity() {
        let adapter = PrometheusAdapter::detached();
        assert_eq!(adapter.name(), "prometheus");
        assert_eq!(adapter.adapter_type(), AdapterType::Observability);
        assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[test]
    fn recorded_counter_is_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            record_job("process-recording", "completed");
            record_webhook("recording", "accepted");
        });
        let text = handle.render();
        assert!(text.contains("doorstep_jobs_total"));
        assert!(text.contains(r#"kind="process-recording""#));
        assert!(text.contains(r#"hook="recording""#));
    }
}
