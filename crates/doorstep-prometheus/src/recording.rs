// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder can collect these metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Histogram of per-step pipeline latency.
pub const STEP_LATENCY: &str = "doorstep_step_latency_seconds";

/// Register all Doorstep metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "doorstep_jobs_total",
        "Pipeline jobs finished, by kind and outcome"
    );
    describe_counter!("doorstep_calls_placed_total", "Outbound calls placed");
    describe_counter!(
        "doorstep_notifications_total",
        "Agent notification attempts, by channel and outcome"
    );
    describe_counter!(
        "doorstep_webhooks_total",
        "Telephony webhooks received, by hook and outcome"
    );
    describe_gauge!("doorstep_queue_waiting", "Jobs waiting per kind");
    describe_gauge!("doorstep_memory_allocated_bytes", "Heap bytes allocated");
    describe_gauge!("doorstep_memory_resident_bytes", "Resident memory bytes");
    describe_histogram!(STEP_LATENCY, "Pipeline step latency in seconds");
}

/// Record a finished job execution.
pub fn record_job(kind: &str, outcome: &'static str) {
    metrics::counter!("doorstep_jobs_total", "kind" => kind.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_call_placed() {
    metrics::counter!("doorstep_calls_placed_total").increment(1);
}

/// Record an inbound webhook.
pub fn record_webhook(hook: &'static str, outcome: &'static str) {
    metrics::counter!("doorstep_webhooks_total", "hook" => hook, "outcome" => outcome)
        .increment(1);
}

pub fn set_queue_depth(kind: &str, waiting: u64) {
    metrics::gauge!("doorstep_queue_waiting", "kind" => kind.to_string()).set(waiting as f64);
}

/// Heap and resident bytes reported by the allocator.
pub fn set_memory(allocated: u64, resident: u64) {
    metrics::gauge!("doorstep_memory_allocated_bytes").set(allocated as f64);
    metrics::gauge!("doorstep_memory_resident_bytes").set(resident as f64);
}

/// Record the latency of one pipeline step.
pub fn record_step_latency(step: &'static str, seconds: f64) {
    metrics::histogram!(STEP_LATENCY, "step" => step).record(seconds);
}
