// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery-call pipeline for Doorstep.
//!
//! The [`Coordinator`] advances a delivery through call placement, recording
//! persistence, transcription, analysis and agent notification. It keeps no
//! state between jobs: every step reads and conditionally writes the data
//! plane, so any step can be retried or replayed.
//!
//! The [`WorkerPool`] leases jobs from the queue, runs them through the
//! coordinator, renews leases for long steps, and sweeps stalled jobs.

pub mod coordinator;
pub mod state;
pub mod worker;

pub use coordinator::{Coordinator, PipelineSettings};
pub use state::{PipelineState, derive_state};
pub use worker::{JobRun, RunOutcome, WorkerPool, WorkerSettings};
