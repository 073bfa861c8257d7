// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media store adapter for the Doorstep pipeline.
//!
//! Downloads recording audio from the telephony provider and persists it to
//! an S3-compatible object store under `recordings/<epoch_ms>-<name>`,
//! returning a publicly readable URL.

pub mod sigv4;
pub mod store;

pub use store::{FetchCredentials, S3MediaStore, object_key};
