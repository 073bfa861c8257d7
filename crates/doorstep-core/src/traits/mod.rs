// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the pipeline's external collaborators.
//!
//! Adapters with a lifecycle extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod cache;
pub mod media;
pub mod queue;
pub mod speech;
pub mod storage;
pub mod telephony;

pub use adapter::PluginAdapter;
pub use cache::ResultCache;
pub use media::MediaStore;
pub use queue::JobQueue;
pub use speech::SpeechAdapter;
pub use storage::{DataPlane, StorageAdapter};
pub use telephony::TelephonyAdapter;
