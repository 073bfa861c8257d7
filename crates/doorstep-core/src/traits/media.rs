// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media store adapter trait.

use async_trait::async_trait;

use crate::error::DoorstepError;
use crate::traits::adapter::PluginAdapter;

/// Fetches recording audio from the telephony provider and persists it to
/// an object store.
#[async_trait]
pub trait MediaStore: PluginAdapter {
    /// Downloads the audio behind a provider recording URL.
    async fn fetch(&self, source_url: &str) -> Result<Vec<u8>, DoorstepError>;

    /// Uploads audio under `recordings/<epoch_ms>-<name>` and returns its
    /// public URL.
    async fn persist(&self, audio: Vec<u8>, name: &str) -> Result<String, DoorstepError>;
}
