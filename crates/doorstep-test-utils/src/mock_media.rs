// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock object store.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use doorstep_core::{AdapterType, DoorstepError, HealthStatus, MediaStore, PluginAdapter};

use crate::MockFailure;

/// Public base of persisted objects.
pub const MEDIA_BASE: &str = "https://media.test/recordings";

#[derive(Default)]
struct State {
    fetched: Vec<String>,
    persisted: Vec<String>,
    failures: VecDeque<MockFailure>,
}

/// A mock media store that keeps names, not bytes.
pub struct MockMediaStore {
    enabled: bool,
    state: Mutex<State>,
}

impl MockMediaStore {
    pub fn new() -> Self {
        Self {
            enabled: true,
            state: Mutex::new(State::default()),
        }
    }

    /// A store without credentials; the pipeline keeps provider URLs.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Makes the next fetch fail.
    pub fn fail_next(&self, failure: MockFailure) {
        self.state.lock().unwrap().failures.push_back(failure);
    }

    /// Source URLs downloaded so far.
    pub fn fetched(&self) -> Vec<String> {
        self.state.lock().unwrap().fetched.clone()
    }

    /// Public URLs of persisted objects.
    pub fn persisted(&self) -> Vec<String> {
        self.state.lock().unwrap().persisted.clone()
    }
}

impl Default for MockMediaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockMediaStore {
    fn name(&self) -> &str {
        "mock-media"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::MediaStore
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn health_check(&self) -> Result<HealthStatus, DoorstepError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DoorstepError> {
        Ok(())
    }
}

#[async_trait]
impl MediaStore for MockMediaStore {
    async fn fetch(&self, source_url: &str) -> Result<Vec<u8>, DoorstepError> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.failures.pop_front() {
            return Err(failure.into_error("media"));
        }
        state.fetched.push(source_url.to_string());
        Ok(b"RIFF....WAVE".to_vec())
    }

    async fn persist(&self, _audio: Vec<u8>, name: &str) -> Result<String, DoorstepError> {
        let mut state = self.state.lock().unwrap();
        let url = format!("{MEDIA_BASE}/{}-{name}", state.persisted.len() + 1);
        state.persisted.push(url.clone());
        Ok(url)
    }
}
