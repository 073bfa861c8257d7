// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result cache trait.

use std::time::Duration;

use async_trait::async_trait;

/// Best-effort memo of speech results. Not a source of truth.
///
/// Implementations swallow their own failures: `get` returns `None` and
/// `set` returns `false` when the backend is unavailable.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<serde_json::Value>;

    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> bool;

    async fn remove(&self, key: &str) -> bool;
}
