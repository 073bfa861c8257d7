// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed [`ResultCache`].

use std::time::Duration;

use async_trait::async_trait;
use doorstep_core::ResultCache;
use tracing::warn;

use crate::database::Database;
use crate::queries;

/// Result cache stored in the `result_cache` table.
///
/// Backend failures are logged and reported as a miss (or `false` for
/// writes); the cache never fails a pipeline step.
#[derive(Clone)]
pub struct SqliteCache {
    db: Database,
}

impl SqliteCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Removes expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        queries::cache::purge_expired(&self.db)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "cache purge failed");
                0
            })
    }
}

#[async_trait]
impl ResultCache for SqliteCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        match queries::cache::get(&self.db, key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .map_err(|e| warn!(key, error = %e, "discarding undecodable cache entry"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        match queries::cache::set(&self.db, key, &value.to_string(), ttl_ms).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "cache write failed");
                false
            }
        }
    }

    async fn remove(&self, key: &str) -> bool {
        match queries::cache::remove(&self.db, key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(key, error = %e, "cache delete failed");
                false
            }
        }
    }
}
