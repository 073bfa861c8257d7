// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result cache rows with absolute expiry.

use doorstep_core::DoorstepError;
use doorstep_core::types::epoch_ms;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

/// Returns the raw value for `key` unless it has expired.
pub async fn get(db: &Database, key: &str) -> Result<Option<String>, DoorstepError> {
    let key = key.to_string();
    let now = epoch_ms();
    db.connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT value FROM result_cache WHERE key = ?1 AND expires_at_ms > ?2",
                params![key, now],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set(db: &Database, key: &str, value: &str, ttl_ms: i64) -> Result<(), DoorstepError> {
    let key = key.to_string();
    let value = value.to_string();
    let expires_at = epoch_ms().saturating_add(ttl_ms);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO result_cache (key, value, expires_at_ms) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                                expires_at_ms = excluded.expires_at_ms",
                params![key, value, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn remove(db: &Database, key: &str) -> Result<bool, DoorstepError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            Ok(conn.execute("DELETE FROM result_cache WHERE key = ?1", params![key])? == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes every expired row. Returns the number removed.
pub async fn purge_expired(db: &Database) -> Result<usize, DoorstepError> {
    let now = epoch_ms();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute("DELETE FROM result_cache WHERE expires_at_ms <= ?1", params![now])
        })
        .await
        .map_err(map_tr_err)
}
