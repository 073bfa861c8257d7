// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Doorstep pipeline.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed operations for the data
//! plane (deliveries, call logs, recordings), the durable job queue, and the
//! speech result cache.

pub mod adapter;
pub mod cache;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use cache::SqliteCache;
pub use database::Database;
pub use queries::jobs::QueuePolicy;
