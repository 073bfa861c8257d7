// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Speech and intent adapter for the Doorstep pipeline.
//!
//! Transcribes recordings and extracts a structured [`Intent`](doorstep_core::Intent)
//! through an OpenAI-compatible API. When the model does not answer with a
//! JSON object, a deterministic keyword grammar ([`fallback`]) fills the same
//! structure. [`CachedSpeech`] memoizes results per recording.

pub mod cache;
pub mod client;
pub mod fallback;
pub mod prompt;

pub use cache::{CacheTtl, CachedSpeech, MemoryCache, analysis_key, transcription_key};
pub use client::{OpenAiSpeech, UNAVAILABLE};
pub use fallback::analyze_fallback;
