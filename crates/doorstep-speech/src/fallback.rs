// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic keyword grammar that extracts an [`Intent`] from raw text.
//!
//! Used when the analysis provider answers with something that is not a JSON
//! object, and when analysis fails outright on a transcript. Rules:
//!
//! - `urgent`, `asap`, `immediately`: priority urgent and time sensitive
//! - "leave (it) at the (front) door": condition `leave at door`
//! - "no signature": condition `no signature`
//! - "signature required", "must sign": condition `signature required`
//!   (suppressed when "no signature" is present)
//! - `problem`, `issue`, `concern`: the sentence becomes a concern
//!
//! Everything else keeps its default.

use std::sync::LazyLock;

use doorstep_core::{Intent, Priority};
use regex::Regex;

pub const LEAVE_AT_DOOR: &str = "leave at door";
pub const NO_SIGNATURE: &str = "no signature";
pub const SIGNATURE_REQUIRED: &str = "signature required";

static URGENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:urgent|asap|immediately)\b").unwrap());
static LEAVE_DOOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bleave\s+(?:it\s+|them\s+|the\s+package\s+)?at\s+(?:the\s+)?(?:front\s+)?door\b",
    )
    .unwrap()
});
static NO_SIG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bno\s+signature\b").unwrap());
static SIG_REQUIRED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:signature\s+required|must\s+sign)\b").unwrap());
static CONCERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:problems?|issues?|concerns?)\b").unwrap());

/// Extracts an intent from free text.
pub fn analyze_fallback(text: &str) -> Intent {
    let mut intent = Intent::default();

    if URGENT.is_match(text) {
        intent.priority = Priority::Urgent;
        intent.time_sensitive = true;
    }

    if LEAVE_DOOR.is_match(text) {
        intent.conditions.push(LEAVE_AT_DOOR.to_string());
    }
    if NO_SIG.is_match(text) {
        intent.conditions.push(NO_SIGNATURE.to_string());
    } else if SIG_REQUIRED.is_match(text) {
        intent.conditions.push(SIGNATURE_REQUIRED.to_string());
    }

    intent.concerns = sentences(text)
        .filter(|sentence| CONCERN.is_match(sentence))
        .collect();

    intent.normalized()
}

/// Renders an intent back into text the grammar reads identically.
pub fn render(intent: &Intent) -> String {
    let mut parts: Vec<String> = Vec::new();
    if intent.priority == Priority::Urgent {
        parts.push("Urgent.".to_string());
    }
    for condition in &intent.conditions {
        parts.push(format!("{condition}."));
    }
    for concern in &intent.concerns {
        parts.push(format!("{concern}."));
    }
    parts.join(" ")
}

/// Sentences with whitespace collapsed, empties dropped.
fn sentences(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(['.', '!', '?', '\n', '\r'])
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
}
