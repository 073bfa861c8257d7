// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./doorstep.toml` > `~/.config/doorstep/doorstep.toml`
//! > `/etc/doorstep/doorstep.toml`, with environment variable overrides via the
//! `DOORSTEP_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DoorstepConfig;

/// Top-level sections that environment variables may address.
const SECTIONS: &[&str] = &[
    "server",
    "storage",
    "queue",
    "telephony",
    "media",
    "speech",
    "cache",
    "push",
    "pipeline",
    "log",
    "prometheus",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/doorstep/doorstep.toml` (system-wide)
/// 3. `~/.config/doorstep/doorstep.toml` (user XDG config)
/// 4. `./doorstep.toml` (local directory)
/// 5. `DOORSTEP_*` environment variables
pub fn load_config() -> Result<DoorstepConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<DoorstepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DoorstepConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DoorstepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DoorstepConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DoorstepConfig::default()))
        .merge(Toml::file("/etc/doorstep/doorstep.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("doorstep/doorstep.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("doorstep.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section-to-dot mapping.
///
/// Uses `Env::map()` instead of `Env::split("_")` because key names contain
/// underscores: `DOORSTEP_TELEPHONY_AUTH_TOKEN` must map to
/// `telephony.auth_token`, not `telephony.auth.token`.
fn env_provider() -> Env {
    Env::prefixed("DOORSTEP_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env key to its dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section) {
            if let Some(field) = rest.strip_prefix('_') {
                return format!("{section}.{field}");
            }
        }
    }
    key.to_string()
}
