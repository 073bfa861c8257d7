// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook request signing (`X-Twilio-Signature`).
//!
//! The signed string is the full request URL, query included, followed by
//! every form parameter as `key` + `value`, sorted by key. The MAC is
//! HMAC-SHA1 keyed with the account auth token, base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

fn mac_for(auth_token: &str, url: &str, params: &[(String, String)]) -> Option<HmacSha1> {
    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());

    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Some(mac)
}

/// Computes the base64 signature the provider sends for a request.
pub fn compute_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    mac_for(auth_token, url, params)
        .map(|mac| STANDARD.encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Constant-time check of a received signature.
pub fn verify_signature(
    auth_token: &str,
    signature: &str,
    url: &str,
    params: &[(String, String)],
) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    mac_for(auth_token, url, params).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}
