// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voice script rendering for the answered call leg.

use doorstep_core::DoorstepError;

use crate::webhook_url;

/// Longest recording the provider captures, in seconds.
pub const MAX_RECORDING_SECS: u32 = 60;

/// Key that ends the recording early.
pub const FINISH_ON_KEY: &str = "#";

/// Renders the voice document returned from the voice webhook: speak the
/// prompt, then record with both completion callbacks carrying the delivery id.
pub fn voice_response(
    prompt: &str,
    callback_base: &str,
    delivery_id: &str,
) -> Result<String, DoorstepError> {
    let action = webhook_url(callback_base, "/webhooks/recording", delivery_id)?;
    let transcription = webhook_url(callback_base, "/webhooks/transcription", delivery_id)?;

    Ok(format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response>",
            r#"<Say voice="alice">{prompt}</Say>"#,
            r#"<Record maxLength="{max}" finishOnKey="{key}" playBeep="true" method="POST" "#,
            r#"action="{action}" transcribe="true" transcribeCallback="{transcription}"/>"#,
            r#"<Say voice="alice">Thank you. Goodbye.</Say>"#,
            "</Response>"
        ),
        prompt = escape_xml(prompt),
        max = MAX_RECORDING_SECS,
        key = escape_xml(FINISH_ON_KEY),
        action = escape_xml(&action),
        transcription = escape_xml(&transcription),
    ))
}

/// Response to the record action: thank the customer and hang up.
pub fn goodbye_response() -> String {
    concat!(
        r#"<?xml version="1.0" encoding="UTF-8"?>"#,
        "<Response>",
        r#"<Say voice="alice">Thank you. Goodbye.</Say>"#,
        "<Hangup/>",
        "</Response>"
    )
    .to_string()
}

/// Empty document for callbacks whose response the provider ignores.
pub fn empty_response() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?><Response/>"#.to_string()
}

/// Escapes the five XML special characters.
pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_records_with_both_callbacks() {
        let xml = voice_response("Hi there", "https://hooks.example.com", "D1").unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(r#"<Say voice="alice">Hi there</Say>"#));
        assert!(xml.contains(r#"maxLength="60""#));
        assert!(xml.contains(r##"finishOnKey="#""##));
        assert!(xml.contains(
            r#"action="https://hooks.example.com/webhooks/recording?delivery_id=D1""#
        ));
        assert!(xml.contains(
            r#"transcribeCallback="https://hooks.example.com/webhooks/transcription?delivery_id=D1""#
        ));
    }

    #[test]
    fn prompt_and_ids_are_escaped() {
        let xml = voice_response("Fish & <chips>", "https://h", "D&1").unwrap();
        assert!(xml.contains("Fish &amp; &lt;chips&gt;"));
        assert!(xml.contains("delivery_id=D%261"));
        assert!(!xml.contains("D&1"));
    }

    #[test]
    fn goodbye_hangs_up() {
        let xml = goodbye_response();
        assert!(xml.contains("<Hangup/>"));
        assert!(empty_response().ends_with("<Response/>"));
    }

    #[test]
    fn escape_xml_handles_quotes() {
        assert_eq!(escape_xml(r#"a"b'c"#), "a&quot;b&apos;c");
    }
}
