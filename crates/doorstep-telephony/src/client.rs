// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Twilio-compatible REST API.
//!
//! Provides [`TwilioClient`] which handles basic-auth, form encoding, and
//! classification of provider failures into transient and permanent errors.

use std::time::Duration;

use doorstep_core::DoorstepError;
use serde::Deserialize;
use tracing::debug;

const PROVIDER: &str = "telephony";

/// Status events the provider reports to the call-status callback.
const STATUS_EVENTS: [&str; 4] = ["initiated", "ringing", "answered", "completed"];

/// A call resource as returned by `POST /Accounts/{sid}/Calls.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallResource {
    pub sid: String,
    pub status: String,
}

/// A message resource as returned by `POST /Accounts/{sid}/Messages.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResource {
    pub sid: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

/// REST client bound to one account.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from: String,
    timeout: Duration,
}

impl TwilioClient {
    /// Creates a client. `timeout` bounds every request end to end.
    pub fn new(
        api_base: &str,
        account_sid: String,
        auth_token: String,
        from: String,
        timeout: Duration,
    ) -> Result<Self, DoorstepError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DoorstepError::Provider {
                provider: PROVIDER,
                message: format!("failed to build HTTP client: {e}"),
                retryable: false,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            from,
            timeout,
        })
    }

    fn resource_url(&self, resource: &str) -> String {
        format!(
            "{}/Accounts/{}/{resource}.json",
            self.api_base, self.account_sid
        )
    }

    /// Places an outbound call. The answered leg POSTs to `answer_url`;
    /// lifecycle events POST to `status_callback`.
    pub async fn create_call(
        &self,
        to: &str,
        answer_url: &str,
        status_callback: &str,
    ) -> Result<CallResource, DoorstepError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("To", to),
            ("From", &self.from),
            ("Url", answer_url),
            ("Method", "POST"),
            ("StatusCallback", status_callback),
            ("StatusCallbackMethod", "POST"),
        ];
        for event in STATUS_EVENTS {
            form.push(("StatusCallbackEvent", event));
        }
        self.post_form(&self.resource_url("Calls"), &form).await
    }

    /// Sends a text message from the account's caller number.
    pub async fn create_message(
        &self,
        to: &str,
        body: &str,
    ) -> Result<MessageResource, DoorstepError> {
        let form = [("To", to), ("From", self.from.as_str()), ("Body", body)];
        self.post_form(&self.resource_url("Messages"), &form).await
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<T, DoorstepError> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(form)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        debug!(status = %status, url, "telephony response received");

        let body = response.text().await.map_err(|e| self.request_error(e))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| DoorstepError::Provider {
                provider: PROVIDER,
                message: format!("failed to parse provider response: {e}"),
                retryable: true,
                source: Some(Box::new(e)),
            });
        }

        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => match api_err.code {
                Some(code) => format!("provider returned {status} ({code}): {}", api_err.message),
                None => format!("provider returned {status}: {}", api_err.message),
            },
            Err(_) => format!("provider returned {status}: {body}"),
        };

        if is_transient_status(status) {
            Err(DoorstepError::transient(PROVIDER, message))
        } else {
            Err(DoorstepError::permanent(PROVIDER, message))
        }
    }

    fn request_error(&self, e: reqwest::Error) -> DoorstepError {
        if e.is_timeout() {
            return DoorstepError::Timeout {
                duration: self.timeout,
            };
        }
        DoorstepError::Provider {
            provider: PROVIDER,
            message: format!("HTTP request failed: {e}"),
            retryable: true,
            source: Some(Box::new(e)),
        }
    }
}

/// Rate limiting and server-side failures are worth a queue retry; any other
/// 4xx (bad number, unverified caller, bad credentials) is not.
fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base: &str) -> TwilioClient {
        TwilioClient::new(
            base,
            "AC123".into(),
            "token".into(),
            "+15550001111".into(),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_call_posts_form_with_callbacks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Accounts/AC123/Calls.json"))
            .and(header_exists("authorization"))
            .and(body_string_contains("To=%2B15559998888"))
            .and(body_string_contains("StatusCallbackEvent=answered"))
            .and(body_string_contains("delivery_id%3DD1"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"sid": "CA1", "status": "queued"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let call = test_client(&server.uri())
            .create_call(
                "+15559998888",
                "https://h/webhooks/voice?delivery_id=D1",
                "https://h/webhooks/call-status?delivery_id=D1",
            )
            .await
            .unwrap();
        assert_eq!(call.sid, "CA1");
        assert_eq!(call.status, "queued");
    }

    #[tokio::test]
    async fn client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 21211,
                "message": "The 'To' number is not a valid phone number."
            })))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .create_call("bogus", "u", "s")
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("21211"), "got: {err}");
    }

    #[tokio::test]
    async fn server_error_and_rate_limit_are_transient() {
        for code in [429u16, 500, 503] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(code).set_body_string("unavailable"))
                .mount(&server)
                .await;

            let err = test_client(&server.uri())
                .create_message("+15559998888", "hi")
                .await
                .unwrap_err();
            assert!(err.is_retryable(), "{code} should be transient");
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"sid": "CA1", "status": "queued"}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .create_call("+1555", "u", "s")
            .await
            .unwrap_err();
        assert!(matches!(err, DoorstepError::Timeout { .. }), "got: {err:?}");
        assert!(err.is_retryable());
    }
}
