// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Web push delivery: VAPID authentication and `aes128gcm` payload encryption.
//!
//! Payloads are encrypted per RFC 8291 (a single record, record size 4096)
//! and the request is authenticated with an ES256 VAPID token (RFC 8292).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use doorstep_config::model::PushConfig;
use doorstep_core::DoorstepError;
use ring::aead::{AES_128_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::agreement::{ECDH_P256, EphemeralPrivateKey, UnparsedPublicKey, agree_ephemeral};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{PushDelivery, PushSender};

const RECORD_SIZE: u32 = 4096;
const MESSAGE_TTL_SECS: u32 = 24 * 60 * 60;
const TOKEN_LIFETIME_SECS: i64 = 12 * 60 * 60;

/// A browser push subscription as stored on the agent record.
#[derive(Debug, Clone, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Decodes base64url, tolerating padding and the standard alphabet.
pub fn decode_b64url(raw: &str) -> Option<Vec<u8>> {
    let normalized: String = raw
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_NO_PAD.decode(normalized).ok()
}

struct Len(usize);

impl hkdf::KeyType for Len {
    fn len(&self) -> usize {
        self.0
    }
}

fn hkdf_expand(salt: &[u8], ikm: &[u8], info: &[&[u8]], out: &mut [u8]) -> Option<()> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(ikm);
    prk.expand(info, Len(out.len())).ok()?.fill(out).ok()
}

/// Derives the content encryption key and nonce for one message.
pub fn derive_content_keys(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Option<([u8; 16], [u8; 12])> {
    let mut ikm = [0u8; 32];
    hkdf_expand(
        auth_secret,
        ecdh_secret,
        &[b"WebPush: info\0", ua_public, as_public],
        &mut ikm,
    )?;

    let mut cek = [0u8; 16];
    hkdf_expand(salt, &ikm, &[b"Content-Encoding: aes128gcm\0"], &mut cek)?;
    let mut nonce = [0u8; 12];
    hkdf_expand(salt, &ikm, &[b"Content-Encoding: nonce\0"], &mut nonce)?;
    Some((cek, nonce))
}

/// Builds the `aes128gcm` body: header (salt, record size, key id) followed
/// by the single encrypted record.
pub fn encode_record(
    salt: &[u8; 16],
    as_public: &[u8],
    cek: &[u8; 16],
    nonce: [u8; 12],
    plaintext: &[u8],
) -> Option<Vec<u8>> {
    let key = LessSafeKey::new(UnboundKey::new(&AES_128_GCM, cek).ok()?);
    let mut record = Vec::with_capacity(plaintext.len() + 17);
    record.extend_from_slice(plaintext);
    // Last-record delimiter, no further padding.
    record.push(0x02);
    key.seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut record)
        .ok()?;

    let key_id_len = u8::try_from(as_public.len()).ok()?;
    let mut body = Vec::with_capacity(16 + 4 + 1 + as_public.len() + record.len());
    body.extend_from_slice(salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(key_id_len);
    body.extend_from_slice(as_public);
    body.extend_from_slice(&record);
    Some(body)
}

/// Encrypts a payload for a subscription with a fresh ephemeral key and salt.
pub fn encrypt(
    rng: &SystemRandom,
    payload: &[u8],
    ua_public: &[u8],
    auth_secret: &[u8],
) -> Option<Vec<u8>> {
    let ephemeral = EphemeralPrivateKey::generate(&ECDH_P256, rng).ok()?;
    let as_public = ephemeral.compute_public_key().ok()?.as_ref().to_vec();
    let ecdh_secret = agree_ephemeral(
        ephemeral,
        &UnparsedPublicKey::new(&ECDH_P256, ua_public),
        |secret| secret.to_vec(),
    )
    .ok()?;

    let mut salt = [0u8; 16];
    rng.fill(&mut salt).ok()?;
    let (cek, nonce) = derive_content_keys(&ecdh_secret, auth_secret, ua_public, &as_public, &salt)?;
    encode_record(&salt, &as_public, &cek, nonce, payload)
}

/// ES256 signer for VAPID tokens.
pub struct VapidSigner {
    key_pair: EcdsaKeyPair,
    public_key: String,
    subject: String,
}

impl VapidSigner {
    /// Builds a signer from base64url keys. The private key is either the raw
    /// 32-byte scalar (the usual VAPID export) or a PKCS#8 document.
    pub fn new(
        public_key: &str,
        private_key: &str,
        subject: &str,
        rng: &SystemRandom,
    ) -> Result<Self, DoorstepError> {
        let public = decode_b64url(public_key)
            .ok_or_else(|| DoorstepError::Config("VAPID public key is not base64url".into()))?;
        let private = decode_b64url(private_key)
            .ok_or_else(|| DoorstepError::Config("VAPID private key is not base64url".into()))?;

        let key_pair = if private.len() == 32 {
            EcdsaKeyPair::from_private_key_and_public_key(
                &ECDSA_P256_SHA256_FIXED_SIGNING,
                &private,
                &public,
                rng,
            )
        } else {
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &private, rng)
        }
        .map_err(|e| DoorstepError::Config(format!("invalid VAPID key pair: {e}")))?;

        if key_pair.public_key().as_ref() != public.as_slice() {
            return Err(DoorstepError::Config(
                "VAPID public key does not match the private key".into(),
            ));
        }

        Ok(Self {
            key_pair,
            public_key: URL_SAFE_NO_PAD.encode(&public),
            subject: subject.to_string(),
        })
    }

    /// Signed JWT for the push service origin, valid until `expires_at`.
    pub fn token(&self, audience: &str, expires_at: i64, rng: &SystemRandom) -> Option<String> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"typ":"JWT","alg":"ES256"}"#);
        let claims = serde_json::json!({
            "aud": audience,
            "exp": expires_at,
            "sub": self.subject,
        });
        let claims = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{header}.{claims}");
        let signature = self.key_pair.sign(rng, signing_input.as_bytes()).ok()?;
        Some(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.as_ref())
        ))
    }

    /// `Authorization` header value.
    pub fn authorization(&self, audience: &str, expires_at: i64, rng: &SystemRandom) -> Option<String> {
        let token = self.token(audience, expires_at, rng)?;
        Some(format!("vapid t={token}, k={}", self.public_key))
    }
}

/// Origin (`scheme://host[:port]`) of a push endpoint.
pub fn audience(endpoint: &str) -> Option<String> {
    let url = reqwest::Url::parse(endpoint).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

/// Web push sender. Disabled when VAPID keys are missing or invalid.
pub struct WebPushSender {
    http: reqwest::Client,
    signer: Option<VapidSigner>,
    rng: SystemRandom,
}

impl WebPushSender {
    pub fn new(config: &PushConfig) -> Result<Self, DoorstepError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DoorstepError::Provider {
                provider: "push",
                message: format!("failed to build HTTP client: {e}"),
                retryable: false,
                source: Some(Box::new(e)),
            })?;
        let rng = SystemRandom::new();

        let signer = match (&config.vapid_public_key, &config.vapid_private_key) {
            (Some(public), Some(private)) => {
                match VapidSigner::new(public, private, &config.subject, &rng) {
                    Ok(signer) => {
                        info!("web push initialized");
                        Some(signer)
                    }
                    Err(e) => {
                        warn!(error = %e, "web push disabled");
                        None
                    }
                }
            }
            _ => {
                warn!("VAPID keys missing, web push disabled");
                None
            }
        };

        Ok(Self { http, signer, rng })
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    fn is_enabled(&self) -> bool {
        self.signer.is_some()
    }

    async fn send(&self, subscription: &str, payload: &[u8], urgent: bool) -> PushDelivery {
        let Some(signer) = &self.signer else {
            return PushDelivery::Disabled;
        };

        let Ok(subscription) = serde_json::from_str::<PushSubscription>(subscription) else {
            return PushDelivery::Expired;
        };
        let (Some(ua_public), Some(auth_secret), Some(audience)) = (
            decode_b64url(&subscription.keys.p256dh),
            decode_b64url(&subscription.keys.auth),
            audience(&subscription.endpoint),
        ) else {
            return PushDelivery::Expired;
        };

        let Some(body) = encrypt(&self.rng, payload, &ua_public, &auth_secret) else {
            return PushDelivery::Expired;
        };
        let expires_at = chrono::Utc::now().timestamp() + TOKEN_LIFETIME_SECS;
        let Some(authorization) = signer.authorization(&audience, expires_at, &self.rng) else {
            return PushDelivery::Failed("failed to sign VAPID token".into());
        };

        let response = self
            .http
            .post(&subscription.endpoint)
            .header("authorization", authorization)
            .header("ttl", MESSAGE_TTL_SECS.to_string())
            .header("content-encoding", "aes128gcm")
            .header("content-type", "application/octet-stream")
            .header("urgency", if urgent { "high" } else { "normal" })
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                debug!(status = %status, "push service responded");
                match status.as_u16() {
                    200..=299 => PushDelivery::Delivered,
                    400 | 404 | 410 => PushDelivery::Expired,
                    _ => PushDelivery::Failed(format!("push service returned {status}")),
                }
            }
            Err(e) => PushDelivery::Failed(format!("push request failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::signature::{ECDSA_P256_SHA256_FIXED, UnparsedPublicKey as VerifyKey};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn b64(raw: &str) -> Vec<u8> {
        decode_b64url(raw).unwrap()
    }

    /// Key derivation and record encoding against RFC 8291 Appendix A.
    #[test]
    fn matches_rfc8291_example() {
        let ua_public = b64("BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4");
        let as_public = b64("BP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLocInmYWAmS6TlzAC8wEqKK6PBru3jl7A8");
        let salt: [u8; 16] = b64("DGv6ra1nlYgDCS1FRnbzlw").try_into().unwrap();

        let (cek, nonce) = derive_content_keys(
            &b64("kyrL1jIIOHEzg3sM2ZWRHDRB62YACZhhSlknJ672kSs"),
            &b64("BTBZMqHH6r4Tts7J_aSIgg"),
            &ua_public,
            &as_public,
            &salt,
        )
        .unwrap();
        assert_eq!(URL_SAFE_NO_PAD.encode(cek), "oIhVW04MRdy2XN9CiKLxTg");
        assert_eq!(URL_SAFE_NO_PAD.encode(nonce), "4h_95klXJ5E_qnoN");

        let body = encode_record(
            &salt,
            &as_public,
            &cek,
            nonce,
            b"When I grow up, I want to be a watermelon",
        )
        .unwrap();
        assert_eq!(
            URL_SAFE_NO_PAD.encode(body),
            "DGv6ra1nlYgDCS1FRnbzlwAAEABBBP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLocInmYWAmS6TlzAC8wEqKK6PBru3jl7A_yl95bQpu6cVPTpK4Mqgkf1CXztLVBSt2Ks3oZwbuwXPXLWyouBWLVWGNWQexSgSxsj_Qulcy4a-fN"
        );
    }

    #[test]
    fn receiver_can_decrypt() {
        let rng = SystemRandom::new();
        let ua_private = EphemeralPrivateKey::generate(&ECDH_P256, &rng).unwrap();
        let ua_public = ua_private.compute_public_key().unwrap().as_ref().to_vec();
        let auth_secret = [7u8; 16];

        let body = encrypt(&rng, b"{\"title\":\"hi\"}", &ua_public, &auth_secret).unwrap();
        let salt = &body[..16];
        assert_eq!(&body[16..20], &RECORD_SIZE.to_be_bytes());
        let key_id_len = body[20] as usize;
        let as_public = &body[21..21 + key_id_len];
        let record = &body[21 + key_id_len..];

        let secret = agree_ephemeral(
            ua_private,
            &UnparsedPublicKey::new(&ECDH_P256, as_public),
            |s| s.to_vec(),
        )
        .unwrap();
        let (cek, nonce) =
            derive_content_keys(&secret, &auth_secret, &ua_public, as_public, salt).unwrap();
        let key = LessSafeKey::new(UnboundKey::new(&AES_128_GCM, &cek).unwrap());
        let mut in_out = record.to_vec();
        let plain = key
            .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .unwrap();
        assert_eq!(plain.last(), Some(&0x02));
        assert_eq!(&plain[..plain.len() - 1], b"{\"title\":\"hi\"}");
    }

    fn generated_keys(rng: &SystemRandom) -> (String, String) {
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, rng).unwrap();
        let pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), rng).unwrap();
        (
            URL_SAFE_NO_PAD.encode(pair.public_key().as_ref()),
            URL_SAFE_NO_PAD.encode(pkcs8.as_ref()),
        )
    }

    #[test]
    fn vapid_token_verifies_with_public_key() {
        let rng = SystemRandom::new();
        let (public, private) = generated_keys(&rng);
        let signer = VapidSigner::new(&public, &private, "mailto:ops@example.com", &rng).unwrap();

        let token = signer.token("https://push.example.com", 1_900_000_000, &rng).unwrap();
        let mut parts = token.rsplitn(2, '.');
        let signature = b64(parts.next().unwrap());
        let signing_input = parts.next().unwrap();

        VerifyKey::new(&ECDSA_P256_SHA256_FIXED, b64(&public))
            .verify(signing_input.as_bytes(), &signature)
            .unwrap();

        let claims: serde_json::Value =
            serde_json::from_slice(&b64(signing_input.split('.').nth(1).unwrap())).unwrap();
        assert_eq!(claims["aud"], "https://push.example.com");
        assert_eq!(claims["sub"], "mailto:ops@example.com");

        let header = signer
            .authorization("https://push.example.com", 1_900_000_000, &rng)
            .unwrap();
        assert!(header.starts_with("vapid t="));
        assert!(header.ends_with(&format!("k={public}")));
    }

    #[test]
    fn mismatched_vapid_keys_are_rejected() {
        let rng = SystemRandom::new();
        let (public_a, _) = generated_keys(&rng);
        let (_, private_b) = generated_keys(&rng);
        assert!(VapidSigner::new(&public_a, &private_b, "mailto:x", &rng).is_err());
    }

    #[test]
    fn audience_is_endpoint_origin() {
        assert_eq!(
            audience("https://fcm.googleapis.com/fcm/send/abc").as_deref(),
            Some("https://fcm.googleapis.com")
        );
        assert_eq!(
            audience("http://127.0.0.1:8080/push/1").as_deref(),
            Some("http://127.0.0.1:8080")
        );
    }

    fn sender(rng: &SystemRandom) -> WebPushSender {
        let (public, private) = generated_keys(rng);
        WebPushSender::new(&PushConfig {
            vapid_public_key: Some(public),
            vapid_private_key: Some(private),
            ..PushConfig::default()
        })
        .unwrap()
    }

    fn subscription(endpoint: &str) -> String {
        let rng = SystemRandom::new();
        let ua = EphemeralPrivateKey::generate(&ECDH_P256, &rng).unwrap();
        serde_json::json!({
            "endpoint": endpoint,
            "keys": {
                "p256dh": URL_SAFE_NO_PAD.encode(ua.compute_public_key().unwrap().as_ref()),
                "auth": URL_SAFE_NO_PAD.encode([3u8; 16]),
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn delivers_encrypted_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push/agent-1"))
            .and(header("content-encoding", "aes128gcm"))
            .and(header("urgency", "high"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let rng = SystemRandom::new();
        let outcome = sender(&rng)
            .send(&subscription(&format!("{}/push/agent-1", server.uri())), b"{}", true)
            .await;
        assert_eq!(outcome, PushDelivery::Delivered);
    }

    #[tokio::test]
    async fn gone_subscription_is_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let rng = SystemRandom::new();
        let push = sender(&rng);
        let outcome = push
            .send(&subscription(&format!("{}/push/x", server.uri())), b"{}", false)
            .await;
        assert_eq!(outcome, PushDelivery::Expired);

        assert_eq!(push.send("not json", b"{}", false).await, PushDelivery::Expired);
    }

    #[tokio::test]
    async fn server_error_is_a_plain_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let rng = SystemRandom::new();
        let outcome = sender(&rng)
            .send(&subscription(&format!("{}/push/x", server.uri())), b"{}", false)
            .await;
        assert!(matches!(outcome, PushDelivery::Failed(_)));
    }

    #[tokio::test]
    async fn missing_keys_disable_push() {
        let push = WebPushSender::new(&PushConfig::default()).unwrap();
        assert!(!push.is_enabled());
        assert_eq!(push.send("{}", b"{}", false).await, PushDelivery::Disabled);
    }
}
