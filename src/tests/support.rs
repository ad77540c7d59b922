//! Shared fixtures: a signing identity server and an in-memory key set source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{Signer, SigningKey};
use jsonwebtoken::jwk::JwkSet;
use reqwest::StatusCode;
use serde_json::{Value, json};
use url::Url;

use crate::services::auth::{KeySetError, KeySetFetcher};

/// Serve `build(base_url)` on an ephemeral local port and return the base URL.
pub async fn serve_locally<F>(build: F) -> String
where
    F: FnOnce(&str) -> axum::Router,
{
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local listener");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    let router = build(&base);
    tokio::spawn(async move { axum::serve(listener, router).await });
    base
}

pub fn hours_from_now(hours: u64) -> u64 {
    jsonwebtoken::get_current_timestamp() + hours * 60 * 60
}

/// An identity server that signs EdDSA tokens with a fixed key.
pub struct TestIssuer {
    url: String,
    key: SigningKey,
    kid: String,
}

impl TestIssuer {
    pub fn new(url: &str) -> Self {
        Self::with_seed(url, [7; 32])
    }

    pub fn with_seed(url: &str, seed: [u8; 32]) -> Self {
        Self {
            url: url.to_string(),
            key: SigningKey::from_bytes(&seed),
            kid: format!("test-key-{:02x}", seed[0]),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn jwk_set(&self) -> JwkSet {
        let x = URL_SAFE_NO_PAD.encode(self.key.verifying_key().to_bytes());
        serde_json::from_value(json!({
            "keys": [{
                "kty": "OKP",
                "crv": "Ed25519",
                "x": x,
                "kid": self.kid,
                "alg": "EdDSA",
                "use": "sig",
            }]
        }))
        .expect("valid jwk set")
    }

    /// Claims a publish token normally carries, valid for an hour.
    pub fn claims(&self, subject: &str) -> Value {
        json!({
            "iss": self.url,
            "sub": subject,
            "aud": ["tavern"],
            "exp": hours_from_now(1),
        })
    }

    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_header(
            &json!({"alg": "EdDSA", "typ": "JWT", "kid": self.kid}),
            claims,
        )
    }

    pub fn sign_with_header(&self, header: &Value, claims: &Value) -> String {
        let signing_input = format!("{}.{}", encode_segment(header), encode_segment(claims));
        let signature = self.key.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }
}

fn encode_segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).expect("serialize segment"))
}

/// Serves key sets from memory and counts how often it was asked.
#[derive(Default)]
pub struct CountingFetcher {
    sets: HashMap<String, JwkSet>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issuer(self, issuer: &TestIssuer) -> Self {
        let url = issuer.url().to_string();
        self.with_keys_for(&url, issuer)
    }

    pub fn with_keys_for(mut self, url: &str, issuer: &TestIssuer) -> Self {
        let key = Url::parse(url).expect("issuer url").to_string();
        self.sets.insert(key, issuer.jwk_set());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for CountingFetcher {
    async fn fetch(&self, issuer: &Url) -> Result<JwkSet, KeySetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.sets
            .get(issuer.as_str())
            .cloned()
            .ok_or_else(|| KeySetError::Status {
                url: issuer.to_string(),
                status: StatusCode::NOT_FOUND,
            })
    }
}

/// Builds a `multipart/form-data` body by hand.
pub struct MultipartBody {
    boundary: &'static str,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "tavern-test-boundary",
            body: Vec::new(),
        }
    }

    pub fn file(self, field: &str, filename: &str, contents: &[u8]) -> Self {
        let disposition = format!("form-data; name=\"{field}\"; filename=\"{filename}\"");
        self.part(&disposition, contents)
    }

    pub fn text(self, field: &str, value: &str) -> Self {
        let disposition = format!("form-data; name=\"{field}\"");
        self.part(&disposition, value.as_bytes())
    }

    pub fn part(mut self, disposition: &str, contents: &[u8]) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: {disposition}\r\n").as_bytes(),
        );
        self.body
            .extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        self.body.extend_from_slice(contents);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (self.content_type(), self.body)
    }
}
