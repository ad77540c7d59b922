//! Bearer token parsing without signature verification.
//!
//! Reading `iss`/`sub` up front lets the allow-list reject a token before any
//! key set is fetched. Nothing here is trusted: an [`UnverifiedToken`] is only
//! ever an input to [`TokenVerifier`](super::TokenVerifier).

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::Header;
use serde::Deserialize;

use crate::services::auth::AuthError;

const BEARER: &str = "bearer";

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Default for Audience {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(s) => s == audience,
            Self::Many(all) => all.iter().any(|s| s == audience),
        }
    }
}

/// Claims as the token states them, before anyone checked the signature.
#[derive(Debug, Clone, Deserialize)]
pub struct UnverifiedClaims {
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub aud: Audience,
    #[serde(default)]
    pub exp: Option<u64>,
}

#[derive(Clone)]
pub struct UnverifiedToken {
    raw: String,
    header: Header,
    claims: UnverifiedClaims,
}

// Do not print the token itself.
impl fmt::Debug for UnverifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnverifiedToken")
            .field("alg", &self.header.alg)
            .field("kid", &self.header.kid)
            .field("claims", &self.claims)
            .finish()
    }
}

impl UnverifiedToken {
    /// Parse the value of an `Authorization` header (`Bearer <jwt>`).
    pub fn from_authorization(value: Option<&str>) -> Result<Self, AuthError> {
        let value = value.ok_or(AuthError::MalformedHeader)?;

        let (scheme, token) = value
            .trim()
            .split_once(' ')
            .ok_or(AuthError::MalformedHeader)?;
        if !scheme.eq_ignore_ascii_case(BEARER) {
            return Err(AuthError::MalformedHeader);
        }

        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MalformedHeader);
        }

        Self::parse(token)
    }

    /// Decode a compact JWS into its header and claims.
    pub fn parse(token: &str) -> Result<Self, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(AuthError::MalformedToken("expected three segments"));
        }

        let header = jsonwebtoken::decode_header(token)
            .map_err(|_| AuthError::MalformedToken("undecodable header"))?;

        let payload = URL_SAFE_NO_PAD
            .decode(segments[1])
            .map_err(|_| AuthError::MalformedToken("payload is not base64url"))?;
        let claims: UnverifiedClaims = serde_json::from_slice(&payload)
            .map_err(|_| AuthError::MalformedToken("payload is not a claim set"))?;

        Ok(Self {
            raw: token.to_string(),
            header,
            claims,
        })
    }

    pub fn claims(&self) -> &UnverifiedClaims {
        &self.claims
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub(super) fn raw(&self) -> &str {
        &self.raw
    }
}
