use std::sync::Arc;

use jsonwebtoken::{
    Algorithm, DecodingKey, Validation,
    errors::ErrorKind,
    jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm},
};
use serde::Deserialize;
use url::Url;

use crate::services::auth::{AuthError, KeySetCache, claims::UnverifiedToken};

/// Audience every publish token must name.
pub const EXPECTED_AUDIENCE: &str = "tavern";

/// The only signature algorithm accepted, whatever the token header says.
pub const PINNED_ALGORITHM: Algorithm = Algorithm::EdDSA;

/// A publisher identity that passed signature, issuer, audience and expiry
/// checks.
///
/// Only [`TokenVerifier::verify`] builds one, so holding a value is proof
/// the subject was verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    subject: String,
    issuer: String,
}

impl VerifiedIdentity {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[cfg(test)]
    pub(crate) fn for_tests(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            issuer: "http://localhost:35354".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifiedClaims {
    iss: String,
    sub: String,
    exp: u64,
}

/// EdDSA token verifier backed by the issuer key set cache.
#[derive(Debug)]
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    audience: String,
    leeway_seconds: u64,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeySetCache>, leeway_seconds: u64) -> Self {
        Self {
            keys,
            audience: EXPECTED_AUDIENCE.to_string(),
            leeway_seconds,
        }
    }

    /// Verify `token` against the keys published by `issuer`.
    ///
    /// `issuer` must be the URL the allow-list admitted for this token; the
    /// token's `iss` has to match it exactly.
    pub async fn verify(
        &self,
        token: &UnverifiedToken,
        issuer: &Url,
    ) -> Result<VerifiedIdentity, AuthError> {
        if Url::parse(&token.claims().iss).ok().as_ref() != Some(issuer) {
            return Err(AuthError::SignatureInvalid("issuer mismatch"));
        }

        let header = token.header();
        if header.alg != PINNED_ALGORITHM {
            return Err(AuthError::SignatureInvalid("unexpected algorithm"));
        }

        // Dead tokens are refused before spending a key fetch on them.
        let now = jsonwebtoken::get_current_timestamp();
        self.check_expiry(token.claims().exp, now)?;

        let keys = self.keys.get(issuer).await?;

        let mut validation = Validation::new(PINNED_ALGORITHM);
        validation.set_issuer(&[token.claims().iss.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.leeway_seconds;

        let claims = decode_with_any(token, &keys, header.kid.as_deref(), &validation)?;

        self.check_expiry(Some(claims.exp), now)?;
        if claims.iss != token.claims().iss || claims.sub != token.claims().sub {
            return Err(AuthError::SignatureInvalid("claims differ from extraction"));
        }
        if !is_storage_segment(&claims.sub) {
            return Err(AuthError::InvalidSubject);
        }

        Ok(VerifiedIdentity {
            subject: claims.sub,
            issuer: claims.iss,
        })
    }

    // Usable only while `now < exp + leeway`.
    fn check_expiry(&self, exp: Option<u64>, now: u64) -> Result<(), AuthError> {
        match exp {
            Some(exp) if now < exp.saturating_add(self.leeway_seconds) => Ok(()),
            _ => Err(AuthError::Expired),
        }
    }
}

fn decode_with_any(
    token: &UnverifiedToken,
    keys: &JwkSet,
    kid: Option<&str>,
    validation: &Validation,
) -> Result<VerifiedClaims, AuthError> {
    let candidates: Vec<&Jwk> = match kid {
        Some(kid) => keys.find(kid).into_iter().collect(),
        None => keys.keys.iter().collect(),
    };

    let mut last = AuthError::SignatureInvalid("no matching key");
    for jwk in candidates.into_iter().filter(|jwk| is_ed25519(jwk)) {
        let key = match DecodingKey::from_jwk(jwk) {
            Ok(key) => key,
            Err(_) => continue,
        };
        match jsonwebtoken::decode::<VerifiedClaims>(token.raw(), &key, validation) {
            Ok(data) => return Ok(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::InvalidSignature) => {
                last = AuthError::SignatureInvalid("signature does not match");
            }
            Err(e) => return Err(classify(e.kind())),
        }
    }
    Err(last)
}

fn is_ed25519(jwk: &Jwk) -> bool {
    let alg_ok = matches!(jwk.common.key_algorithm, None | Some(KeyAlgorithm::EdDSA));
    let curve_ok = matches!(
        &jwk.algorithm,
        AlgorithmParameters::OctetKeyPair(params) if matches!(params.curve, EllipticCurve::Ed25519)
    );
    alg_ok && curve_ok
}

fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => AuthError::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "exp" => AuthError::Expired,
        ErrorKind::MissingRequiredClaim(claim) if claim == "sub" => AuthError::MissingSubject,
        ErrorKind::InvalidIssuer => AuthError::SignatureInvalid("issuer mismatch"),
        ErrorKind::InvalidAlgorithm => AuthError::SignatureInvalid("unexpected algorithm"),
        ErrorKind::ImmatureSignature => AuthError::SignatureInvalid("token not yet valid"),
        _ => AuthError::SignatureInvalid("verification failed"),
    }
}

// The subject becomes one directory under the upload root.
fn is_storage_segment(subject: &str) -> bool {
    !subject.is_empty()
        && subject != "."
        && subject != ".."
        && !subject.contains(['/', '\\', '\0'])
}
