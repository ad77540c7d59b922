use thiserror::Error;

use crate::services::auth::jwks::KeySetError;

/// Reasons a publish request is refused by the gateway.
///
/// Every variant surfaces to the caller as the same 401; the variant itself is
/// only ever written to the server log. None of them carry the raw token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed authorization header")]
    MalformedHeader,
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),
    #[error("issuer not trusted: {0}")]
    UntrustedIssuer(String),
    #[error("token has no subject")]
    MissingSubject,
    #[error("subject cannot name a storage directory")]
    InvalidSubject,
    #[error("key set unavailable: {0}")]
    KeyFetchFailed(#[from] KeySetError),
    #[error("signature rejected: {0}")]
    SignatureInvalid(&'static str),
    #[error("audience mismatch")]
    AudienceMismatch,
    #[error("token expired")]
    Expired,
}
