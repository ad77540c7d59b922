//! The publish gate: extract → allow-list → verify.

use std::fmt;

use tracing::debug;

use crate::services::auth::{
    AuthError, TokenVerifier, TrustedIssuers, VerifiedIdentity, claims::UnverifiedToken,
};

/// Composes the three checks a publish request goes through, cheapest first.
pub struct Gateway {
    issuers: TrustedIssuers,
    verifier: TokenVerifier,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("issuers", &self.issuers)
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl Gateway {
    pub fn new(issuers: TrustedIssuers, verifier: TokenVerifier) -> Self {
        Self { issuers, verifier }
    }

    /// Authorize a request from its `Authorization` header value.
    pub async fn authorize(&self, authorization: Option<&str>) -> Result<VerifiedIdentity, AuthError> {
        let token = UnverifiedToken::from_authorization(authorization)?;
        let issuer = self.issuers.admit(token.claims())?;

        debug!(%issuer, subject = %token.claims().sub, "verifying publish token");
        self.verifier.verify(&token, &issuer).await
    }
}
