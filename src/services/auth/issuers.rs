//! Issuer allow-list, checked before any network round-trip.

use std::collections::BTreeSet;

use url::Url;

use crate::services::auth::{AuthError, claims::UnverifiedClaims};

/// Hostnames of identity servers whose tokens this instance accepts.
///
/// An empty set is open mode: any `http`/`https` issuer proceeds to signature
/// verification.
#[derive(Debug, Clone, Default)]
pub struct TrustedIssuers {
    hosts: BTreeSet<String>,
}

impl TrustedIssuers {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { hosts }
    }

    pub fn is_open(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Decide whether claims from this issuer may go on to verification.
    ///
    /// Returns the parsed issuer URL the key set will be fetched from.
    pub fn admit(&self, claims: &UnverifiedClaims) -> Result<Url, AuthError> {
        let issuer = Url::parse(&claims.iss)
            .map_err(|_| AuthError::UntrustedIssuer(claims.iss.clone()))?;

        if !matches!(issuer.scheme(), "http" | "https") {
            return Err(AuthError::UntrustedIssuer(claims.iss.clone()));
        }
        let host = issuer
            .host_str()
            .ok_or_else(|| AuthError::UntrustedIssuer(claims.iss.clone()))?
            .to_ascii_lowercase();

        if claims.sub.trim().is_empty() {
            return Err(AuthError::MissingSubject);
        }

        if !self.is_open() && !self.hosts.contains(&host) {
            return Err(AuthError::UntrustedIssuer(host));
        }

        Ok(issuer)
    }
}
