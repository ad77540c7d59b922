pub mod claims;
pub mod error;
pub mod gateway;
pub mod issuers;
pub mod jwks;
pub mod verifier;

pub use error::AuthError;
pub use gateway::Gateway;
pub use issuers::TrustedIssuers;
pub use jwks::{HttpKeySetFetcher, KeySetCache, KeySetError, KeySetFetcher};
pub use verifier::{TokenVerifier, VerifiedIdentity};

use std::sync::Arc;

use crate::config::Config;

/// Build the publish gateway from application `Config`.
pub fn build_gateway(config: &Config) -> Result<Arc<Gateway>, KeySetError> {
    let fetcher = Arc::new(HttpKeySetFetcher::new()?);
    let keys = Arc::new(KeySetCache::new(fetcher, config.jwks_cache_ttl));
    let verifier = TokenVerifier::new(keys, config.token_leeway_seconds);

    Ok(Arc::new(Gateway::new(
        TrustedIssuers::new(&config.allowed_issuers),
        verifier,
    )))
}
