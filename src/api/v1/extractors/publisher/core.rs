use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::auth::VerifiedIdentity;
use crate::state::AppState;

/// The identity the publish gate inserted into request extensions.
///
/// Rejects with 401 when it is missing, i.e. the route was mounted without
/// the gate.
#[derive(Debug, Clone)]
pub struct Publisher(pub VerifiedIdentity);

impl FromRequestParts<AppState> for Publisher {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .map(Publisher)
            .ok_or(AppError::Unauthorized)
    }
}
