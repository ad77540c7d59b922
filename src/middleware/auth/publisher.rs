//! Publish gate middleware: bearer token → `VerifiedIdentity` in extensions.
//!
//! Requests are only passed on once the token's issuer is trusted and its
//! signature, audience and expiry check out. Every refusal is a bare 401; the
//! reason is logged here, without the token.

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::state::AppState;

/// Put the publish gate in front of every route in `router`.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // route_layer: unknown paths stay 404 instead of turning into 401
    router.route_layer(middleware::from_fn_with_state(state, publisher_middleware))
}

async fn publisher_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let identity = match state.gateway.authorize(authorization).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(reason = %err, "publish request rejected");
            return Err(err.into());
        }
    };

    debug!(
        subject = identity.subject(),
        issuer = identity.issuer(),
        "publisher verified"
    );
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
