//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::{
    auth::{session_cookie, verify_session_token},
    error::RequestError,
    state::{ActingUser, AppState},
};
use fee_tracker_core::ports::PortError;

/// Middleware that validates the signed session cookie and resolves the acting user.
///
/// If valid, inserts an `ActingUser` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized before any handler runs.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Extract and verify the cookie signature
    let Some(session_id) = session_cookie(req.headers())
        .and_then(|token| verify_session_token(&state.config.session_secret, token))
    else {
        debug!("Rejected request to {} without a valid session cookie.", req.uri().path());
        return RequestError::Unauthenticated.into_response();
    };

    // 2. Validate auth session in database, get user_id
    let user_id = match state.db.validate_auth_session(session_id).await {
        Ok(user_id) => user_id,
        Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
            return RequestError::Unauthenticated.into_response();
        }
        Err(e) => {
            // The caller still only learns that it is unauthenticated.
            error!("Failed to validate auth session: {:?}", e);
            return RequestError::Unauthenticated.into_response();
        }
    };

    // 3. Insert the acting user into request extensions
    req.extensions_mut().insert(ActingUser(user_id));

    // 4. Continue to the handler
    next.run(req).await
}
