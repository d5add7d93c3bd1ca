//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for login and logout, plus the password hashing and
//! session cookie signing shared with the auth middleware.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use fee_tracker_core::ports::{DatabaseService, PortError};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AdminSeed;
use crate::web::{error::RequestError, state::AppState};

type HmacSha256 = Hmac<Sha256>;

/// Name of the cookie carrying the signed session token.
pub const SESSION_COOKIE: &str = "session";

/// How long a login session stays valid.
pub const SESSION_TTL_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub id: Uuid,
    pub username: String,
}

//=========================================================================================
// Passwords
//=========================================================================================

pub fn hash_password(password: &str) -> Result<String, RequestError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            RequestError::Storage("Failed to hash password".to_string())
        })
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, RequestError> {
    let parsed_hash = PasswordHash::new(stored_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        RequestError::Storage("Authentication error".to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

//=========================================================================================
// Session Cookies
//=========================================================================================

fn session_mac(secret: &str, session_id: Uuid) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(session_id.as_bytes());
    Some(mac)
}

/// Produces the cookie value `<session id>.<hex hmac>`.
pub fn sign_session(secret: &str, session_id: Uuid) -> Option<String> {
    let signature = session_mac(secret, session_id)?.finalize().into_bytes();
    Some(format!("{}.{}", session_id, hex::encode(signature)))
}

/// Returns the session id if the token carries a valid signature.
pub fn verify_session_token(secret: &str, token: &str) -> Option<Uuid> {
    let (id_part, signature_part) = token.split_once('.')?;
    let session_id = Uuid::parse_str(id_part).ok()?;
    let signature = hex::decode(signature_part).ok()?;
    session_mac(secret, session_id)?
        .verify_slice(&signature)
        .ok()
        .map(|_| session_id)
}

/// Extracts the raw `session` cookie value from the request headers.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| c.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
}

fn session_cookie_header(value: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, value, max_age_seconds
    )
}

//=========================================================================================
// Bootstrap
//=========================================================================================

/// Creates the configured admin account when no account exists yet.
pub async fn bootstrap_admin(db: &dyn DatabaseService, seed: &AdminSeed) -> Result<bool, RequestError> {
    let existing = db
        .count_users()
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to count users"))?;
    if existing > 0 {
        return Ok(false);
    }

    let password_hash = hash_password(&seed.password)?;
    match db.create_user(&seed.username, &password_hash).await {
        Ok(account) => {
            info!("Created bootstrap account '{}'.", account.username);
            Ok(true)
        }
        // Another instance won the race.
        Err(PortError::Conflict(_)) => Ok(false),
        Err(e) => Err(RequestError::from_port(e, "Failed to create bootstrap account")),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RequestError> {
    let Json(req) = payload.map_err(|e| RequestError::BadRequest(e.body_text()))?;
    let (username, password) = match (req.username, req.password) {
        (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => (u.trim().to_string(), p),
        _ => {
            return Err(RequestError::BadRequest(
                "Username and password are required".to_string(),
            ))
        }
    };

    // 1. Get user by username
    let credentials = match state.db.get_user_credentials(&username).await {
        Ok(credentials) => credentials,
        Err(PortError::NotFound(_)) => {
            warn!("Login attempt for unknown user '{}'.", username);
            return Err(RequestError::Unauthenticated);
        }
        Err(e) => return Err(RequestError::from_port(e, "Failed to load user")),
    };

    // 2. Verify password
    if !verify_password(&password, &credentials.hashed_password)? {
        warn!("Invalid password for user '{}'.", username);
        return Err(RequestError::Unauthenticated);
    }

    // 3. Create auth session in database
    let session_id = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::days(SESSION_TTL_DAYS);
    state
        .db
        .create_auth_session(session_id, credentials.user_id, expires_at)
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to create session"))?;

    // 4. Sign the session id into the cookie
    let token = sign_session(&state.config.session_secret, session_id).ok_or_else(|| {
        error!("Failed to sign session cookie.");
        RequestError::Storage("Failed to create session".to_string())
    })?;
    let cookie = session_cookie_header(&token, Duration::days(SESSION_TTL_DAYS).num_seconds());
    info!("User '{}' logged in.", credentials.username);

    let response = AuthResponse {
        id: credentials.user_id,
        username: credentials.username,
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RequestError> {
    let session_id = session_cookie(&headers)
        .and_then(|token| verify_session_token(&state.config.session_secret, token))
        .ok_or(RequestError::Unauthenticated)?;

    state
        .db
        .delete_auth_session(session_id)
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to logout"))?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie_header("", 0))],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn signed_token_verifies_with_the_same_secret_only() {
        let session_id = Uuid::new_v4();
        let token = sign_session(SECRET, session_id).expect("sign");

        assert_eq!(verify_session_token(SECRET, &token), Some(session_id));
        assert_eq!(
            verify_session_token("another-secret-another-secret-xx", &token),
            None
        );
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let token = sign_session(SECRET, Uuid::new_v4()).expect("sign");
        let (_, signature) = token.split_once('.').expect("token has two parts");
        let forged = format!("{}.{}", Uuid::new_v4(), signature);

        assert_eq!(verify_session_token(SECRET, &forged), None);
        assert_eq!(verify_session_token(SECRET, "not-a-token"), None);
        assert_eq!(verify_session_token(SECRET, ""), None);
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc.def; lang=en"),
        );
        assert_eq!(session_cookie(&headers), Some("abc.def"));
    }

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("admin123").expect("hash");
        assert!(verify_password("admin123", &hash).expect("verify"));
        assert!(!verify_password("wrong", &hash).expect("verify"));
    }
}
