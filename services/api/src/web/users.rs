//! services/api/src/web/users.rs
//!
//! Operator account management. Password hashes never leave the server.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use fee_tracker_core::domain::UserAccount;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{
    auth::hash_password,
    error::RequestError,
    state::{ActingUser, AppState},
    students::MessageResponse,
};

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserAccount> for UserResponse {
    fn from(u: UserAccount) -> Self {
        Self {
            id: u.id,
            username: u.username,
            created_at: u.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// List operator accounts.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = [UserResponse]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, RequestError> {
    let users = state
        .db
        .list_users()
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to load users"))?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Create an operator account.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Not logged in"),
        (status = 409, description = "Username already exists"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<ActingUser>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
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

    let password_hash = hash_password(&password)?;
    let account = state
        .db
        .create_user(&username, &password_hash)
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to create user"))?;
    info!("User {} created account '{}'.", actor.id(), account.username);

    Ok((StatusCode::CREATED, Json(UserResponse::from(account))))
}

/// Delete an operator account. An operator cannot delete themselves.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 400, description = "Attempted to delete own account"),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such user"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<ActingUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, RequestError> {
    if user_id == actor.id() {
        return Err(RequestError::SelfDeletionDenied);
    }

    state
        .db
        .delete_user(user_id)
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to delete user"))?;
    info!("User {} deleted account {}.", actor.id(), user_id);

    Ok(Json(MessageResponse {
        message: "User deleted".to_string(),
    }))
}
