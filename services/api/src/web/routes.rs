//! services/api/src/web/routes.rs
//!
//! Assembles the HTTP router: public auth routes, cookie-protected resource
//! routes, and the Swagger UI.

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ConfigError;
use crate::web::{
    auth::{login_handler, logout_handler},
    middleware::require_auth,
    rest::ApiDoc,
    state::AppState,
    students::{
        clear_students_handler, delete_student_handler, list_students_handler,
        update_student_handler, upload_students_handler,
    },
    users::{create_user_handler, delete_user_handler, list_users_handler},
};

/// Largest accepted request body. Roster uploads arrive as one JSON array.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(app_state: Arc<AppState>) -> Result<Router, ConfigError> {
    let origin = HeaderValue::from_str(&app_state.config.cors_origin).map_err(|e| {
        ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string())
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/students",
            get(list_students_handler).delete(clear_students_handler),
        )
        .route("/students/upload", post(upload_students_handler))
        .route(
            "/students/{id}",
            put(update_student_handler).delete(delete_student_handler),
        )
        .route("/users", get(list_users_handler).post(create_user_handler))
        .route("/users/{id}", axum::routing::delete(delete_user_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())))
}
