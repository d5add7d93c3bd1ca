pub mod auth;
pub mod error;
pub mod middleware;
pub mod rest;
pub mod routes;
pub mod state;
pub mod students;
pub mod users;

pub use middleware::require_auth;
pub use routes::build_router;
