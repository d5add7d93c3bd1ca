//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-request identity.

use crate::config::Config;
use fee_tracker_core::ports::DatabaseService;
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
}

//=========================================================================================
// ActingUser (Specific to One Request)
//=========================================================================================

/// The authenticated operator making the current request.
///
/// Inserted into request extensions by `require_auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub Uuid);

impl ActingUser {
    pub fn id(self) -> Uuid {
        self.0
    }
}
