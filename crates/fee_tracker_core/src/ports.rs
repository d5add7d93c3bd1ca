//! crates/fee_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    FeeSemester, ReconciliationReport, StudentPatch, StudentRecord, UserAccount,
    UserCredentials, ValidatedBatch,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn count_users(&self) -> PortResult<u64>;

    /// Lists every account, oldest first.
    async fn list_users(&self) -> PortResult<Vec<UserAccount>>;

    /// Fails with `PortError::Conflict` when the username is taken.
    async fn create_user(&self, username: &str, hashed_password: &str)
        -> PortResult<UserAccount>;

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials>;

    /// Removes the account and every auth session belonging to it.
    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the owning user of a live session. Expired sessions are `Unauthorized`.
    async fn validate_auth_session(&self, session_id: Uuid) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: Uuid) -> PortResult<()>;

    // --- Student Management ---
    /// Lists every student, newest first.
    async fn list_students(&self) -> PortResult<Vec<StudentRecord>>;

    /// Upserts a whole batch keyed by enrollment number, as one atomic unit.
    ///
    /// New students start with every fee flag unpaid. Existing students only get
    /// `name`, `branch` and `semester` refreshed.
    async fn reconcile_students(&self, batch: &ValidatedBatch) -> PortResult<ReconciliationReport>;

    /// Applies a validated patch. A clashing enrollment number is `PortError::Conflict`.
    async fn update_student(&self, student_id: Uuid, patch: &StudentPatch)
        -> PortResult<StudentRecord>;

    async fn delete_student(&self, student_id: Uuid) -> PortResult<()>;

    /// Removes every student. Returns how many were removed.
    async fn delete_all_students(&self) -> PortResult<u64>;
}

/// Persists a single fee flag on behalf of the optimistic controller.
#[async_trait]
pub trait FeeStatusWriter: Send + Sync {
    async fn set_fee_status(
        &self,
        student_id: Uuid,
        semester: FeeSemester,
        paid: bool,
    ) -> PortResult<StudentRecord>;
}

/// A user-visible message about the outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Failure(String),
}

impl Notice {
    pub fn is_failure(&self) -> bool {
        matches!(self, Notice::Failure(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Notice::Success(message) | Notice::Failure(message) => message,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}
