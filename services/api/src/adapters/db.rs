//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fee_tracker_core::domain::{
    FeeStatus, ReconciliationReport, StudentPatch, StudentRecord, UserAccount, UserCredentials,
    ValidatedBatch,
};
use fee_tracker_core::ports::{DatabaseService, PortError, PortResult};
use fee_tracker_core::reconcile::{plan, UpsertAction};
use sqlx::{FromRow, PgPool};
use tracing::error;
use uuid::Uuid;

const STUDENT_COLUMNS: &str = "id, enrollment_number, name, branch, semester, \
     sem1_paid, sem2_paid, sem3_paid, sem4_paid, sem5_paid, sem6_paid, created_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps a sqlx error onto the port taxonomy, keeping unique violations distinct.
fn map_write_error(e: sqlx::Error, conflict: impl FnOnce() -> String) -> PortError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            PortError::Conflict(conflict())
        }
        sqlx::Error::RowNotFound => PortError::NotFound("Row not found".to_string()),
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> UserAccount {
        UserAccount {
            id: self.id,
            username: self.username,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    username: String,
    password_hash: String,
}

#[derive(FromRow)]
struct AuthSessionRecord {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct StudentRow {
    id: Uuid,
    enrollment_number: String,
    name: String,
    branch: String,
    semester: i32,
    sem1_paid: bool,
    sem2_paid: bool,
    sem3_paid: bool,
    sem4_paid: bool,
    sem5_paid: bool,
    sem6_paid: bool,
    created_at: DateTime<Utc>,
}
impl StudentRow {
    fn to_domain(self) -> StudentRecord {
        StudentRecord {
            id: self.id,
            enrollment_number: self.enrollment_number,
            name: self.name,
            branch: self.branch,
            semester: self.semester,
            fees: FeeStatus::from_flags([
                self.sem1_paid,
                self.sem2_paid,
                self.sem3_paid,
                self.sem4_paid,
                self.sem5_paid,
                self.sem6_paid,
            ]),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct StudentKeyRow {
    id: Uuid,
    enrollment_number: String,
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn count_users(&self) -> PortResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    async fn list_users(&self) -> PortResult<Vec<UserAccount>> {
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, created_at FROM users ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<UserAccount> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING id, username, created_at",
        )
        .bind(username)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, || format!("Username {} already exists", username)))?;
        Ok(record.to_domain())
    }

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", username)),
            _ => PortError::Unexpected(e.to_string()),
        })?;

        Ok(UserCredentials {
            user_id: record.id,
            username: record.username,
            hashed_password: record.password_hash,
        })
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        // Sessions go with the user through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: Uuid) -> PortResult<Uuid> {
        let record = sqlx::query_as::<_, AuthSessionRecord>(
            "SELECT user_id, expires_at FROM auth_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .ok_or(PortError::Unauthorized)?;

        if record.expires_at <= Utc::now() {
            return Err(PortError::Unauthorized);
        }
        Ok(record.user_id)
    }

    async fn delete_auth_session(&self, session_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn list_students(&self) -> PortResult<Vec<StudentRecord>> {
        let records = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students ORDER BY created_at DESC, enrollment_number"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn reconcile_students(&self, batch: &ValidatedBatch) -> PortResult<ReconciliationReport> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let keys: Vec<String> = batch
            .students()
            .iter()
            .map(|s| s.enrollment_number.clone())
            .collect();
        let existing: HashMap<String, Uuid> = sqlx::query_as::<_, StudentKeyRow>(
            "SELECT id, enrollment_number FROM students WHERE enrollment_number = ANY($1) FOR UPDATE",
        )
        .bind(keys)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?
        .into_iter()
        .map(|row| (row.enrollment_number, row.id))
        .collect();

        let plan = plan(batch, &existing);
        for action in &plan.actions {
            let result = match action {
                // A concurrent upload may have created the key since the lookup.
                // `now()` is fixed per transaction; `clock_timestamp()` keeps batch rows ordered.
                UpsertAction::Create(student) => sqlx::query(
                    "INSERT INTO students (enrollment_number, name, branch, semester, created_at) \
                     VALUES ($1, $2, $3, $4, clock_timestamp()) \
                     ON CONFLICT (enrollment_number) DO UPDATE \
                     SET name = EXCLUDED.name, branch = EXCLUDED.branch, \
                         semester = EXCLUDED.semester, updated_at = now()",
                )
                .bind(&student.enrollment_number)
                .bind(&student.name)
                .bind(&student.branch)
                .bind(student.semester)
                .execute(&mut *tx)
                .await,
                UpsertAction::Refresh {
                    id,
                    name,
                    branch,
                    semester,
                } => sqlx::query(
                    "UPDATE students SET name = $2, branch = $3, semester = $4, updated_at = now() \
                     WHERE id = $1",
                )
                .bind(id)
                .bind(name)
                .bind(branch)
                .bind(semester)
                .execute(&mut *tx)
                .await,
            };

            if let Err(e) = result {
                error!("Reconciliation write failed, rolling back batch: {:?}", e);
                // Dropping the transaction rolls it back.
                return Err(PortError::Unexpected(e.to_string()));
            }
        }

        tx.commit()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(plan.report())
    }

    async fn update_student(&self, student_id: Uuid, patch: &StudentPatch) -> PortResult<StudentRecord> {
        let semester = patch.semester.and_then(|s| i32::try_from(s).ok());
        let record = sqlx::query_as::<_, StudentRow>(&format!(
            "UPDATE students SET \
                 enrollment_number = COALESCE($2, enrollment_number), \
                 name = COALESCE($3, name), \
                 branch = COALESCE($4, branch), \
                 semester = COALESCE($5, semester), \
                 sem1_paid = COALESCE($6, sem1_paid), \
                 sem2_paid = COALESCE($7, sem2_paid), \
                 sem3_paid = COALESCE($8, sem3_paid), \
                 sem4_paid = COALESCE($9, sem4_paid), \
                 sem5_paid = COALESCE($10, sem5_paid), \
                 sem6_paid = COALESCE($11, sem6_paid), \
                 updated_at = now() \
             WHERE id = $1 RETURNING {STUDENT_COLUMNS}"
        ))
        .bind(student_id)
        .bind(patch.enrollment_number.as_deref())
        .bind(patch.name.as_deref())
        .bind(patch.branch.as_deref())
        .bind(semester)
        .bind(patch.fees[0])
        .bind(patch.fees[1])
        .bind(patch.fees[2])
        .bind(patch.fees[3])
        .bind(patch.fees[4])
        .bind(patch.fees[5])
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            map_write_error(e, || "Enrollment number is already in use by another student".to_string())
        })?
        .ok_or_else(|| PortError::NotFound(format!("Student {} not found", student_id)))?;

        Ok(record.to_domain())
    }

    async fn delete_student(&self, student_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(student_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Student {} not found", student_id)));
        }
        Ok(())
    }

    async fn delete_all_students(&self) -> PortResult<u64> {
        let result = sqlx::query("DELETE FROM students")
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
