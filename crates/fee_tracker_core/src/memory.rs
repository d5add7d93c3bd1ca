//! crates/fee_tracker_core/src/memory.rs
//!
//! An in-memory `DatabaseService` for tests. Every write works on a copy of the
//! tables and swaps it in only on success, so batches are all-or-nothing just
//! like the PostgreSQL adapter's transactions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    FeeStatus, ReconciliationReport, StudentPatch, StudentRecord, UserAccount, UserCredentials,
    ValidatedBatch,
};
use crate::ports::{DatabaseService, PortError, PortResult};
use crate::reconcile::{plan, UpsertAction};

#[derive(Clone, Default)]
struct Tables {
    students: Vec<StudentRecord>,
    users: Vec<(UserAccount, String)>,
    sessions: HashMap<Uuid, (Uuid, DateTime<Utc>)>,
}

/// A process-local store with optional failure injection.
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: RwLock<Tables>,
    failing: AtomicBool,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write fails with `PortError::Unexpected` and changes nothing.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_writable(&self) -> PortResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(PortError::Unexpected("injected storage failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DatabaseService for InMemoryDatabase {
    async fn count_users(&self) -> PortResult<u64> {
        Ok(self.tables.read().await.users.len() as u64)
    }

    async fn list_users(&self) -> PortResult<Vec<UserAccount>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().map(|(account, _)| account.clone()).collect())
    }

    async fn create_user(&self, username: &str, hashed_password: &str) -> PortResult<UserAccount> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|(account, _)| account.username == username) {
            return Err(PortError::Conflict(format!("Username {username} already exists")));
        }
        let account = UserAccount {
            id: Uuid::new_v4(),
            username: username.to_string(),
            created_at: Utc::now(),
        };
        tables.users.push((account.clone(), hashed_password.to_string()));
        Ok(account)
    }

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials> {
        let tables = self.tables.read().await;
        tables
            .users
            .iter()
            .find(|(account, _)| account.username == username)
            .map(|(account, hash)| UserCredentials {
                user_id: account.id,
                username: account.username.clone(),
                hashed_password: hash.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {username} not found")))
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|(account, _)| account.id != user_id);
        if tables.users.len() == before {
            return Err(PortError::NotFound(format!("User {user_id} not found")));
        }
        tables.sessions.retain(|_, (owner, _)| *owner != user_id);
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.check_writable()?;
        self.tables
            .write()
            .await
            .sessions
            .insert(session_id, (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: Uuid) -> PortResult<Uuid> {
        let tables = self.tables.read().await;
        match tables.sessions.get(&session_id) {
            Some((user_id, expires_at)) if *expires_at > Utc::now() => Ok(*user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: Uuid) -> PortResult<()> {
        self.tables.write().await.sessions.remove(&session_id);
        Ok(())
    }

    async fn list_students(&self) -> PortResult<Vec<StudentRecord>> {
        let mut students = self.tables.read().await.students.clone();
        // Newest first; insertion order breaks timestamp ties.
        students.reverse();
        students.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(students)
    }

    async fn reconcile_students(&self, batch: &ValidatedBatch) -> PortResult<ReconciliationReport> {
        let mut tables = self.tables.write().await;
        let existing: HashMap<String, Uuid> = tables
            .students
            .iter()
            .map(|s| (s.enrollment_number.clone(), s.id))
            .collect();
        let plan = plan(batch, &existing);

        let mut staged = tables.students.clone();
        for action in &plan.actions {
            self.check_writable()?;
            match action {
                UpsertAction::Create(student) => staged.push(StudentRecord {
                    id: Uuid::new_v4(),
                    enrollment_number: student.enrollment_number.clone(),
                    name: student.name.clone(),
                    branch: student.branch.clone(),
                    semester: student.semester,
                    fees: FeeStatus::default(),
                    created_at: Utc::now(),
                }),
                UpsertAction::Refresh {
                    id,
                    name,
                    branch,
                    semester,
                } => {
                    let record = staged
                        .iter_mut()
                        .find(|s| s.id == *id)
                        .ok_or_else(|| PortError::NotFound(format!("Student {id} not found")))?;
                    record.name = name.clone();
                    record.branch = branch.clone();
                    record.semester = *semester;
                }
            }
        }

        tables.students = staged;
        Ok(plan.report())
    }

    async fn update_student(&self, student_id: Uuid, patch: &StudentPatch) -> PortResult<StudentRecord> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        if let Some(enrollment_number) = &patch.enrollment_number {
            let taken = tables
                .students
                .iter()
                .any(|s| s.id != student_id && &s.enrollment_number == enrollment_number);
            if taken {
                return Err(PortError::Conflict(format!(
                    "Enrollment number {enrollment_number} is already in use"
                )));
            }
        }
        let record = tables
            .students
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or_else(|| PortError::NotFound(format!("Student {student_id} not found")))?;
        patch.apply_to(record);
        Ok(record.clone())
    }

    async fn delete_student(&self, student_id: Uuid) -> PortResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let before = tables.students.len();
        tables.students.retain(|s| s.id != student_id);
        if tables.students.len() == before {
            return Err(PortError::NotFound(format!("Student {student_id} not found")));
        }
        Ok(())
    }

    async fn delete_all_students(&self) -> PortResult<u64> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let removed = tables.students.len() as u64;
        tables.students.clear();
        Ok(removed)
    }
}
