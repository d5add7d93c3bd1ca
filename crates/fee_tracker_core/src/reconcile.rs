//! crates/fee_tracker_core/src/reconcile.rs
//!
//! The reconciliation engine: merges a validated upload batch into the existing
//! student set, keyed by enrollment number.
//!
//! `plan` is pure and shared by every store adapter, which apply the resulting
//! actions inside a single transaction. `upload_roster` is the full pipeline
//! from raw rows to a persisted report.

use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{ReconciliationReport, ValidatedBatch, ValidatedStudent};
use crate::normalize::{normalize_rows, UploadRow};
use crate::ports::{DatabaseService, PortError};
use crate::validate::{validate_batch, ValidationError};

//=========================================================================================
// Plan
//=========================================================================================

/// A single write the store must perform for one enrollment number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertAction {
    /// No student has this enrollment number yet. Fee flags start unpaid.
    Create(ValidatedStudent),
    /// Refresh the mutable profile fields of an existing student.
    Refresh {
        id: Uuid,
        name: String,
        branch: String,
        semester: i32,
    },
}

impl UpsertAction {
    fn absorb(&mut self, newer: &ValidatedStudent) {
        match self {
            UpsertAction::Create(student) => *student = newer.clone(),
            UpsertAction::Refresh {
                name,
                branch,
                semester,
                ..
            } => {
                *name = newer.name.clone();
                *branch = newer.branch.clone();
                *semester = newer.semester;
            }
        }
    }
}

/// The writes needed to apply one batch, one action per distinct enrollment number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconciliationPlan {
    pub actions: Vec<UpsertAction>,
    /// Rows in the batch, duplicates included.
    pub processed: usize,
}

impl ReconciliationPlan {
    pub fn report(&self) -> ReconciliationReport {
        let created = self
            .actions
            .iter()
            .filter(|action| matches!(action, UpsertAction::Create(_)))
            .count();
        ReconciliationReport {
            processed: self.processed,
            created,
            updated: self.actions.len() - created,
        }
    }
}

/// Builds the upsert plan for `batch` against the ids of existing students.
///
/// Actions appear in the order each enrollment number is first seen. When a key
/// repeats inside the batch, the last row's values win.
pub fn plan(batch: &ValidatedBatch, existing: &HashMap<String, Uuid>) -> ReconciliationPlan {
    let mut actions: Vec<UpsertAction> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for student in batch.students() {
        if let Some(&slot) = slots.get(student.enrollment_number.as_str()) {
            actions[slot].absorb(student);
            continue;
        }

        let action = match existing.get(&student.enrollment_number) {
            Some(&id) => UpsertAction::Refresh {
                id,
                name: student.name.clone(),
                branch: student.branch.clone(),
                semester: student.semester,
            },
            None => UpsertAction::Create(student.clone()),
        };
        slots.insert(student.enrollment_number.as_str(), actions.len());
        actions.push(action);
    }

    ReconciliationPlan {
        actions,
        processed: batch.len(),
    }
}

//=========================================================================================
// Upload Pipeline
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// At least one row is invalid. Nothing was written.
    #[error("Upload rejected: {0}")]
    Validation(#[from] ValidationError),

    /// The store failed while applying the batch. Nothing was written.
    #[error("Upload failed: {0}")]
    Storage(#[from] PortError),
}

/// Normalizes, validates and reconciles a batch of spreadsheet rows.
pub async fn upload_roster(
    db: &dyn DatabaseService,
    rows: &[UploadRow],
) -> Result<ReconciliationReport, UploadError> {
    let candidates = normalize_rows(rows);
    let batch = validate_batch(candidates).map_err(|e| {
        warn!(
            "Rejected upload of {} rows: {} invalid field(s).",
            rows.len(),
            e.errors.len()
        );
        e
    })?;

    let report = db.reconcile_students(&batch).await?;
    info!(
        "Reconciled {} rows ({} created, {} updated).",
        report.processed, report.created, report.updated
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateRecord, FeeSemester, StudentPatch};
    use crate::memory::InMemoryDatabase;
    use serde_json::json;

    fn batch(rows: &[(&str, &str, &str, i64)]) -> ValidatedBatch {
        let candidates = rows
            .iter()
            .map(|(enrollment, name, branch, semester)| CandidateRecord {
                enrollment_number: enrollment.to_string(),
                name: Some(name.to_string()),
                branch: Some(branch.to_string()),
                semester: Some(*semester),
            })
            .collect();
        validate_batch(candidates).expect("test batch is valid")
    }

    #[test]
    fn unknown_keys_become_creates_and_known_keys_refreshes() {
        let existing_id = Uuid::new_v4();
        let existing = HashMap::from([("A1".to_string(), existing_id)]);

        let plan = plan(&batch(&[("A1", "Y", "CS", 4), ("B2", "Z", "EE", 1)]), &existing);

        assert_eq!(
            plan.actions[0],
            UpsertAction::Refresh {
                id: existing_id,
                name: "Y".to_string(),
                branch: "CS".to_string(),
                semester: 4,
            }
        );
        assert!(matches!(&plan.actions[1], UpsertAction::Create(s) if s.enrollment_number == "B2"));
        let report = plan.report();
        assert_eq!((report.processed, report.created, report.updated), (2, 1, 1));
    }

    #[test]
    fn duplicate_keys_fold_into_one_action_with_last_values() {
        let plan = plan(
            &batch(&[("A1", "X", "CS", 3), ("B2", "Q", "EE", 2), ("A1", "Z", "ME", 5)]),
            &HashMap::new(),
        );

        assert_eq!(plan.actions.len(), 2);
        assert_eq!(plan.processed, 3);
        match &plan.actions[0] {
            UpsertAction::Create(student) => {
                assert_eq!(student.name, "Z");
                assert_eq!(student.branch, "ME");
                assert_eq!(student.semester, 5);
            }
            other => panic!("expected a create, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_upload_creates_unpaid_students() {
        let db = InMemoryDatabase::new();
        let rows = vec![json!({ "enrollmentNumber": "A1", "name": "X", "branch": "CS", "semester": 3 })];

        let report = upload_roster(&db, &rows).await.expect("upload succeeds");

        assert_eq!(report.processed, 1);
        let students = db.list_students().await.expect("list");
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "X");
        assert_eq!(students[0].fees.paid_count(), 0);
    }

    #[tokio::test]
    async fn reupload_refreshes_profile_but_keeps_fee_flags() {
        let db = InMemoryDatabase::new();
        let first = vec![json!({ "enrollmentNumber": "A1", "name": "X", "branch": "CS", "semester": 3 })];
        upload_roster(&db, &first).await.expect("first upload");
        let id = db.list_students().await.expect("list")[0].id;
        db.update_student(id, &StudentPatch::fee_status(FeeSemester::Sem1, true))
            .await
            .expect("toggle");

        let second = vec![json!({ "enrollmentNumber": "A1", "name": "Y", "branch": "CS", "semester": 4 })];
        let report = upload_roster(&db, &second).await.expect("second upload");

        assert_eq!(report.processed, 1);
        assert_eq!(report.updated, 1);
        let students = db.list_students().await.expect("list");
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].id, id);
        assert_eq!(students[0].name, "Y");
        assert_eq!(students[0].semester, 4);
        assert!(students[0].fees.is_paid(FeeSemester::Sem1));
    }

    #[tokio::test]
    async fn applying_the_same_batch_twice_is_idempotent() {
        let db = InMemoryDatabase::new();
        let rows = vec![
            json!({ "enrollmentNumber": "A1", "name": "X", "branch": "CS", "semester": 3 }),
            json!({ "enrollmentNumber": "B2", "name": "W", "branch": "EE", "semester": 6 }),
        ];

        let first = upload_roster(&db, &rows).await.expect("first");
        let after_first = db.list_students().await.expect("list");
        let second = upload_roster(&db, &rows).await.expect("second");
        let after_second = db.list_students().await.expect("list");

        assert_eq!(first.processed, second.processed);
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn invalid_row_rejects_the_whole_batch() {
        let db = InMemoryDatabase::new();
        let rows = vec![
            json!({ "enrollmentNumber": "A1", "name": "X", "branch": "CS", "semester": 3 }),
            json!({ "enrollmentNumber": "B2", "name": "W", "branch": "EE", "semester": 11 }),
        ];

        let err = upload_roster(&db, &rows).await.expect_err("batch is invalid");

        assert!(matches!(err, UploadError::Validation(ref v) if v.errors.len() == 1 && v.errors[0].row == 1));
        assert!(db.list_students().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn storage_failure_leaves_no_partial_batch() {
        let db = InMemoryDatabase::new();
        db.fail_writes(true);
        let rows = vec![
            json!({ "enrollmentNumber": "A1", "name": "X", "branch": "CS", "semester": 3 }),
            json!({ "enrollmentNumber": "B2", "name": "W", "branch": "EE", "semester": 6 }),
        ];

        let err = upload_roster(&db, &rows).await.expect_err("store is failing");

        assert!(matches!(err, UploadError::Storage(_)));
        db.fail_writes(false);
        assert!(db.list_students().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn duplicate_key_in_one_batch_stores_the_last_row() {
        let db = InMemoryDatabase::new();
        let rows = vec![
            json!({ "enrollmentNumber": "A1", "name": "X", "branch": "CS", "semester": 3 }),
            json!({ "enrollmentNumber": "A1", "name": "Z", "branch": "CS", "semester": 3 }),
        ];

        let report = upload_roster(&db, &rows).await.expect("upload");

        assert_eq!(report.processed, 2);
        let students = db.list_students().await.expect("list");
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "Z");
    }
}
