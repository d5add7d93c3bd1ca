//! crates/fee_tracker_core/src/validate.rs
//!
//! Schema checks over normalized candidates and partial updates.
//!
//! Validation is all-or-nothing: a batch is either returned whole as a
//! `ValidatedBatch` or rejected with every failing field of every row.

use std::fmt;

use crate::domain::{
    CandidateRecord, StudentPatch, ValidatedBatch, ValidatedStudent, MAX_SEMESTER, MIN_SEMESTER,
};

/// The record field a validation rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    EnrollmentNumber,
    Name,
    Branch,
    Semester,
    /// The row as a whole rather than one of its fields.
    Record,
}

impl Field {
    /// Wire name of the field, matching the JSON payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Field::EnrollmentNumber => "enrollmentNumber",
            Field::Name => "name",
            Field::Branch => "branch",
            Field::Semester => "semester",
            Field::Record => "record",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failing field of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Zero-based index of the row in the submitted batch.
    pub row: usize,
    pub field: Field,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} field(s) failed validation", errors.len())]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// The failing fields of a single row, in rule order.
    pub fn for_row(&self, row: usize) -> impl Iterator<Item = &FieldError> {
        self.errors.iter().filter(move |error| error.row == row)
    }
}

/// Validates a whole upload batch.
pub fn validate_batch(candidates: Vec<CandidateRecord>) -> Result<ValidatedBatch, ValidationError> {
    let mut errors = Vec::new();
    let mut students = Vec::with_capacity(candidates.len());

    for (row, candidate) in candidates.into_iter().enumerate() {
        let before = errors.len();
        check_text(row, Field::EnrollmentNumber, &candidate.enrollment_number, &mut errors);
        check_text_cell(row, Field::Name, candidate.name.as_deref(), &mut errors);
        check_text_cell(row, Field::Branch, candidate.branch.as_deref(), &mut errors);
        let semester = check_semester(row, candidate.semester, &mut errors);

        match (candidate.name, candidate.branch, semester) {
            (Some(name), Some(branch), Some(semester)) if errors.len() == before => {
                students.push(ValidatedStudent {
                    enrollment_number: candidate.enrollment_number,
                    name,
                    branch,
                    semester,
                })
            }
            _ => {}
        }
    }

    if errors.is_empty() {
        Ok(ValidatedBatch::new(students))
    } else {
        Err(ValidationError { errors })
    }
}

/// Validates the fields present in a partial update. Errors are reported as row 0.
pub fn validate_patch(patch: &StudentPatch) -> Result<(), ValidationError> {
    if patch.is_empty() {
        return Err(ValidationError {
            errors: vec![FieldError {
                row: 0,
                field: Field::Record,
                message: "update must change at least one field".to_string(),
            }],
        });
    }

    let mut errors = Vec::new();
    if let Some(enrollment_number) = &patch.enrollment_number {
        check_text(0, Field::EnrollmentNumber, enrollment_number, &mut errors);
    }
    if let Some(name) = &patch.name {
        check_text(0, Field::Name, name, &mut errors);
    }
    if let Some(branch) = &patch.branch {
        check_text(0, Field::Branch, branch, &mut errors);
    }
    if patch.semester.is_some() {
        check_semester(0, patch.semester, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { errors })
    }
}

fn check_text(row: usize, field: Field, value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError {
            row,
            field,
            message: format!("{field} must not be empty"),
        });
    }
}

fn check_text_cell(row: usize, field: Field, value: Option<&str>, errors: &mut Vec<FieldError>) {
    match value {
        Some(text) => check_text(row, field, text, errors),
        None => errors.push(FieldError {
            row,
            field,
            message: format!("{field} must be a string"),
        }),
    }
}

fn check_semester(row: usize, semester: Option<i64>, errors: &mut Vec<FieldError>) -> Option<i32> {
    let range = i64::from(MIN_SEMESTER)..=i64::from(MAX_SEMESTER);
    match semester {
        Some(value) if range.contains(&value) => i32::try_from(value).ok(),
        Some(value) => {
            errors.push(FieldError {
                row,
                field: Field::Semester,
                message: format!("semester must be between {MIN_SEMESTER} and {MAX_SEMESTER}, got {value}"),
            });
            None
        }
        None => {
            errors.push(FieldError {
                row,
                field: Field::Semester,
                message: "semester must be a whole number".to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FeeSemester;

    fn candidate(enrollment: &str, name: &str, branch: &str, semester: Option<i64>) -> CandidateRecord {
        CandidateRecord {
            enrollment_number: enrollment.to_string(),
            name: Some(name.to_string()),
            branch: Some(branch.to_string()),
            semester,
        }
    }

    #[test]
    fn valid_batch_keeps_content_and_order() {
        let batch = validate_batch(vec![
            candidate("B2", "Meera", "EE", Some(1)),
            candidate("A1", "X", "CS", Some(8)),
        ])
        .expect("batch is valid");

        let keys: Vec<_> = batch
            .students()
            .iter()
            .map(|s| s.enrollment_number.as_str())
            .collect();
        assert_eq!(keys, ["B2", "A1"]);
        assert_eq!(batch.students()[1].semester, 8);
    }

    #[test]
    fn empty_batch_is_valid() {
        assert!(validate_batch(Vec::new()).expect("empty batch").is_empty());
    }

    #[test]
    fn reports_every_failing_field_of_every_row() {
        let err = validate_batch(vec![
            candidate("A1", "X", "CS", Some(3)),
            candidate("", "  ", "CS", Some(9)),
            candidate("C3", "Z", "", None),
        ])
        .expect_err("batch has invalid rows");

        assert_eq!(err.errors.len(), 5);
        assert_eq!(err.for_row(0).count(), 0);
        let row_one: Vec<_> = err.for_row(1).map(|e| e.field).collect();
        assert_eq!(row_one, [Field::EnrollmentNumber, Field::Name, Field::Semester]);
        let row_two: Vec<_> = err.for_row(2).map(|e| e.field).collect();
        assert_eq!(row_two, [Field::Branch, Field::Semester]);
    }

    #[test]
    fn non_text_name_and_branch_are_rejected() {
        let rows = [serde_json::json!({
            "enrollmentNumber": "A1",
            "name": true,
            "branch": 42,
            "semester": 3
        })];

        let err = validate_batch(crate::normalize::normalize_rows(&rows))
            .expect_err("non-text cells are invalid");

        let fields: Vec<_> = err.for_row(0).map(|e| e.field).collect();
        assert_eq!(fields, [Field::Name, Field::Branch]);
        assert!(err.errors.iter().all(|e| e.message.ends_with("must be a string")));
    }

    #[test]
    fn missing_name_is_rejected() {
        let err = validate_batch(vec![CandidateRecord {
            enrollment_number: "A1".to_string(),
            name: None,
            branch: Some("CS".to_string()),
            semester: Some(2),
        }])
        .expect_err("name is required");
        assert_eq!(err.errors[0].field, Field::Name);
    }

    #[test]
    fn semester_bounds_are_inclusive() {
        assert!(validate_batch(vec![candidate("A", "N", "B", Some(1))]).is_ok());
        assert!(validate_batch(vec![candidate("A", "N", "B", Some(8))]).is_ok());
        assert!(validate_batch(vec![candidate("A", "N", "B", Some(0))]).is_err());
        assert!(validate_batch(vec![candidate("A", "N", "B", Some(-3))]).is_err());
    }

    #[test]
    fn fee_only_patch_is_valid() {
        assert!(validate_patch(&StudentPatch::fee_status(FeeSemester::Sem2, true)).is_ok());
    }

    #[test]
    fn patch_rejects_blank_and_out_of_range_fields() {
        let patch = StudentPatch {
            name: Some(String::new()),
            semester: Some(12),
            ..StudentPatch::default()
        };

        let err = validate_patch(&patch).expect_err("patch is invalid");
        let fields: Vec<_> = err.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, [Field::Name, Field::Semester]);
    }

    #[test]
    fn empty_patch_is_rejected() {
        let err = validate_patch(&StudentPatch::default()).expect_err("nothing to change");
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].field, Field::Record);
    }
}
