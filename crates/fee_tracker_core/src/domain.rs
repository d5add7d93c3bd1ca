//! crates/fee_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Number of semesters whose tuition payment is tracked per student.
pub const FEE_SEMESTERS: usize = 6;

/// Lowest and highest semester a student can be enrolled in.
pub const MIN_SEMESTER: i32 = 1;
pub const MAX_SEMESTER: i32 = 8;

//=========================================================================================
// Fee Status
//=========================================================================================

/// One of the six semesters whose fee status is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeeSemester {
    Sem1,
    Sem2,
    Sem3,
    Sem4,
    Sem5,
    Sem6,
}

impl FeeSemester {
    pub const ALL: [FeeSemester; FEE_SEMESTERS] = [
        FeeSemester::Sem1,
        FeeSemester::Sem2,
        FeeSemester::Sem3,
        FeeSemester::Sem4,
        FeeSemester::Sem5,
        FeeSemester::Sem6,
    ];

    /// Zero-based position inside a `FeeStatus`.
    pub fn index(self) -> usize {
        match self {
            FeeSemester::Sem1 => 0,
            FeeSemester::Sem2 => 1,
            FeeSemester::Sem3 => 2,
            FeeSemester::Sem4 => 3,
            FeeSemester::Sem5 => 4,
            FeeSemester::Sem6 => 5,
        }
    }

    /// One-based semester number, as shown on the dashboard.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

/// The paid/unpaid flags of one student, one per `FeeSemester`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeStatus([bool; FEE_SEMESTERS]);

impl FeeStatus {
    pub fn from_flags(flags: [bool; FEE_SEMESTERS]) -> Self {
        Self(flags)
    }

    pub fn flags(&self) -> [bool; FEE_SEMESTERS] {
        self.0
    }

    pub fn is_paid(&self, semester: FeeSemester) -> bool {
        self.0[semester.index()]
    }

    pub fn set(&mut self, semester: FeeSemester, paid: bool) {
        self.0[semester.index()] = paid;
    }

    /// How many of the six semesters are marked paid.
    pub fn paid_count(&self) -> usize {
        self.0.iter().filter(|paid| **paid).count()
    }
}

//=========================================================================================
// Students
//=========================================================================================

/// One enrolled student's fee-tracking state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub id: Uuid,
    pub enrollment_number: String,
    pub name: String,
    pub branch: String,
    pub semester: i32,
    pub fees: FeeStatus,
    pub created_at: DateTime<Utc>,
}

/// A normalized spreadsheet row. Nothing here has been checked yet.
///
/// `name` and `branch` are `None` when the cell is absent or not text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CandidateRecord {
    pub enrollment_number: String,
    pub name: Option<String>,
    pub branch: Option<String>,
    pub semester: Option<i64>,
}

/// A candidate that passed every validation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStudent {
    pub enrollment_number: String,
    pub name: String,
    pub branch: String,
    pub semester: i32,
}

/// An upload batch in which every row is valid. Order matches the input rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidatedBatch(Vec<ValidatedStudent>);

impl ValidatedBatch {
    /// Only the validator builds batches from unchecked rows.
    pub(crate) fn new(students: Vec<ValidatedStudent>) -> Self {
        Self(students)
    }

    pub fn students(&self) -> &[ValidatedStudent] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A partial update of one student. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentPatch {
    pub enrollment_number: Option<String>,
    pub name: Option<String>,
    pub branch: Option<String>,
    pub semester: Option<i64>,
    pub fees: [Option<bool>; FEE_SEMESTERS],
}

impl StudentPatch {
    /// A patch that only flips one semester's paid flag.
    pub fn fee_status(semester: FeeSemester, paid: bool) -> Self {
        let mut patch = Self::default();
        patch.fees[semester.index()] = Some(paid);
        patch
    }

    pub fn is_empty(&self) -> bool {
        self.enrollment_number.is_none()
            && self.name.is_none()
            && self.branch.is_none()
            && self.semester.is_none()
            && self.fees.iter().all(Option::is_none)
    }

    /// Applies the patch to a record. Callers validate the patch first.
    pub fn apply_to(&self, student: &mut StudentRecord) {
        if let Some(enrollment_number) = &self.enrollment_number {
            student.enrollment_number = enrollment_number.clone();
        }
        if let Some(name) = &self.name {
            student.name = name.clone();
        }
        if let Some(branch) = &self.branch {
            student.branch = branch.clone();
        }
        if let Some(semester) = self.semester.and_then(|s| i32::try_from(s).ok()) {
            student.semester = semester;
        }
        for semester in FeeSemester::ALL {
            if let Some(paid) = self.fees[semester.index()] {
                student.fees.set(semester, paid);
            }
        }
    }
}

/// What one upload did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconciliationReport {
    /// Rows processed, duplicates included. This is the count reported to clients.
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
}

//=========================================================================================
// Users and Sessions
//=========================================================================================

// A dashboard operator as seen by everything outside the auth flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub hashed_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_semesters_are_numbered_from_one() {
        let numbers: Vec<u8> = FeeSemester::ALL.iter().map(|s| s.number()).collect();
        assert_eq!(numbers, [1, 2, 3, 4, 5, 6]);
        assert_eq!(FeeSemester::Sem4.index(), 3);
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut student = StudentRecord {
            id: Uuid::new_v4(),
            enrollment_number: "A1".to_string(),
            name: "X".to_string(),
            branch: "CS".to_string(),
            semester: 3,
            fees: FeeStatus::from_flags([true, false, false, false, false, false]),
            created_at: Utc::now(),
        };

        StudentPatch::fee_status(FeeSemester::Sem4, true).apply_to(&mut student);

        assert_eq!(student.name, "X");
        assert_eq!(student.fees.flags(), [true, false, false, true, false, false]);
        assert_eq!(student.fees.paid_count(), 2);
    }
}
