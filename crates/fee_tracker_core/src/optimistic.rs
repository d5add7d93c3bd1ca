//! crates/fee_tracker_core/src/optimistic.rs
//!
//! Client-side optimistic updates for the per-semester fee checkboxes.
//!
//! A toggle moves through an explicit state machine:
//!
//! ```text
//! Idle --begin_toggle--> Tentative --write ok----> Confirmed
//!                                  \--write failed--> RolledBack --> Idle
//! ```
//!
//! The displayed value changes as soon as the toggle begins. The previous value
//! is captured in the immutable `Tentative` snapshot and restored if the write
//! fails. Only the toggled field is restored, so toggles on other students or
//! other semesters of the same student are never clobbered. Two toggles racing on
//! the same field settle in response order.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{FeeSemester, StudentRecord, FEE_SEMESTERS};
use crate::ports::{FeeStatusWriter, Notice, Notifier};

//=========================================================================================
// State Machine
//=========================================================================================

/// Where a single toggle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TogglePhase {
    /// No write in flight for the field. Every toggle starts here and the field
    /// returns here once its last write settles.
    Idle,
    Tentative,
    Confirmed,
    RolledBack,
}

/// A toggle that has been displayed but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tentative {
    student_id: Uuid,
    student_name: String,
    semester: FeeSemester,
    requested: bool,
    snapshot: bool,
}

impl Tentative {
    pub fn semester(&self) -> FeeSemester {
        self.semester
    }

    /// The value shown before the toggle began.
    pub fn snapshot(&self) -> bool {
        self.snapshot
    }

    pub fn phase(&self) -> TogglePhase {
        TogglePhase::Tentative
    }
}

/// The settled result of one toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Confirmed { student_id: Uuid, semester: FeeSemester, paid: bool },
    RolledBack { student_id: Uuid, semester: FeeSemester, restored: bool },
}

impl Settled {
    pub fn phase(&self) -> TogglePhase {
        match self {
            Settled::Confirmed { .. } => TogglePhase::Confirmed,
            Settled::RolledBack { .. } => TogglePhase::RolledBack,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("Student {0} is not on the board")]
    UnknownStudent(Uuid),
}

//=========================================================================================
// The Displayed Board
//=========================================================================================

/// Dashboard filters. `None` means "All".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardFilter {
    /// Case-insensitive substring of the enrollment number.
    pub search: String,
    pub branch: Option<String>,
    pub semester: Option<i32>,
}

impl BoardFilter {
    pub fn matches(&self, student: &StudentRecord) -> bool {
        let search_match = student
            .enrollment_number
            .to_lowercase()
            .contains(&self.search.to_lowercase());
        let branch_match = self.branch.as_ref().map_or(true, |b| &student.branch == b);
        let semester_match = self.semester.map_or(true, |s| student.semester == s);
        search_match && branch_match && semester_match
    }
}

/// The student list as currently displayed to the operator.
#[derive(Debug, Clone, Default)]
pub struct FeeBoard {
    students: Vec<StudentRecord>,
    /// Unsettled toggles per field.
    in_flight: HashMap<(Uuid, FeeSemester), usize>,
}

impl FeeBoard {
    pub fn new(students: Vec<StudentRecord>) -> Self {
        Self {
            students,
            in_flight: HashMap::new(),
        }
    }

    pub fn students(&self) -> &[StudentRecord] {
        &self.students
    }

    pub fn get(&self, student_id: Uuid) -> Option<&StudentRecord> {
        self.students.iter().find(|s| s.id == student_id)
    }

    /// Replaces the board with freshly fetched server truth. Toggles still in
    /// flight settle against the new roster.
    pub fn replace_all(&mut self, students: Vec<StudentRecord>) {
        self.students = students;
    }

    pub fn filtered<'a>(&'a self, filter: &'a BoardFilter) -> impl Iterator<Item = &'a StudentRecord> + 'a {
        self.students.iter().filter(move |s| filter.matches(s))
    }

    /// Distinct branches in first-seen order, for the branch filter.
    pub fn branches(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.students
            .iter()
            .filter(|s| seen.insert(s.branch.clone()))
            .map(|s| s.branch.clone())
            .collect()
    }

    /// Distinct semesters in ascending order, for the semester filter.
    pub fn semesters(&self) -> Vec<i32> {
        self.students
            .iter()
            .map(|s| s.semester)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// The "paid / total" label shown per student.
    pub fn paid_label(&self, student_id: Uuid) -> Option<String> {
        self.get(student_id)
            .map(|s| format!("{} / {}", s.fees.paid_count(), FEE_SEMESTERS))
    }

    /// `Tentative` while any write for the field is unsettled, `Idle` otherwise.
    pub fn phase(&self, student_id: Uuid, semester: FeeSemester) -> TogglePhase {
        if self.in_flight.contains_key(&(student_id, semester)) {
            TogglePhase::Tentative
        } else {
            TogglePhase::Idle
        }
    }

    fn settle(&mut self, tentative: &Tentative) {
        let key = (tentative.student_id, tentative.semester);
        if let Some(count) = self.in_flight.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&key);
            }
        }
    }

    /// Idle -> Tentative: shows the requested value and captures the old one.
    pub fn begin_toggle(
        &mut self,
        student_id: Uuid,
        semester: FeeSemester,
        paid: bool,
    ) -> Result<Tentative, BoardError> {
        let student = self
            .students
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or(BoardError::UnknownStudent(student_id))?;

        let snapshot = student.fees.is_paid(semester);
        student.fees.set(semester, paid);
        let name = student.name.clone();
        *self.in_flight.entry((student_id, semester)).or_insert(0) += 1;
        Ok(Tentative {
            student_id,
            student_name: name,
            semester,
            requested: paid,
            snapshot,
        })
    }

    /// Tentative -> Confirmed. The displayed value is already correct.
    pub fn confirm(&mut self, tentative: Tentative) -> Settled {
        self.settle(&tentative);
        Settled::Confirmed {
            student_id: tentative.student_id,
            semester: tentative.semester,
            paid: tentative.requested,
        }
    }

    /// Tentative -> RolledBack: restores the snapshot for that one field.
    pub fn roll_back(&mut self, tentative: Tentative) -> Settled {
        self.settle(&tentative);
        // The student may have been removed by a refresh in the meantime.
        if let Some(student) = self.students.iter_mut().find(|s| s.id == tentative.student_id) {
            student.fees.set(tentative.semester, tentative.snapshot);
        }
        Settled::RolledBack {
            student_id: tentative.student_id,
            semester: tentative.semester,
            restored: tentative.snapshot,
        }
    }
}

//=========================================================================================
// Controller
//=========================================================================================

/// Drives toggles against a shared board, a remote writer and a notifier.
#[derive(Clone)]
pub struct OptimisticController {
    board: Arc<Mutex<FeeBoard>>,
    writer: Arc<dyn FeeStatusWriter>,
    notifier: Arc<dyn Notifier>,
}

impl OptimisticController {
    pub fn new(
        board: Arc<Mutex<FeeBoard>>,
        writer: Arc<dyn FeeStatusWriter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            board,
            writer,
            notifier,
        }
    }

    pub fn board(&self) -> Arc<Mutex<FeeBoard>> {
        self.board.clone()
    }

    /// Toggles one semester's paid flag and settles it against the writer.
    ///
    /// The board lock is never held across the remote write.
    pub async fn toggle(
        &self,
        student_id: Uuid,
        semester: FeeSemester,
        paid: bool,
    ) -> Result<Settled, BoardError> {
        let tentative = self
            .board
            .lock()
            .await
            .begin_toggle(student_id, semester, paid)?;
        let name = tentative.student_name.clone();

        let outcome = self.writer.set_fee_status(student_id, semester, paid).await;

        let mut board = self.board.lock().await;
        let settled = match outcome {
            Ok(_) => {
                info!("Fee status for {} semester {} confirmed.", student_id, semester.number());
                self.notifier
                    .notify(Notice::Success(format!("{name}'s fee status updated.")));
                board.confirm(tentative)
            }
            Err(e) => {
                warn!("Fee status write for {} failed, rolling back: {:?}", student_id, e);
                self.notifier.notify(Notice::Failure(format!(
                    "Failed to update status for {name}. Reverting change."
                )));
                board.roll_back(tentative)
            }
        };
        Ok(settled)
    }
}
