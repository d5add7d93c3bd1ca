pub mod domain;
pub mod normalize;
pub mod optimistic;
pub mod ports;
pub mod reconcile;
pub mod validate;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use domain::{
    CandidateRecord, FeeSemester, FeeStatus, ReconciliationReport, StudentPatch,
    StudentRecord, UserAccount, UserCredentials, ValidatedBatch, ValidatedStudent,
};
pub use optimistic::{BoardError, BoardFilter, FeeBoard, OptimisticController, Settled, TogglePhase};
pub use ports::{
    DatabaseService, FeeStatusWriter, Notice, Notifier, PortError, PortResult,
};
pub use reconcile::{upload_roster, UploadError};
pub use validate::{FieldError, ValidationError};
