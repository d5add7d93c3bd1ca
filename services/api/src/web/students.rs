//! services/api/src/web/students.rs
//!
//! REST handlers for the student roster: listing, bulk upload, per-student
//! updates and deletes, and the full reset.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
    Extension,
};
use chrono::{DateTime, Utc};
use fee_tracker_core::{
    domain::{FeeSemester, StudentPatch, StudentRecord},
    upload_roster,
    validate::validate_patch,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{
    error::RequestError,
    state::{ActingUser, AppState},
};

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A student as returned by the API.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentResponse {
    pub id: Uuid,
    pub enrollment_number: String,
    pub name: String,
    pub branch: String,
    pub semester: i32,
    pub sem1_paid: bool,
    pub sem2_paid: bool,
    pub sem3_paid: bool,
    pub sem4_paid: bool,
    pub sem5_paid: bool,
    pub sem6_paid: bool,
    pub created_at: DateTime<Utc>,
}

impl From<StudentRecord> for StudentResponse {
    fn from(s: StudentRecord) -> Self {
        let [sem1_paid, sem2_paid, sem3_paid, sem4_paid, sem5_paid, sem6_paid] = s.fees.flags();
        Self {
            id: s.id,
            enrollment_number: s.enrollment_number,
            name: s.name,
            branch: s.branch,
            semester: s.semester,
            sem1_paid,
            sem2_paid,
            sem3_paid,
            sem4_paid,
            sem5_paid,
            sem6_paid,
            created_at: s.created_at,
        }
    }
}

impl From<StudentResponse> for StudentRecord {
    fn from(s: StudentResponse) -> Self {
        StudentRecord {
            id: s.id,
            enrollment_number: s.enrollment_number,
            name: s.name,
            branch: s.branch,
            semester: s.semester,
            fees: fee_tracker_core::FeeStatus::from_flags([
                s.sem1_paid,
                s.sem2_paid,
                s.sem3_paid,
                s.sem4_paid,
                s.sem5_paid,
                s.sem6_paid,
            ]),
            created_at: s.created_at,
        }
    }
}

/// The canonical shape of one upload row. Spreadsheet labels such as
/// "Enrollment Number" are accepted as well.
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadRowSchema {
    pub enrollment_number: String,
    pub name: String,
    pub branch: String,
    pub semester: i32,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct UploadResponse {
    pub count: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ClearResponse {
    pub message: String,
    pub count: u64,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct MessageResponse {
    pub message: String,
}

/// A partial update. Absent fields are left unchanged.
#[derive(Serialize, Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateStudentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem1_paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem2_paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem3_paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem4_paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem5_paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem6_paid: Option<bool>,
}

impl UpdateStudentRequest {
    /// A request that only sets one semester's paid flag.
    pub fn fee_status(semester: FeeSemester, paid: bool) -> Self {
        let mut req = Self::default();
        let slot = match semester {
            FeeSemester::Sem1 => &mut req.sem1_paid,
            FeeSemester::Sem2 => &mut req.sem2_paid,
            FeeSemester::Sem3 => &mut req.sem3_paid,
            FeeSemester::Sem4 => &mut req.sem4_paid,
            FeeSemester::Sem5 => &mut req.sem5_paid,
            FeeSemester::Sem6 => &mut req.sem6_paid,
        };
        *slot = Some(paid);
        req
    }
}

impl From<UpdateStudentRequest> for StudentPatch {
    fn from(r: UpdateStudentRequest) -> Self {
        StudentPatch {
            enrollment_number: r.enrollment_number,
            name: r.name,
            branch: r.branch,
            semester: r.semester,
            fees: [
                r.sem1_paid,
                r.sem2_paid,
                r.sem3_paid,
                r.sem4_paid,
                r.sem5_paid,
                r.sem6_paid,
            ],
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List every student, newest first.
#[utoipa::path(
    get,
    path = "/students",
    responses(
        (status = 200, description = "All students", body = [StudentResponse]),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn list_students_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StudentResponse>>, RequestError> {
    let students = state
        .db
        .list_students()
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to load students"))?;
    Ok(Json(students.into_iter().map(StudentResponse::from).collect()))
}

/// Remove every student record. Used before re-uploading a roster from scratch.
#[utoipa::path(
    delete,
    path = "/students",
    responses(
        (status = 200, description = "All students deleted", body = ClearResponse),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn clear_students_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<ActingUser>,
) -> Result<Json<ClearResponse>, RequestError> {
    let count = state
        .db
        .delete_all_students()
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to delete students"))?;
    info!("User {} cleared all {} students.", actor.id(), count);
    Ok(Json(ClearResponse {
        message: "All students deleted".to_string(),
        count,
    }))
}

/// Normalize, validate and reconcile a batch of spreadsheet rows.
#[utoipa::path(
    post,
    path = "/students/upload",
    request_body = [UploadRowSchema],
    responses(
        (status = 200, description = "Rows processed (created and updated combined)", body = UploadResponse),
        (status = 400, description = "Validation failed; nothing was written", body = crate::web::error::ErrorBody),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn upload_students_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<ActingUser>,
    payload: Result<Json<Vec<Value>>, JsonRejection>,
) -> Result<Json<UploadResponse>, RequestError> {
    let Json(rows) = payload.map_err(|e| RequestError::BadRequest(e.body_text()))?;
    let report = upload_roster(state.db.as_ref(), &rows).await?;
    info!("User {} uploaded {} rows.", actor.id(), report.processed);
    Ok(Json(UploadResponse {
        count: report.processed,
    }))
}

/// Partially update one student, including the per-semester fee flags.
#[utoipa::path(
    put,
    path = "/students/{id}",
    request_body = UpdateStudentRequest,
    params(("id" = Uuid, Path, description = "Student id")),
    responses(
        (status = 200, description = "Updated student", body = StudentResponse),
        (status = 400, description = "Invalid update", body = crate::web::error::ErrorBody),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such student"),
        (status = 409, description = "Enrollment number already in use"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_student_handler(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<Uuid>,
    payload: Result<Json<UpdateStudentRequest>, JsonRejection>,
) -> Result<Json<StudentResponse>, RequestError> {
    let Json(req) = payload.map_err(|e| RequestError::BadRequest(e.body_text()))?;
    let patch = StudentPatch::from(req);
    validate_patch(&patch).map_err(RequestError::Validation)?;

    let student = state
        .db
        .update_student(student_id, &patch)
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to update student data."))?;
    Ok(Json(StudentResponse::from(student)))
}

/// Remove one student and all of their fee data.
#[utoipa::path(
    delete,
    path = "/students/{id}",
    params(("id" = Uuid, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student deleted", body = MessageResponse),
        (status = 401, description = "Not logged in"),
        (status = 404, description = "No such student"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<ActingUser>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, RequestError> {
    state
        .db
        .delete_student(student_id)
        .await
        .map_err(|e| RequestError::from_port(e, "Failed to delete student."))?;
    info!("User {} deleted student {}.", actor.id(), student_id);
    Ok(Json(MessageResponse {
        message: "Student deleted".to_string(),
    }))
}
