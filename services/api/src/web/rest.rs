//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification.

use utoipa::OpenApi;

use crate::web::{auth, error, students, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::logout_handler,
        students::list_students_handler,
        students::clear_students_handler,
        students::upload_students_handler,
        students::update_student_handler,
        students::delete_student_handler,
        users::list_users_handler,
        users::create_user_handler,
        users::delete_user_handler,
    ),
    components(
        schemas(
            auth::LoginRequest,
            auth::AuthResponse,
            error::ErrorBody,
            error::FieldErrorBody,
            students::StudentResponse,
            students::UploadRowSchema,
            students::UploadResponse,
            students::ClearResponse,
            students::MessageResponse,
            students::UpdateStudentRequest,
            users::UserResponse,
            users::CreateUserRequest,
        )
    ),
    tags(
        (name = "Fee Tracker API", description = "Student roster and semester fee tracking.")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/auth/login",
            "/auth/logout",
            "/students",
            "/students/upload",
            "/students/{id}",
            "/users",
            "/users/{id}",
        ] {
            assert!(paths.contains(&expected), "missing {}", expected);
        }
    }
}
