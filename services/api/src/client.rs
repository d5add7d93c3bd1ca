//! services/api/src/client.rs
//!
//! Reqwest-backed client for the fee tracker API, used by dashboards that drive
//! the optimistic fee toggles.
//!
//! The client owns transport details only: the session cookie, HTTP status
//! mapping, and JSON decoding into domain records.

use std::time::Duration;

use async_trait::async_trait;
use fee_tracker_core::{
    domain::{FeeSemester, StudentRecord},
    ports::{FeeStatusWriter, PortError, PortResult},
    FeeBoard,
};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::web::{
    auth::{AuthResponse, SESSION_COOKIE},
    students::{StudentResponse, UpdateStudentRequest, UploadResponse},
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("login response carried no session cookie")]
    MissingSessionCookie,
}

impl From<ClientError> for PortError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Status { status, body } => match status {
                StatusCode::NOT_FOUND => PortError::NotFound(body),
                StatusCode::CONFLICT => PortError::Conflict(body),
                StatusCode::UNAUTHORIZED => PortError::Unauthorized,
                _ => PortError::Unexpected(format!("{status}: {body}")),
            },
            other => PortError::Unexpected(other.to_string()),
        }
    }
}

/// A logged-in (or not yet logged-in) connection to one API server.
pub struct DashboardClient {
    client: Client,
    base_url: String,
    session: RwLock<Option<String>>,
}

impl DashboardClient {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn with_session(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.read().await.as_deref() {
            Some(cookie) => request.header(header::COOKIE, cookie),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = self.with_session(request).await.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        Ok(self.send(request).await?.json::<T>().await?)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Uuid, ClientError> {
        let request = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }));
        let response = self.send(request).await?;

        // Keep only the `session=<token>` pair; attributes are for browsers.
        let cookie = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .map(str::trim)
            .find(|pair| pair.starts_with(&format!("{SESSION_COOKIE}=")))
            .map(str::to_string)
            .ok_or(ClientError::MissingSessionCookie)?;
        *self.session.write().await = Some(cookie);

        let user: AuthResponse = response.json().await?;
        info!("Dashboard logged in as {}.", user.username);
        Ok(user.id)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.send(self.client.post(self.url("/auth/logout"))).await?;
        *self.session.write().await = None;
        Ok(())
    }

    pub async fn list_students(&self) -> Result<Vec<StudentRecord>, ClientError> {
        let students: Vec<StudentResponse> =
            self.send_json(self.client.get(self.url("/students"))).await?;
        Ok(students.into_iter().map(StudentRecord::from).collect())
    }

    /// Fetches the roster into a fresh board for the optimistic controller.
    pub async fn load_board(&self) -> Result<FeeBoard, ClientError> {
        Ok(FeeBoard::new(self.list_students().await?))
    }

    /// Uploads raw spreadsheet rows. Returns how many rows were processed.
    pub async fn upload(&self, rows: &[Value]) -> Result<usize, ClientError> {
        let request = self.client.post(self.url("/students/upload")).json(rows);
        let response: UploadResponse = self.send_json(request).await?;
        Ok(response.count)
    }

    /// Replaces the board's roster with the server's current one, as after an
    /// upload or full reset.
    pub async fn refresh_board(&self, board: &Mutex<FeeBoard>) -> Result<(), ClientError> {
        let students = self.list_students().await?;
        board.lock().await.replace_all(students);
        Ok(())
    }
}

#[async_trait]
impl FeeStatusWriter for DashboardClient {
    async fn set_fee_status(
        &self,
        student_id: Uuid,
        semester: FeeSemester,
        paid: bool,
    ) -> PortResult<StudentRecord> {
        let request = self
            .client
            .put(self.url(&format!("/students/{student_id}")))
            .json(&UpdateStudentRequest::fee_status(semester, paid));
        let student: StudentResponse = self.send_json(request).await?;
        Ok(StudentRecord::from(student))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_map_to_port_errors() {
        let not_found = ClientError::Status {
            status: StatusCode::NOT_FOUND,
            body: "gone".to_string(),
        };
        assert!(matches!(PortError::from(not_found), PortError::NotFound(b) if b == "gone"));

        let unauthorized = ClientError::Status {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        };
        assert!(matches!(PortError::from(unauthorized), PortError::Unauthorized));

        let server = ClientError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        };
        assert!(matches!(PortError::from(server), PortError::Unexpected(_)));
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let client = DashboardClient::new("http://127.0.0.1:3000/", Duration::from_secs(1))
            .expect("client builds");
        assert_eq!(client.url("/students"), "http://127.0.0.1:3000/students");
    }

    #[test]
    fn fee_status_body_sets_only_one_flag() {
        let body = serde_json::to_value(UpdateStudentRequest::fee_status(FeeSemester::Sem3, true))
            .expect("serializes");
        assert_eq!(body, json!({ "sem3Paid": true }));
    }
}
