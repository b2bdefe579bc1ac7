//! Typed access to the subject/student service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Student, StudentId, Subject, SubjectId},
    error::ApiError,
    protocol::{
        available_students_route, enrolled_students_route, enrollment_route, subject_route,
        subjects_route, AddEnrollmentRequest, EnrollmentAck,
    },
};
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected response status {status}: {message}")]
    Unexpected { status: u16, message: String },
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// The five service operations the roster workflow depends on.
///
/// Implementations perform no caching: every call is a fresh read or write
/// against the service.
#[async_trait]
pub trait RosterGateway: Send + Sync {
    async fn get_subject(&self, subject_id: SubjectId) -> Result<Subject, GatewayError>;
    async fn get_enrolled_students(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Student>, GatewayError>;
    async fn get_available_students(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Student>, GatewayError>;
    async fn add_enrollment(
        &self,
        subject_id: SubjectId,
        student_id: StudentId,
    ) -> Result<EnrollmentAck, GatewayError>;
    async fn remove_enrollment(
        &self,
        subject_id: SubjectId,
        student_id: StudentId,
    ) -> Result<EnrollmentAck, GatewayError>;
}

pub struct HttpRosterGateway {
    http: Client,
    server_url: String,
}

impl HttpRosterGateway {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        Self::with_timeout(server_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(server_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let parsed = Url::parse(server_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("unsupported server url scheme '{}'", parsed.scheme());
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Subject listing used for navigation; not part of the roster workflow.
    pub async fn list_subjects(&self) -> Result<Vec<Subject>, GatewayError> {
        self.send_json(self.http.get(self.url(subjects_route())))
            .await
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.server_url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::Transport(format!("invalid response body: {e}")));
        }

        let message = match response.json::<ApiError>().await {
            Ok(body) => body.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        debug!(status = status.as_u16(), %message, "service rejected request");
        Err(match status {
            StatusCode::NOT_FOUND => GatewayError::NotFound(message),
            StatusCode::CONFLICT => GatewayError::Conflict(message),
            _ => GatewayError::Unexpected {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl RosterGateway for HttpRosterGateway {
    async fn get_subject(&self, subject_id: SubjectId) -> Result<Subject, GatewayError> {
        self.send_json(self.http.get(self.url(&subject_route(subject_id))))
            .await
    }

    async fn get_enrolled_students(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Student>, GatewayError> {
        self.send_json(self.http.get(self.url(&enrolled_students_route(subject_id))))
            .await
    }

    async fn get_available_students(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Student>, GatewayError> {
        self.send_json(
            self.http
                .get(self.url(&available_students_route(subject_id))),
        )
        .await
    }

    async fn add_enrollment(
        &self,
        subject_id: SubjectId,
        student_id: StudentId,
    ) -> Result<EnrollmentAck, GatewayError> {
        self.send_json(
            self.http
                .post(self.url(&enrolled_students_route(subject_id)))
                .json(&AddEnrollmentRequest { student_id }),
        )
        .await
    }

    async fn remove_enrollment(
        &self,
        subject_id: SubjectId,
        student_id: StudentId,
    ) -> Result<EnrollmentAck, GatewayError> {
        self.send_json(
            self.http
                .delete(self.url(&enrollment_route(subject_id, student_id))),
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
