//! HTTP service exposing subjects and their student rosters.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use shared::{
    domain::{Student, StudentId, Subject, SubjectId},
    error::{ApiError, ErrorCode},
    protocol::{AddEnrollmentRequest, EnrollmentAck},
};
use tracing::warn;

pub mod api;
pub mod app_state;
pub mod config;

pub use app_state::AppState;

type Rejection = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<Json<T>, Rejection>;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/subjects", get(http_list_subjects))
        .route("/subjects/:subject_id", get(http_get_subject))
        .route(
            "/subjects/:subject_id/students",
            get(http_list_enrolled).post(http_add_enrollment),
        )
        .route(
            "/subjects/:subject_id/available-students",
            get(http_list_available),
        )
        .route(
            "/subjects/:subject_id/students/:student_id",
            delete(http_remove_enrollment),
        )
        .with_state(state)
}

pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(error: ApiError) -> Rejection {
    let status = status_for(error.code);
    if status.is_server_error() {
        warn!(message = %error.message, "request failed");
    }
    (status, Json(error))
}

/// Malformed path segments and bodies get the same JSON error body as
/// every other failure.
fn invalid(rejection: impl std::fmt::Display) -> Rejection {
    reject(ApiError::new(ErrorCode::Validation, rejection.to_string()))
}

fn subject_param(path: Result<Path<i64>, PathRejection>) -> Result<SubjectId, Rejection> {
    path.map(|Path(id)| SubjectId(id)).map_err(invalid)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok("ok")
}

async fn http_list_subjects(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Subject>> {
    api::list_subjects(&state.api).await.map(Json).map_err(reject)
}

async fn http_get_subject(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Subject> {
    api::get_subject(&state.api, subject_param(path)?)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_enrolled(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<Student>> {
    api::list_enrolled_students(&state.api, subject_param(path)?)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_available(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<Student>> {
    api::list_available_students(&state.api, subject_param(path)?)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_add_enrollment(
    State(state): State<Arc<AppState>>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<AddEnrollmentRequest>, JsonRejection>,
) -> ApiResult<EnrollmentAck> {
    let subject_id = subject_param(path)?;
    let Json(req) = body.map_err(invalid)?;
    api::add_enrollment(&state.api, subject_id, req.student_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_remove_enrollment(
    State(state): State<Arc<AppState>>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> ApiResult<EnrollmentAck> {
    let Path((subject_id, student_id)) = path.map_err(invalid)?;
    api::remove_enrollment(&state.api, SubjectId(subject_id), StudentId(student_id))
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
