use shared::{
    domain::{Student, StudentId, Subject, SubjectId},
    error::{ApiError, ErrorCode},
    protocol::EnrollmentAck,
};
use storage::Storage;
use tracing::info;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_subjects(ctx: &ApiContext) -> Result<Vec<Subject>, ApiError> {
    ctx.storage.list_subjects().await.map_err(internal)
}

pub async fn get_subject(ctx: &ApiContext, subject_id: SubjectId) -> Result<Subject, ApiError> {
    ctx.storage
        .get_subject(subject_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found(format!("subject {subject_id} not found")))
}

pub async fn list_enrolled_students(
    ctx: &ApiContext,
    subject_id: SubjectId,
) -> Result<Vec<Student>, ApiError> {
    get_subject(ctx, subject_id).await?;
    ctx.storage
        .list_enrolled_students(subject_id)
        .await
        .map_err(internal)
}

pub async fn list_available_students(
    ctx: &ApiContext,
    subject_id: SubjectId,
) -> Result<Vec<Student>, ApiError> {
    get_subject(ctx, subject_id).await?;
    ctx.storage
        .list_available_students(subject_id)
        .await
        .map_err(internal)
}

pub async fn add_enrollment(
    ctx: &ApiContext,
    subject_id: SubjectId,
    student_id: StudentId,
) -> Result<EnrollmentAck, ApiError> {
    get_subject(ctx, subject_id).await?;
    ensure_student(ctx, student_id).await?;

    let inserted = ctx
        .storage
        .add_enrollment(subject_id, student_id)
        .await
        .map_err(internal)?;
    if !inserted {
        return Err(ApiError::conflict(format!(
            "student {student_id} is already enrolled in subject {subject_id}"
        )));
    }

    info!(%subject_id, %student_id, "student enrolled");
    Ok(EnrollmentAck {
        subject_id,
        student_id,
        enrolled: true,
    })
}

pub async fn remove_enrollment(
    ctx: &ApiContext,
    subject_id: SubjectId,
    student_id: StudentId,
) -> Result<EnrollmentAck, ApiError> {
    let removed = ctx
        .storage
        .remove_enrollment(subject_id, student_id)
        .await
        .map_err(internal)?;
    if !removed {
        return Err(ApiError::not_found(format!(
            "student {student_id} is not enrolled in subject {subject_id}"
        )));
    }

    info!(%subject_id, %student_id, "student unenrolled");
    Ok(EnrollmentAck {
        subject_id,
        student_id,
        enrolled: false,
    })
}

async fn ensure_student(ctx: &ApiContext, student_id: StudentId) -> Result<(), ApiError> {
    let exists = ctx
        .storage
        .student_exists(student_id)
        .await
        .map_err(internal)?;
    if !exists {
        return Err(ApiError::not_found(format!(
            "student {student_id} not found"
        )));
    }
    Ok(())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
