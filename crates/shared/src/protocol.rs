use serde::{Deserialize, Serialize};

use crate::domain::{StudentId, SubjectId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEnrollmentRequest {
    pub student_id: StudentId,
}

/// Acknowledgement returned by both enrollment commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentAck {
    pub subject_id: SubjectId,
    pub student_id: StudentId,
    pub enrolled: bool,
}

pub fn subjects_route() -> &'static str {
    "/subjects"
}

pub fn subject_route(subject_id: SubjectId) -> String {
    format!("/subjects/{}", subject_id.0)
}

pub fn enrolled_students_route(subject_id: SubjectId) -> String {
    format!("/subjects/{}/students", subject_id.0)
}

pub fn available_students_route(subject_id: SubjectId) -> String {
    format!("/subjects/{}/available-students", subject_id.0)
}

pub fn enrollment_route(subject_id: SubjectId, student_id: StudentId) -> String {
    format!("/subjects/{}/students/{}", subject_id.0, student_id.0)
}
