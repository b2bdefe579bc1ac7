//! Search-filtered picker over the students available to a subject.

use shared::domain::{Student, StudentId, SubjectId};

/// Why an open editor currently shows no candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEmptyReason {
    /// The snapshot has students but none match the search text.
    NoMatches,
    /// Every student is already enrolled in the subject.
    AllEnrolled,
}

/// Case-insensitive substring match against name or email. An empty query
/// matches every student.
pub fn matches_search(student: &Student, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let query = query.to_lowercase();
    student.name.to_lowercase().contains(&query) || student.email.to_lowercase().contains(&query)
}

pub fn filter_students<'a>(students: &'a [Student], query: &str) -> Vec<&'a Student> {
    students
        .iter()
        .filter(|student| matches_search(student, query))
        .collect()
}

/// Transient add-student workflow for one subject.
///
/// Holds the available-student set fetched when it was opened. The snapshot
/// is never edited in place; it is dropped when the editor closes and a new
/// editor fetches a fresh one.
#[derive(Debug, Clone)]
pub struct EnrollmentEditor {
    subject_id: SubjectId,
    snapshot: Vec<Student>,
    search: String,
    open: bool,
}

impl EnrollmentEditor {
    pub(crate) fn new(subject_id: SubjectId, snapshot: Vec<Student>) -> Self {
        Self {
            subject_id,
            snapshot,
            search: String::new(),
            open: true,
        }
    }

    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.search = text.into();
    }

    pub fn snapshot(&self) -> &[Student] {
        &self.snapshot
    }

    pub fn candidates(&self) -> Vec<&Student> {
        filter_students(&self.snapshot, &self.search)
    }

    pub fn is_candidate(&self, student_id: StudentId) -> bool {
        self.open
            && self
                .snapshot
                .iter()
                .any(|s| s.id == student_id && matches_search(s, &self.search))
    }

    pub fn empty_reason(&self) -> Option<EditorEmptyReason> {
        if self.snapshot.is_empty() {
            Some(EditorEmptyReason::AllEnrolled)
        } else if self.candidates().is_empty() {
            Some(EditorEmptyReason::NoMatches)
        } else {
            None
        }
    }

    /// Closes the editor, clearing the search text and discarding the snapshot.
    pub fn close(&mut self) {
        self.search.clear();
        self.snapshot = Vec::new();
        self.open = false;
    }
}
