use client_core::{EditorEmptyReason, RosterView};
use shared::domain::{Student, Subject};

pub fn roster(view: &RosterView) -> String {
    let mut out = format!("{} (#{})\n", view.subject.name, view.subject.id);
    if !view.subject.description.is_empty() {
        out.push_str(&view.subject.description);
        out.push('\n');
    }
    out.push_str(&format!("{}\n", view.student_count_label()));
    if view.students.is_empty() {
        out.push_str("  No students enrolled yet. Use `add` to enroll some.\n");
    }
    for student in &view.students {
        out.push_str(&format!("  {}\n", student_line(student)));
    }
    out
}

pub fn student_line(student: &Student) -> String {
    let classes = student.class_names();
    if classes.is_empty() {
        format!("[{}] {} <{}>", student.id, student.name, student.email)
    } else {
        format!(
            "[{}] {} <{}> ({classes})",
            student.id, student.name, student.email
        )
    }
}

pub fn subjects(subjects: &[Subject]) -> String {
    if subjects.is_empty() {
        return "No subjects.\n".to_string();
    }
    subjects
        .iter()
        .map(|s| format!("[{}] {}\n", s.id, s.name))
        .collect()
}

pub fn empty_reason(reason: EditorEmptyReason) -> &'static str {
    match reason {
        EditorEmptyReason::NoMatches => "No students match the search.",
        EditorEmptyReason::AllEnrolled => "Every student is already enrolled in this subject.",
    }
}
