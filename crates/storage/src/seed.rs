//! Seed records loaded by the `setup-db` administrative command.

use anyhow::{Context, Result};
use shared::domain::{StudentId, SubjectId};

use crate::Storage;

const CLASSES: &[&str] = &["1A", "1B", "2A"];

const SUBJECTS: &[(&str, &str)] = &[
    ("Algebra", "Linear equations, polynomials and functions."),
    ("Biology", "Cells, genetics and ecosystems."),
    ("History", "Europe from the Middle Ages to the present."),
];

/// `(name, email, classes)`
const STUDENTS: &[(&str, &str, &[&str])] = &[
    ("Alice Nowak", "alice.nowak@school.test", &["1A"]),
    ("Bob Kowalski", "bob.kowalski@school.test", &["1A"]),
    ("Carol Wiśniewska", "carol.wisniewska@school.test", &["1B"]),
    ("Dave Wójcik", "dave.wojcik@school.test", &["1B", "2A"]),
    ("Eve Kamińska", "eve.kaminska@school.test", &["2A"]),
];

/// `(subject index, student index)`
const ENROLLMENTS: &[(usize, usize)] = &[(0, 0), (0, 1), (1, 2), (1, 3), (2, 4)];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub classes: usize,
    pub subjects: usize,
    pub students: usize,
    pub enrollments: usize,
}

pub async fn seed(storage: &Storage) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    for name in CLASSES {
        storage
            .create_class(name)
            .await
            .with_context(|| format!("failed to seed class {name}"))?;
        summary.classes += 1;
    }

    let mut subject_ids: Vec<SubjectId> = Vec::with_capacity(SUBJECTS.len());
    for (name, description) in SUBJECTS {
        subject_ids.push(
            storage
                .create_subject(name, description)
                .await
                .with_context(|| format!("failed to seed subject {name}"))?,
        );
        summary.subjects += 1;
    }

    let mut student_ids: Vec<StudentId> = Vec::with_capacity(STUDENTS.len());
    for (name, email, classes) in STUDENTS {
        let student_id = storage.create_student(name, email).await?;
        for class in classes.iter() {
            let class_id = storage.create_class(class).await?;
            storage.assign_class(student_id, class_id).await?;
        }
        student_ids.push(student_id);
        summary.students += 1;
    }

    for &(subject, student) in ENROLLMENTS {
        storage
            .add_enrollment(subject_ids[subject], student_ids[student])
            .await?;
        summary.enrollments += 1;
    }

    Ok(summary)
}
