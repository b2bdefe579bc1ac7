use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};

use shared::domain::{ClassId, ClassRef, Student, StudentId, Subject, SubjectId};

pub mod seed;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Tables in drop order: dependents before the tables they reference.
const ROSTER_TABLES: &[&str] = &[
    "subject_students",
    "student_classes",
    "classes",
    "students",
    "subjects",
    "_sqlx_migrations",
];

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, Copy)]
enum Membership {
    EnrolledIn(SubjectId),
    NotEnrolledIn(SubjectId),
}

impl Membership {
    fn subject_id(self) -> SubjectId {
        match self {
            Self::EnrolledIn(subject_id) | Self::NotEnrolledIn(subject_id) => subject_id,
        }
    }

    fn predicate(self) -> &'static str {
        match self {
            Self::EnrolledIn(_) => {
                "s.id IN (SELECT student_id FROM subject_students WHERE subject_id = ?)"
            }
            Self::NotEnrolledIn(_) => {
                "s.id NOT IN (SELECT student_id FROM subject_students WHERE subject_id = ?)"
            }
        }
    }
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Drops every roster table and recreates the schema from scratch.
    pub async fn reset_schema(&self) -> Result<()> {
        for table in ROSTER_TABLES {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&self.pool)
                .await
                .with_context(|| format!("failed to drop table {table}"))?;
        }
        MIGRATOR
            .run(&self.pool)
            .await
            .context("failed to recreate roster schema")?;
        Ok(())
    }

    pub async fn create_subject(&self, name: &str, description: &str) -> Result<SubjectId> {
        let rec = sqlx::query("INSERT INTO subjects (name, description) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(description)
            .fetch_one(&self.pool)
            .await?;
        Ok(SubjectId(rec.get::<i64, _>(0)))
    }

    pub async fn create_student(&self, name: &str, email: &str) -> Result<StudentId> {
        let rec = sqlx::query("INSERT INTO students (name, email) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("failed to create student with email '{email}'"))?;
        Ok(StudentId(rec.get::<i64, _>(0)))
    }

    pub async fn create_class(&self, name: &str) -> Result<ClassId> {
        let rec = sqlx::query(
            "INSERT INTO classes (name) VALUES (?)
             ON CONFLICT(name) DO UPDATE SET name=excluded.name
             RETURNING id",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(ClassId(rec.get::<i64, _>(0)))
    }

    /// Appends `class_id` to the student's ordered class list.
    pub async fn assign_class(&self, student_id: StudentId, class_id: ClassId) -> Result<()> {
        sqlx::query(
            "INSERT INTO student_classes (student_id, class_id, position)
             VALUES (?, ?, (SELECT COUNT(*) FROM student_classes WHERE student_id = ?))
             ON CONFLICT(student_id, class_id) DO NOTHING",
        )
        .bind(student_id.0)
        .bind(class_id.0)
        .bind(student_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_subjects(&self) -> Result<Vec<Subject>> {
        let rows = sqlx::query("SELECT id, name, description FROM subjects ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(subject_from_row).collect())
    }

    pub async fn get_subject(&self, subject_id: SubjectId) -> Result<Option<Subject>> {
        let row = sqlx::query("SELECT id, name, description FROM subjects WHERE id = ?")
            .bind(subject_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(subject_from_row))
    }

    pub async fn student_exists(&self, student_id: StudentId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM students WHERE id = ?")
            .bind(student_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn list_enrolled_students(&self, subject_id: SubjectId) -> Result<Vec<Student>> {
        self.list_students(Membership::EnrolledIn(subject_id)).await
    }

    /// Students with no enrollment row for `subject_id`.
    pub async fn list_available_students(&self, subject_id: SubjectId) -> Result<Vec<Student>> {
        self.list_students(Membership::NotEnrolledIn(subject_id))
            .await
    }

    /// Returns `false` when the pair was already enrolled.
    pub async fn add_enrollment(&self, subject_id: SubjectId, student_id: StudentId) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO subject_students (subject_id, student_id) VALUES (?, ?)
             ON CONFLICT(subject_id, student_id) DO NOTHING",
        )
        .bind(subject_id.0)
        .bind(student_id.0)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to enroll student {} in subject {}",
                student_id.0, subject_id.0
            )
        })?
        .rows_affected();
        Ok(inserted > 0)
    }

    /// Returns `false` when there was no such enrollment.
    pub async fn remove_enrollment(
        &self,
        subject_id: SubjectId,
        student_id: StudentId,
    ) -> Result<bool> {
        let removed = sqlx::query(
            "DELETE FROM subject_students WHERE subject_id = ? AND student_id = ?",
        )
        .bind(subject_id.0)
        .bind(student_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(removed > 0)
    }

    async fn list_students(&self, membership: Membership) -> Result<Vec<Student>> {
        let subject_id = membership.subject_id().0;
        let predicate = membership.predicate();

        let student_rows = sqlx::query(&format!(
            "SELECT s.id, s.name, s.email FROM students s WHERE {predicate} ORDER BY s.name, s.id"
        ))
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        let class_rows = sqlx::query(&format!(
            "SELECT s.id, c.id, c.name
             FROM students s
             INNER JOIN student_classes sc ON sc.student_id = s.id
             INNER JOIN classes c ON c.id = sc.class_id
             WHERE {predicate}
             ORDER BY s.id, sc.position"
        ))
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        let mut classes: HashMap<i64, Vec<ClassRef>> = HashMap::new();
        for row in class_rows {
            classes
                .entry(row.get::<i64, _>(0))
                .or_default()
                .push(ClassRef {
                    id: ClassId(row.get::<i64, _>(1)),
                    name: row.get::<String, _>(2),
                });
        }

        Ok(student_rows
            .into_iter()
            .map(|row| {
                let id = row.get::<i64, _>(0);
                Student {
                    id: StudentId(id),
                    name: row.get::<String, _>(1),
                    email: row.get::<String, _>(2),
                    classes: classes.remove(&id).unwrap_or_default(),
                }
            })
            .collect())
    }
}

fn subject_from_row(row: &SqliteRow) -> Subject {
    Subject {
        id: SubjectId(row.get::<i64, _>(0)),
        name: row.get::<String, _>(1),
        description: row.get::<String, _>(2),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
