//! Roster view controller: fetch lifecycle, enrolled list, and mutations.

use std::sync::Arc;

use shared::domain::{Student, StudentId, Subject, SubjectId};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    confirm::ConfirmationGate,
    editor::EnrollmentEditor,
    gateway::{GatewayError, RosterGateway},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterView {
    pub subject: Subject,
    pub students: Vec<Student>,
}

impl RosterView {
    pub fn contains(&self, student_id: StudentId) -> bool {
        self.students.iter().any(|s| s.id == student_id)
    }

    pub fn student(&self, student_id: StudentId) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }

    pub fn student_count_label(&self) -> String {
        match self.students.len() {
            1 => "1 student".to_string(),
            n => format!("{n} students"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterState {
    Loading,
    Loaded(RosterView),
    /// Terminal for the current subject id; only navigating away leaves it.
    NotFound,
}

#[derive(Debug, Clone)]
pub enum RosterEvent {
    StateChanged {
        subject_id: SubjectId,
        state: RosterState,
    },
    Notice {
        subject_id: SubjectId,
        message: String,
    },
}

/// Result of a load whose reads have completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied(RosterState),
    /// Another load started or the viewed subject changed while the reads
    /// were in flight; the response was discarded.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    Declined,
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("no subject has been opened")]
    NoSubject,
    #[error("roster for subject {0} is not loaded")]
    NotLoaded(SubjectId),
    #[error("editor was opened for subject {editor} but subject {current} is being viewed")]
    StaleEditor {
        editor: SubjectId,
        current: SubjectId,
    },
    #[error("editor is closed")]
    EditorClosed,
    #[error("student {0} is not among the editor's candidates")]
    NotACandidate(StudentId),
    #[error("student {0} is not on the roster")]
    NotOnRoster(StudentId),
    #[error("confirmation prompt failed: {source}")]
    Confirmation { source: anyhow::Error },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

struct ControllerState {
    subject_id: Option<SubjectId>,
    generation: u64,
    state: RosterState,
    last_loaded: Option<RosterView>,
}

/// Owns the roster for the subject being viewed.
///
/// The server is the only source of truth for enrollment: every successful
/// add or remove is followed by a full re-read of subject and enrolled
/// students, never by patching the cached list.
pub struct RosterController {
    gateway: Arc<dyn RosterGateway>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<RosterEvent>,
}

impl RosterController {
    pub fn new(gateway: Arc<dyn RosterGateway>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            gateway,
            inner: Mutex::new(ControllerState {
                subject_id: None,
                generation: 0,
                state: RosterState::Loading,
                last_loaded: None,
            }),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RosterEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> RosterState {
        self.inner.lock().await.state.clone()
    }

    pub async fn subject_id(&self) -> Option<SubjectId> {
        self.inner.lock().await.subject_id
    }

    /// Shows `subject_id`, entering `Loading` and fetching the subject and
    /// its enrolled students concurrently.
    pub async fn load(&self, subject_id: SubjectId) -> LoadOutcome {
        let generation = {
            let mut guard = self.inner.lock().await;
            guard.last_loaded = None;
            self.enter_loading(&mut guard, subject_id)
        };
        self.fetch(subject_id, generation, true).await
    }

    /// Re-reads the current subject. Failures keep the previously shown
    /// roster and are published as a notice.
    pub async fn refresh(&self) -> Result<LoadOutcome, RosterError> {
        let (subject_id, _) = self.loaded().await?;
        Ok(self.refetch(subject_id).await)
    }

    /// Fetches the available-student set and opens an editor over it.
    pub async fn open_editor(&self) -> Result<EnrollmentEditor, RosterError> {
        let (subject_id, _) = self.loaded().await?;
        match self.gateway.get_available_students(subject_id).await {
            Ok(students) => {
                debug!(%subject_id, candidates = students.len(), "enrollment editor opened");
                Ok(EnrollmentEditor::new(subject_id, students))
            }
            Err(error) => {
                warn!(%subject_id, %error, "failed to fetch available students");
                self.notify(
                    subject_id,
                    format!("Could not load available students: {error}"),
                );
                Err(error.into())
            }
        }
    }

    /// Enrolls a candidate picked in `editor`. On success the editor is
    /// closed and the roster re-read; on failure the editor stays open and
    /// the roster is left as it was.
    pub async fn add_student(
        &self,
        editor: &mut EnrollmentEditor,
        student_id: StudentId,
    ) -> Result<(), RosterError> {
        if !editor.is_open() {
            return Err(RosterError::EditorClosed);
        }
        let (subject_id, _) = self.loaded().await?;
        if editor.subject_id() != subject_id {
            return Err(RosterError::StaleEditor {
                editor: editor.subject_id(),
                current: subject_id,
            });
        }
        if !editor.is_candidate(student_id) {
            return Err(RosterError::NotACandidate(student_id));
        }

        if let Err(error) = self.gateway.add_enrollment(subject_id, student_id).await {
            warn!(%subject_id, %student_id, %error, "failed to add student");
            self.notify(subject_id, format!("Could not add the student: {error}"));
            return Err(error.into());
        }

        info!(%subject_id, %student_id, "student added");
        editor.close();
        self.refetch(subject_id).await;
        Ok(())
    }

    /// Removes a student from the roster once `gate` approves.
    pub async fn remove_student(
        &self,
        student_id: StudentId,
        gate: &dyn ConfirmationGate,
    ) -> Result<RemoveOutcome, RosterError> {
        let (subject_id, view) = self.loaded().await?;
        let student = view
            .student(student_id)
            .ok_or(RosterError::NotOnRoster(student_id))?;

        let prompt = format!(
            "Are you sure you want to remove {} from {}?",
            student.name, view.subject.name
        );
        let approved = gate
            .confirm(&prompt)
            .map_err(|source| RosterError::Confirmation { source })?;
        if !approved {
            debug!(%subject_id, %student_id, "removal declined");
            return Ok(RemoveOutcome::Declined);
        }

        if let Err(error) = self
            .gateway
            .remove_enrollment(subject_id, student_id)
            .await
        {
            warn!(%subject_id, %student_id, %error, "failed to remove student");
            self.notify(subject_id, format!("Could not remove the student: {error}"));
            return Err(error.into());
        }

        info!(%subject_id, %student_id, "student removed");
        self.refetch(subject_id).await;
        Ok(RemoveOutcome::Removed)
    }

    /// Re-reads `subject_id` unless another subject is being viewed by now,
    /// in which case nothing is touched.
    async fn refetch(&self, subject_id: SubjectId) -> LoadOutcome {
        let generation = {
            let mut guard = self.inner.lock().await;
            if guard.subject_id != Some(subject_id) {
                debug!(%subject_id, "viewed subject changed; skipping roster refresh");
                return LoadOutcome::Superseded;
            }
            self.enter_loading(&mut guard, subject_id)
        };
        self.fetch(subject_id, generation, false).await
    }

    fn enter_loading(&self, state: &mut ControllerState, subject_id: SubjectId) -> u64 {
        state.subject_id = Some(subject_id);
        state.generation += 1;
        state.state = RosterState::Loading;
        self.publish_state(subject_id, &state.state);
        state.generation
    }

    async fn fetch(&self, subject_id: SubjectId, generation: u64, initial: bool) -> LoadOutcome {
        let result = tokio::try_join!(
            self.gateway.get_subject(subject_id),
            self.gateway.get_enrolled_students(subject_id),
        );

        let mut guard = self.inner.lock().await;
        if guard.generation != generation || guard.subject_id != Some(subject_id) {
            debug!(%subject_id, generation, "discarding stale roster response");
            return LoadOutcome::Superseded;
        }

        guard.state = match result {
            Ok((subject, students)) => {
                let view = RosterView { subject, students };
                guard.last_loaded = Some(view.clone());
                RosterState::Loaded(view)
            }
            Err(error) => match guard.last_loaded.clone() {
                Some(previous) if !initial => {
                    warn!(%subject_id, %error, "roster refresh failed; keeping previous roster");
                    self.notify(subject_id, format!("Could not refresh the roster: {error}"));
                    RosterState::Loaded(previous)
                }
                _ => {
                    warn!(%subject_id, %error, "could not establish roster");
                    RosterState::NotFound
                }
            },
        };
        self.publish_state(subject_id, &guard.state);
        LoadOutcome::Applied(guard.state.clone())
    }

    /// Current subject id and roster, provided the roster is loaded.
    async fn loaded(&self) -> Result<(SubjectId, RosterView), RosterError> {
        let guard = self.inner.lock().await;
        let subject_id = guard.subject_id.ok_or(RosterError::NoSubject)?;
        match &guard.state {
            RosterState::Loaded(view) => Ok((subject_id, view.clone())),
            RosterState::Loading | RosterState::NotFound => Err(RosterError::NotLoaded(subject_id)),
        }
    }

    fn publish_state(&self, subject_id: SubjectId, state: &RosterState) {
        let _ = self.events.send(RosterEvent::StateChanged {
            subject_id,
            state: state.clone(),
        });
    }

    fn notify(&self, subject_id: SubjectId, message: String) {
        let _ = self.events.send(RosterEvent::Notice {
            subject_id,
            message,
        });
    }
}

#[cfg(test)]
#[path = "tests/roster_tests.rs"]
mod tests;
