use super::*;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Mutex as StdMutex,
};

use anyhow::anyhow;
use async_trait::async_trait;
use crate::confirm::AutoConfirm;
use shared::protocol::EnrollmentAck;
use tokio::sync::{broadcast::error::TryRecvError, Notify};

const ALGEBRA: SubjectId = SubjectId(1);
const BIOLOGY: SubjectId = SubjectId(2);
const ALICE: StudentId = StudentId(1);
const BOB: StudentId = StudentId(2);
const CAROL: StudentId = StudentId(3);
const DAVE: StudentId = StudentId(4);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    GetSubject(SubjectId),
    GetEnrolled(SubjectId),
    GetAvailable(SubjectId),
    Add(SubjectId, StudentId),
    Remove(SubjectId, StudentId),
}

/// In-memory service: available students are computed from the population
/// minus the enrollment table, the way the real service does it.
#[derive(Default)]
struct StubGateway {
    subjects: Vec<Subject>,
    population: Vec<Student>,
    enrolled: StdMutex<HashMap<SubjectId, BTreeSet<StudentId>>>,
    calls: StdMutex<Vec<Call>>,
    fail_add: StdMutex<Option<GatewayError>>,
    fail_remove: StdMutex<Option<GatewayError>>,
    fail_available: StdMutex<Option<GatewayError>>,
    fail_enrolled: StdMutex<Option<GatewayError>>,
    hold_subject: StdMutex<Option<(SubjectId, Arc<Notify>)>>,
    hold_writes: StdMutex<Option<Arc<Notify>>>,
}

impl StubGateway {
    fn algebra() -> Self {
        let subject = |id: SubjectId, name: &str| Subject {
            id,
            name: name.into(),
            description: String::new(),
        };
        let student = |id: StudentId, name: &str| Student {
            id,
            name: name.into(),
            email: format!("{}@school.test", name.to_lowercase()),
            classes: Vec::new(),
        };
        let gateway = Self {
            subjects: vec![subject(ALGEBRA, "Algebra"), subject(BIOLOGY, "Biology")],
            population: vec![
                student(ALICE, "Alice"),
                student(BOB, "Bob"),
                student(CAROL, "Carol"),
                student(DAVE, "Dave"),
            ],
            ..Self::default()
        };
        gateway
            .enrolled
            .lock()
            .expect("lock")
            .insert(ALGEBRA, BTreeSet::from([ALICE, BOB]));
        gateway
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("lock").push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }

    fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Add(..) | Call::Remove(..)))
            .collect()
    }

    fn count(&self, wanted: fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| wanted(c)).count()
    }

    fn fail(slot: &StdMutex<Option<GatewayError>>) -> Result<(), GatewayError> {
        match slot.lock().expect("lock").clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn wait_if_writes_held(&self) {
        let hold = self.hold_writes.lock().expect("lock").clone();
        if let Some(notify) = hold {
            notify.notified().await;
        }
    }

    fn students_where(&self, subject_id: SubjectId, enrolled: bool) -> Vec<Student> {
        let table = self.enrolled.lock().expect("lock");
        let members = table.get(&subject_id).cloned().unwrap_or_default();
        self.population
            .iter()
            .filter(|s| members.contains(&s.id) == enrolled)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RosterGateway for StubGateway {
    async fn get_subject(&self, subject_id: SubjectId) -> Result<Subject, GatewayError> {
        self.record(Call::GetSubject(subject_id));
        let hold = self
            .hold_subject
            .lock()
            .expect("lock")
            .as_ref()
            .filter(|(held, _)| *held == subject_id)
            .map(|(_, notify)| Arc::clone(notify));
        if let Some(notify) = hold {
            notify.notified().await;
        }
        self.subjects
            .iter()
            .find(|s| s.id == subject_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("subject {subject_id} not found")))
    }

    async fn get_enrolled_students(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Student>, GatewayError> {
        self.record(Call::GetEnrolled(subject_id));
        Self::fail(&self.fail_enrolled)?;
        Ok(self.students_where(subject_id, true))
    }

    async fn get_available_students(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Student>, GatewayError> {
        self.record(Call::GetAvailable(subject_id));
        Self::fail(&self.fail_available)?;
        Ok(self.students_where(subject_id, false))
    }

    async fn add_enrollment(
        &self,
        subject_id: SubjectId,
        student_id: StudentId,
    ) -> Result<EnrollmentAck, GatewayError> {
        self.record(Call::Add(subject_id, student_id));
        self.wait_if_writes_held().await;
        Self::fail(&self.fail_add)?;
        let mut table = self.enrolled.lock().expect("lock");
        if !table.entry(subject_id).or_default().insert(student_id) {
            return Err(GatewayError::Conflict("already enrolled".into()));
        }
        Ok(EnrollmentAck {
            subject_id,
            student_id,
            enrolled: true,
        })
    }

    async fn remove_enrollment(
        &self,
        subject_id: SubjectId,
        student_id: StudentId,
    ) -> Result<EnrollmentAck, GatewayError> {
        self.record(Call::Remove(subject_id, student_id));
        self.wait_if_writes_held().await;
        Self::fail(&self.fail_remove)?;
        let mut table = self.enrolled.lock().expect("lock");
        if !table.entry(subject_id).or_default().remove(&student_id) {
            return Err(GatewayError::NotFound("no such enrollment".into()));
        }
        Ok(EnrollmentAck {
            subject_id,
            student_id,
            enrolled: false,
        })
    }
}

struct ScriptedGate {
    answer: bool,
    prompts: StdMutex<Vec<String>>,
}

impl ScriptedGate {
    fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: StdMutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("lock").clone()
    }
}

impl ConfirmationGate for ScriptedGate {
    fn confirm(&self, prompt: &str) -> anyhow::Result<bool> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        Ok(self.answer)
    }
}

struct BrokenGate;

impl ConfirmationGate for BrokenGate {
    fn confirm(&self, _prompt: &str) -> anyhow::Result<bool> {
        Err(anyhow!("not a terminal"))
    }
}

fn controller() -> (Arc<StubGateway>, RosterController) {
    let gateway = Arc::new(StubGateway::algebra());
    let controller = RosterController::new(gateway.clone());
    (gateway, controller)
}

async fn loaded_controller() -> (Arc<StubGateway>, RosterController) {
    let (gateway, controller) = controller();
    let outcome = controller.load(ALGEBRA).await;
    assert!(matches!(
        outcome,
        LoadOutcome::Applied(RosterState::Loaded(_))
    ));
    (gateway, controller)
}

async fn roster_names(controller: &RosterController) -> Vec<String> {
    match controller.state().await {
        RosterState::Loaded(view) => view.students.into_iter().map(|s| s.name).collect(),
        other => panic!("expected loaded roster, got {other:?}"),
    }
}

fn drain(rx: &mut broadcast::Receiver<RosterEvent>) -> Vec<RosterEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
    events
}

fn notices(events: &[RosterEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            RosterEvent::Notice { message, .. } => Some(message.as_str()),
            RosterEvent::StateChanged { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn load_enters_loading_then_loaded() {
    let (gateway, controller) = controller();
    assert_eq!(controller.state().await, RosterState::Loading);
    let mut rx = controller.subscribe_events();

    controller.load(ALGEBRA).await;

    assert_eq!(roster_names(&controller).await, ["Alice", "Bob"]);
    let states: Vec<RosterState> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            RosterEvent::StateChanged { state, .. } => Some(state),
            RosterEvent::Notice { .. } => None,
        })
        .collect();
    assert_eq!(states.len(), 2);
    assert_eq!(states[0], RosterState::Loading);
    assert!(matches!(states[1], RosterState::Loaded(_)));
    assert_eq!(gateway.count(|c| matches!(c, Call::GetSubject(_))), 1);
    assert_eq!(gateway.count(|c| matches!(c, Call::GetEnrolled(_))), 1);
}

#[tokio::test]
async fn roster_view_labels_student_count() {
    let (_gateway, controller) = loaded_controller().await;
    let RosterState::Loaded(view) = controller.state().await else {
        panic!("expected loaded roster");
    };
    assert_eq!(view.student_count_label(), "2 students");
    assert!(view.contains(ALICE));
    assert!(!view.contains(CAROL));
}

#[tokio::test]
async fn search_narrows_fresh_available_snapshot() {
    let (gateway, controller) = loaded_controller().await;

    let mut editor = controller.open_editor().await.expect("editor");
    assert_eq!(editor.snapshot().len(), 2);
    editor.set_search("ca");

    let names: Vec<&str> = editor.candidates().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Carol"]);
    assert_eq!(gateway.count(|c| matches!(c, Call::GetAvailable(_))), 1);
}

#[tokio::test]
async fn adding_candidate_closes_editor_and_rereads_roster() {
    let (gateway, controller) = loaded_controller().await;
    let mut editor = controller.open_editor().await.expect("editor");
    editor.set_search("ca");

    controller
        .add_student(&mut editor, CAROL)
        .await
        .expect("add carol");

    assert!(!editor.is_open());
    assert_eq!(editor.search(), "");
    assert_eq!(roster_names(&controller).await, ["Alice", "Bob", "Carol"]);
    assert_eq!(gateway.count(|c| matches!(c, Call::GetSubject(_))), 2);
    assert_eq!(gateway.count(|c| matches!(c, Call::GetEnrolled(_))), 2);
}

#[tokio::test]
async fn declined_removal_issues_no_write() {
    let (gateway, controller) = loaded_controller().await;
    let mut editor = controller.open_editor().await.expect("editor");
    controller
        .add_student(&mut editor, CAROL)
        .await
        .expect("add carol");
    let writes_before = gateway.writes();
    let reads_before = gateway.count(|c| matches!(c, Call::GetEnrolled(_)));

    let gate = ScriptedGate::answering(false);
    let outcome = controller
        .remove_student(BOB, &gate)
        .await
        .expect("declined");

    assert_eq!(outcome, RemoveOutcome::Declined);
    assert_eq!(gateway.writes(), writes_before);
    assert_eq!(
        gateway.count(|c| matches!(c, Call::GetEnrolled(_))),
        reads_before
    );
    assert_eq!(roster_names(&controller).await, ["Alice", "Bob", "Carol"]);
    let prompts = gate.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Bob"));
    assert!(prompts[0].contains("Algebra"));
}

#[tokio::test]
async fn unknown_subject_is_terminal_not_found() {
    let (gateway, controller) = controller();

    let outcome = controller.load(SubjectId(999)).await;
    assert_eq!(outcome, LoadOutcome::Applied(RosterState::NotFound));
    let calls_after_load = gateway.calls().len();

    assert!(matches!(
        controller.open_editor().await,
        Err(RosterError::NotLoaded(SubjectId(999)))
    ));
    assert!(matches!(
        controller.refresh().await,
        Err(RosterError::NotLoaded(_))
    ));
    let gate = ScriptedGate::answering(true);
    assert!(matches!(
        controller.remove_student(ALICE, &gate).await,
        Err(RosterError::NotLoaded(_))
    ));

    assert_eq!(gateway.calls().len(), calls_after_load);
    assert!(gate.prompts().is_empty());
    assert_eq!(controller.state().await, RosterState::NotFound);
}

#[tokio::test]
async fn navigating_away_from_not_found_recovers() {
    let (_gateway, controller) = controller();
    controller.load(SubjectId(999)).await;
    controller.load(ALGEBRA).await;
    assert_eq!(roster_names(&controller).await, ["Alice", "Bob"]);
}

#[tokio::test]
async fn transport_failure_on_initial_load_is_not_found() {
    let (gateway, controller) = controller();
    *gateway.fail_enrolled.lock().expect("lock") =
        Some(GatewayError::Transport("connection refused".into()));

    let outcome = controller.load(ALGEBRA).await;
    assert_eq!(outcome, LoadOutcome::Applied(RosterState::NotFound));
}

#[tokio::test]
async fn accepted_removal_rereads_roster_without_student() {
    let (gateway, controller) = loaded_controller().await;
    let gate = ScriptedGate::answering(true);

    let outcome = controller
        .remove_student(BOB, &gate)
        .await
        .expect("remove bob");

    assert_eq!(outcome, RemoveOutcome::Removed);
    assert_eq!(gateway.writes(), [Call::Remove(ALGEBRA, BOB)]);
    assert_eq!(roster_names(&controller).await, ["Alice"]);

    let editor = controller.open_editor().await.expect("editor");
    assert!(editor.snapshot().iter().any(|s| s.id == BOB));
}

#[tokio::test]
async fn failed_add_keeps_editor_and_roster() {
    let (gateway, controller) = loaded_controller().await;
    let before = controller.state().await;
    let mut rx = controller.subscribe_events();
    *gateway.fail_add.lock().expect("lock") =
        Some(GatewayError::Conflict("already enrolled".into()));

    let mut editor = controller.open_editor().await.expect("editor");
    editor.set_search("dave");
    let snapshot_before = editor.snapshot().to_vec();
    let reads_before = gateway.count(|c| matches!(c, Call::GetEnrolled(_)));

    let err = controller
        .add_student(&mut editor, DAVE)
        .await
        .expect_err("add should fail");

    assert!(matches!(err, RosterError::Gateway(GatewayError::Conflict(_))));
    assert!(editor.is_open());
    assert_eq!(editor.search(), "dave");
    assert_eq!(editor.snapshot(), snapshot_before.as_slice());
    assert_eq!(controller.state().await, before);
    assert_eq!(
        gateway.count(|c| matches!(c, Call::GetEnrolled(_))),
        reads_before
    );
    assert_eq!(notices(&drain(&mut rx)).len(), 1);
}

#[tokio::test]
async fn failed_removal_leaves_roster_untouched() {
    let (gateway, controller) = loaded_controller().await;
    let before = controller.state().await;
    *gateway.fail_remove.lock().expect("lock") =
        Some(GatewayError::Transport("timed out".into()));

    let err = controller
        .remove_student(ALICE, &AutoConfirm)
        .await
        .expect_err("remove should fail");

    assert!(matches!(
        err,
        RosterError::Gateway(GatewayError::Transport(_))
    ));
    assert_eq!(controller.state().await, before);
    assert_eq!(gateway.count(|c| matches!(c, Call::GetEnrolled(_))), 1);
}

#[tokio::test]
async fn available_fetch_failure_is_reported() {
    let (gateway, controller) = loaded_controller().await;
    let mut rx = controller.subscribe_events();
    *gateway.fail_available.lock().expect("lock") =
        Some(GatewayError::Transport("connection reset".into()));

    let err = controller
        .open_editor()
        .await
        .expect_err("editor should not open");

    assert!(matches!(err, RosterError::Gateway(_)));
    let events = drain(&mut rx);
    let messages = notices(&events);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("available students"));
}

#[tokio::test]
async fn refresh_failure_keeps_previous_roster() {
    let (gateway, controller) = loaded_controller().await;
    let before = controller.state().await;
    let mut rx = controller.subscribe_events();
    *gateway.fail_enrolled.lock().expect("lock") =
        Some(GatewayError::Transport("connection reset".into()));

    let outcome = controller.refresh().await.expect("refresh");

    assert_eq!(outcome, LoadOutcome::Applied(before.clone()));
    assert_eq!(controller.state().await, before);
    assert_eq!(notices(&drain(&mut rx)).len(), 1);
}

#[tokio::test]
async fn late_response_for_previous_subject_is_discarded() {
    let (gateway, controller) = controller();
    let release = Arc::new(Notify::new());
    *gateway.hold_subject.lock().expect("lock") = Some((ALGEBRA, Arc::clone(&release)));

    let (first, second) = tokio::join!(controller.load(ALGEBRA), async {
        let outcome = controller.load(BIOLOGY).await;
        release.notify_one();
        outcome
    });

    assert_eq!(first, LoadOutcome::Superseded);
    assert!(matches!(
        second,
        LoadOutcome::Applied(RosterState::Loaded(_))
    ));
    assert_eq!(controller.subject_id().await, Some(BIOLOGY));
    let RosterState::Loaded(view) = controller.state().await else {
        panic!("expected loaded roster");
    };
    assert_eq!(view.subject.name, "Biology");
    assert!(view.students.is_empty());
}

#[tokio::test]
async fn editor_from_previous_subject_is_rejected() {
    let (gateway, controller) = loaded_controller().await;
    let mut editor = controller.open_editor().await.expect("editor");
    controller.load(BIOLOGY).await;

    let err = controller
        .add_student(&mut editor, CAROL)
        .await
        .expect_err("stale editor");

    assert!(matches!(
        err,
        RosterError::StaleEditor {
            editor: ALGEBRA,
            current: BIOLOGY
        }
    ));
    assert!(gateway.writes().is_empty());
}

#[tokio::test]
async fn filtered_out_student_cannot_be_added() {
    let (gateway, controller) = loaded_controller().await;
    let mut editor = controller.open_editor().await.expect("editor");
    editor.set_search("ca");

    let err = controller
        .add_student(&mut editor, DAVE)
        .await
        .expect_err("dave is filtered out");

    assert!(matches!(err, RosterError::NotACandidate(DAVE)));
    assert!(gateway.writes().is_empty());
}

#[tokio::test]
async fn closed_editor_cannot_add() {
    let (gateway, controller) = loaded_controller().await;
    let mut editor = controller.open_editor().await.expect("editor");
    editor.close();

    let err = controller
        .add_student(&mut editor, CAROL)
        .await
        .expect_err("closed");
    assert!(matches!(err, RosterError::EditorClosed));
    assert!(gateway.writes().is_empty());
}

#[tokio::test]
async fn reopening_editor_fetches_a_new_available_set() {
    let (gateway, controller) = loaded_controller().await;
    let mut editor = controller.open_editor().await.expect("editor");
    controller
        .add_student(&mut editor, CAROL)
        .await
        .expect("add carol");

    let reopened = controller.open_editor().await.expect("editor");

    assert_eq!(gateway.count(|c| matches!(c, Call::GetAvailable(_))), 2);
    let names: Vec<&str> = reopened.snapshot().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Dave"]);
}

#[tokio::test]
async fn removing_student_off_roster_does_not_prompt() {
    let (gateway, controller) = loaded_controller().await;
    let gate = ScriptedGate::answering(true);

    let err = controller
        .remove_student(CAROL, &gate)
        .await
        .expect_err("carol is not enrolled");

    assert!(matches!(err, RosterError::NotOnRoster(CAROL)));
    assert!(gate.prompts().is_empty());
    assert!(gateway.writes().is_empty());
}

#[tokio::test]
async fn gate_failure_blocks_removal() {
    let (gateway, controller) = loaded_controller().await;

    let err = controller
        .remove_student(ALICE, &BrokenGate)
        .await
        .expect_err("gate failed");

    assert!(matches!(err, RosterError::Confirmation { .. }));
    assert!(gateway.writes().is_empty());
    assert_eq!(roster_names(&controller).await, ["Alice", "Bob"]);
}

#[tokio::test]
async fn operations_before_any_load_report_no_subject() {
    let (gateway, controller) = controller();
    assert!(matches!(
        controller.open_editor().await,
        Err(RosterError::NoSubject)
    ));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn add_finishing_after_navigation_does_not_pull_view_back() {
    let (gateway, controller) = loaded_controller().await;
    let mut editor = controller.open_editor().await.expect("editor");
    let release = Arc::new(Notify::new());
    *gateway.hold_writes.lock().expect("lock") = Some(Arc::clone(&release));

    let (added, navigated) = tokio::join!(controller.add_student(&mut editor, CAROL), async {
        let outcome = controller.load(BIOLOGY).await;
        release.notify_one();
        outcome
    });

    added.expect("add succeeds on the server");
    assert!(matches!(
        navigated,
        LoadOutcome::Applied(RosterState::Loaded(_))
    ));
    assert_eq!(controller.subject_id().await, Some(BIOLOGY));
    let RosterState::Loaded(view) = controller.state().await else {
        panic!("expected loaded roster");
    };
    assert_eq!(view.subject.name, "Biology");
    assert_eq!(
        gateway.count(|c| matches!(c, Call::GetEnrolled(ALGEBRA))),
        1
    );
}

#[tokio::test]
async fn removal_finishing_after_navigation_does_not_pull_view_back() {
    let (gateway, controller) = loaded_controller().await;
    let release = Arc::new(Notify::new());
    *gateway.hold_writes.lock().expect("lock") = Some(Arc::clone(&release));

    let (removed, _) = tokio::join!(controller.remove_student(BOB, &AutoConfirm), async {
        controller.load(BIOLOGY).await;
        release.notify_one();
    });

    assert_eq!(removed.expect("removal succeeds"), RemoveOutcome::Removed);
    assert_eq!(controller.subject_id().await, Some(BIOLOGY));
    let RosterState::Loaded(view) = controller.state().await else {
        panic!("expected loaded roster");
    };
    assert_eq!(view.subject.name, "Biology");
    assert_eq!(
        gateway.count(|c| matches!(c, Call::GetEnrolled(ALGEBRA))),
        1
    );
}
