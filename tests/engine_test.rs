//! Integration tests for the task workflow engine over the in-memory repository.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use audit_tracker::engine::TaskWorkflowEngine;
use audit_tracker::error::{Error, Result};
use audit_tracker::event::StatusChangeEvent;
use audit_tracker::model::*;
use audit_tracker::notify::NotificationSink;
use audit_tracker::repository::{MemoryTaskRepository, TaskRepository};
use chrono::{NaiveDate, TimeZone, Utc};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<StatusChangeEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<StatusChangeEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl NotificationSink for FailingSink {
    async fn publish(&self, _event: &StatusChangeEvent) -> Result<()> {
        Err(Error::Other("mail server down".to_string()))
    }
}

struct Fixture {
    engine: TaskWorkflowEngine,
    repo: Arc<MemoryTaskRepository>,
    sink: Arc<RecordingSink>,
    admin: User,
    maker: User,
    checker1: User,
    checker2: User,
}

fn user(id: &str, role: Role) -> User {
    User::new(id, id, format!("{id}@example.com"), role, []).unwrap()
}

fn fixture() -> Fixture {
    let repo = Arc::new(MemoryTaskRepository::new());
    let sink = Arc::new(RecordingSink::default());
    Fixture {
        engine: TaskWorkflowEngine::new(repo.clone(), sink.clone()),
        repo,
        sink,
        admin: user("admin", Role::Admin),
        maker: user("maker", Role::Maker),
        checker1: user("checker1", Role::Checker1),
        checker2: user("checker2", Role::Checker2),
    }
}

fn due() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()
}

impl Fixture {
    async fn pending_task(&self) -> Task {
        self.engine
            .create_task(
                &self.admin,
                NewTask::new("Petty cash count", due(), "maker", "checker1", "checker2")
                    .category("cash")
                    .priority(Priority::High)
                    .frequency(Frequency::Monthly)
                    .recurring(true),
            )
            .await
            .unwrap()
    }

    /// Store `task` with a new status, bypassing the engine.
    async fn force_status(&self, task: &Task, status: Status) -> Task {
        let current = self.repo.get_by_id(&task.id).await.unwrap();
        let mut forced = current.clone();
        forced.status = status;
        forced.observation_status = Some(ObservationStatus::No);
        self.repo.save(&forced, current.version).await.unwrap()
    }

    async fn stored(&self, id: &TaskId) -> Task {
        self.repo.get_by_id(id).await.unwrap()
    }

    fn actor(&self, role: Role) -> &User {
        match role {
            Role::Admin => &self.admin,
            Role::Maker => &self.maker,
            Role::Checker1 => &self.checker1,
            Role::Checker2 => &self.checker2,
        }
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_task_starts_pending() {
    let f = fixture();
    let task = f.pending_task().await;

    assert_eq!(task.status, Status::Pending);
    assert_eq!(task.observation_status, None);
    assert_eq!(task.submitted_at, None);
    assert!(task.comments.is_empty());
    assert_eq!(f.repo.len().await, 1);
}

#[tokio::test]
async fn only_admin_creates_tasks() {
    let f = fixture();
    let result = f
        .engine
        .create_task(
            &f.maker,
            NewTask::new("Sneaky", due(), "maker", "checker1", "checker2"),
        )
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(f.repo.is_empty().await);
}

#[tokio::test]
async fn assignees_must_be_distinct() {
    let f = fixture();
    let result = f
        .engine
        .create_task(
            &f.admin,
            NewTask::new("Self check", due(), "maker", "maker", "checker2"),
        )
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_then_submit_keeps_assignments() {
    let f = fixture();
    let task = f.pending_task().await;

    let started = f
        .engine
        .apply_transition(&f.maker, &task.id, Action::Start, None)
        .await
        .unwrap();
    assert_eq!(started.status, Status::InProgress);

    f.engine
        .set_observation_status(&f.maker, &task.id, ObservationStatus::Yes)
        .await
        .unwrap();
    let submitted = f
        .engine
        .apply_transition(&f.maker, &task.id, Action::Submit, None)
        .await
        .unwrap();

    assert_eq!(submitted.status, Status::Submitted);
    assert_eq!(submitted.assignees(), task.assignees());
    assert_eq!(submitted.submitted_at, Some(submitted.updated_at));
}

#[tokio::test]
async fn full_chain_reaches_approved_and_emits_events() {
    let f = fixture();
    let task = f.pending_task().await;
    let id = &task.id;

    f.engine
        .apply_transition(&f.maker, id, Action::Start, None)
        .await
        .unwrap();
    f.engine
        .set_observation_status(&f.maker, id, ObservationStatus::Mixed)
        .await
        .unwrap();
    f.engine
        .apply_transition(&f.maker, id, Action::Submit, Some("evidence uploaded"))
        .await
        .unwrap();
    f.engine
        .apply_transition(&f.checker1, id, Action::Checker1Approve, None)
        .await
        .unwrap();
    let approved = f
        .engine
        .apply_transition(&f.checker2, id, Action::Checker2Approve, Some("ok"))
        .await
        .unwrap();

    assert_eq!(approved.status, Status::Approved);
    assert_eq!(approved.comments.len(), 2);
    assert_eq!(approved.comments[0].author_id, f.maker.id);
    assert_eq!(approved.comments[1].author_id, f.checker2.id);

    let events = f.sink.events();
    let steps: Vec<(Status, Status)> = events.iter().map(|e| (e.from_status, e.to_status)).collect();
    assert_eq!(
        steps,
        vec![
            (Status::Pending, Status::InProgress),
            (Status::InProgress, Status::Submitted),
            (Status::Submitted, Status::Checker1Approved),
            (Status::Checker1Approved, Status::Approved),
        ]
    );
    assert_eq!(events[3].actor_id, f.checker2.id);
    assert_eq!(events[3].task_id, task.id);

    // Approved is terminal.
    for actor in [&f.maker, &f.checker1, &f.checker2, &f.admin] {
        assert!(f.engine.available_actions(actor, &approved).is_empty());
    }
}

// ---------------------------------------------------------------------------
// Submit preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_without_observation_is_validation_error() {
    let f = fixture();
    let task = f.pending_task().await;

    let result = f
        .engine
        .apply_transition(&f.maker, &task.id, Action::Submit, Some("done"))
        .await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(f.stored(&task.id).await, task, "nothing may change");
    assert!(f.sink.events().is_empty());
}

#[tokio::test]
async fn submit_succeeds_with_any_observation() {
    let f = fixture();
    for observation in [
        ObservationStatus::Yes,
        ObservationStatus::No,
        ObservationStatus::Mixed,
    ] {
        let task = f.pending_task().await;
        f.engine
            .set_observation_status(&f.maker, &task.id, observation)
            .await
            .unwrap();
        let submitted = f
            .engine
            .apply_transition(&f.maker, &task.id, Action::Submit, None)
            .await
            .unwrap();
        assert_eq!(submitted.status, Status::Submitted);
        assert_eq!(submitted.observation_status, Some(observation));
    }
}

#[tokio::test]
async fn observation_status_is_maker_only_and_locked_after_submit() {
    let f = fixture();
    let task = f.pending_task().await;

    let by_checker = f
        .engine
        .set_observation_status(&f.checker1, &task.id, ObservationStatus::Yes)
        .await;
    assert!(matches!(by_checker, Err(Error::Validation(_))));

    f.force_status(&task, Status::Submitted).await;
    let after_submit = f
        .engine
        .set_observation_status(&f.maker, &task.id, ObservationStatus::Yes)
        .await;
    assert!(matches!(after_submit, Err(Error::Validation(_))));
}

// ---------------------------------------------------------------------------
// Illegal transitions
// ---------------------------------------------------------------------------

/// Every (from, action, role) the workflow allows.
const LEGAL: &[(Status, Action, Role)] = &[
    (Status::Pending, Action::Start, Role::Maker),
    (Status::InProgress, Action::Start, Role::Maker),
    (Status::Rejected, Action::Start, Role::Maker),
    (Status::Pending, Action::Submit, Role::Maker),
    (Status::InProgress, Action::Submit, Role::Maker),
    (Status::Rejected, Action::Submit, Role::Maker),
    (Status::Submitted, Action::Checker1Approve, Role::Checker1),
    (Status::Submitted, Action::Reject, Role::Checker1),
    (Status::Checker1Approved, Action::Checker2Approve, Role::Checker2),
    (Status::Checker1Approved, Action::Reject, Role::Checker2),
];

#[tokio::test]
async fn every_triple_outside_the_table_is_refused_without_mutation() {
    let f = fixture();
    let mut refused = 0;

    for status in Status::ALL {
        let task = f.pending_task().await;
        let snapshot = f.force_status(&task, status).await;

        for action in Action::ALL {
            for role in Role::ALL {
                if LEGAL.contains(&(status, action, role)) {
                    continue;
                }
                let result = f
                    .engine
                    .apply_transition(f.actor(role), &task.id, action, Some("note"))
                    .await;
                assert!(
                    matches!(result, Err(Error::InvalidTransition { .. })),
                    "{role} {action} from {status} should be invalid, got {result:?}"
                );
                assert_eq!(f.stored(&task.id).await, snapshot);
                refused += 1;
            }
        }
    }

    assert_eq!(refused, 6 * 5 * 4 - LEGAL.len());
    assert!(f.sink.events().is_empty());
}

#[tokio::test]
async fn every_legal_triple_succeeds() {
    let f = fixture();
    for &(status, action, role) in LEGAL {
        let task = f.pending_task().await;
        f.force_status(&task, status).await;
        let result = f
            .engine
            .apply_transition(f.actor(role), &task.id, action, None)
            .await;
        assert!(result.is_ok(), "{role} {action} from {status}: {result:?}");
    }
}

#[tokio::test]
async fn checker2_cannot_approve_before_checker1() {
    let f = fixture();
    let task = f.pending_task().await;
    f.force_status(&task, Status::Submitted).await;

    let result = f
        .engine
        .apply_transition(&f.checker2, &task.id, Action::Checker2Approve, None)
        .await;

    match result {
        Err(Error::InvalidTransition { from, action, .. }) => {
            assert_eq!(from, Status::Submitted);
            assert_eq!(action, Action::Checker2Approve);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[tokio::test]
async fn other_maker_cannot_see_or_act() {
    let f = fixture();
    let task = f.pending_task().await;
    let stranger = user("other-maker", Role::Maker);

    let result = f
        .engine
        .apply_transition(&stranger, &task.id, Action::Start, None)
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(f.stored(&task.id).await, task);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let f = fixture();
    let result = f
        .engine
        .apply_transition(&f.maker, &TaskId::from("missing"), Action::Start, None)
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn blank_comment_is_refused() {
    let f = fixture();
    let task = f.pending_task().await;
    let result = f
        .engine
        .apply_transition(&f.maker, &task.id, Action::Start, Some("  \n "))
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(f.stored(&task.id).await, task);
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timestamps_follow_transitions() {
    let f = fixture();
    let task = f.pending_task().await;

    // Backdate so every later stamp is visibly newer.
    let long_ago = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let mut old = f.stored(&task.id).await;
    old.updated_at = long_ago;
    old.observation_status = Some(ObservationStatus::No);
    f.repo.save(&old, old.version).await.unwrap();

    let started = f
        .engine
        .apply_transition(&f.maker, &task.id, Action::Start, None)
        .await
        .unwrap();
    assert!(started.updated_at > long_ago);
    assert_eq!(started.submitted_at, None);

    let submitted = f
        .engine
        .apply_transition(&f.maker, &task.id, Action::Submit, None)
        .await
        .unwrap();
    let submitted_at = submitted.submitted_at.expect("submit stamps submitted_at");
    assert_eq!(submitted_at, submitted.updated_at);

    let approved = f
        .engine
        .apply_transition(&f.checker1, &task.id, Action::Checker1Approve, None)
        .await
        .unwrap();
    assert_eq!(approved.submitted_at, Some(submitted_at));
    assert!(approved.updated_at >= submitted.updated_at);
}

// ---------------------------------------------------------------------------
// Reject / resubmit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reject_and_resubmit_cycle() {
    let f = fixture();
    let task = f.pending_task().await;
    let id = &task.id;

    f.engine
        .set_observation_status(&f.maker, id, ObservationStatus::Yes)
        .await
        .unwrap();
    f.engine
        .apply_transition(&f.maker, id, Action::Submit, Some("first pass"))
        .await
        .unwrap();

    let rejected = f
        .engine
        .apply_transition(&f.checker1, id, Action::Reject, Some("sample size too small"))
        .await
        .unwrap();
    assert_eq!(rejected.status, Status::Rejected);

    let restarted = f
        .engine
        .apply_transition(&f.maker, id, Action::Start, None)
        .await
        .unwrap();
    assert_eq!(restarted.status, Status::InProgress);

    f.engine
        .set_observation_status(&f.maker, id, ObservationStatus::No)
        .await
        .unwrap();
    let resubmitted = f
        .engine
        .apply_transition(&f.maker, id, Action::Submit, Some("resampled"))
        .await
        .unwrap();

    assert_eq!(resubmitted.status, Status::Submitted);
    assert_eq!(resubmitted.observation_status, Some(ObservationStatus::No));
    let texts: Vec<&str> = resubmitted.comments.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["first pass", "sample size too small", "resampled"]);
    assert_eq!(resubmitted.comments[1].author_id, f.checker1.id);
    assert!(resubmitted.submitted_at > rejected.submitted_at);
    assert_eq!(resubmitted.assignees(), task.assignees());
}

#[tokio::test]
async fn checker2_rejection_returns_to_maker() {
    let f = fixture();
    let task = f.pending_task().await;
    f.force_status(&task, Status::Checker1Approved).await;

    let rejected = f
        .engine
        .apply_transition(&f.checker2, &task.id, Action::Reject, Some("missing sign-off"))
        .await
        .unwrap();
    assert_eq!(rejected.status, Status::Rejected);
    assert_eq!(
        f.engine.available_actions(&f.maker, &rejected),
        vec![Action::Start, Action::Submit]
    );
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_snapshot_loses_the_race() {
    let f = fixture();
    let task = f.pending_task().await;
    let snapshot = f.force_status(&task, Status::Submitted).await;

    let (approve, reject) = tokio::join!(
        f.engine
            .transition_snapshot(&f.checker1, &snapshot, Action::Checker1Approve, None),
        f.engine
            .transition_snapshot(&f.checker1, &snapshot, Action::Reject, Some("no")),
    );

    let outcomes = [approve, reject];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one transition may commit: {outcomes:?}");
    let loser = outcomes.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, Error::ConcurrentModification { .. }));
    assert!(loser.is_retryable());

    let stored = f.stored(&task.id).await;
    assert_eq!(stored.version, snapshot.version + 1);
    assert_eq!(f.sink.events().len(), 1);
}

#[tokio::test]
async fn retry_with_fresh_snapshot_sees_new_state() {
    let f = fixture();
    let task = f.pending_task().await;
    let stale = f.stored(&task.id).await;

    f.engine
        .apply_transition(&f.maker, &task.id, Action::Start, None)
        .await
        .unwrap();

    let err = f
        .engine
        .transition_snapshot(&f.maker, &stale, Action::Start, None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let fresh = f.stored(&task.id).await;
    let again = f
        .engine
        .transition_snapshot(&f.maker, &fresh, Action::Start, None)
        .await
        .unwrap();
    assert_eq!(again.status, Status::InProgress);
}

#[tokio::test]
async fn edited_assignees_in_snapshot_grant_nothing() {
    let f = fixture();
    let task = f.pending_task().await;
    let outsider = user("eve", Role::Checker2);

    let mut edited = f.stored(&task.id).await;
    edited.checker2 = outsider.id.clone();
    edited.status = Status::Checker1Approved;

    let err = f
        .engine
        .transition_snapshot(&outsider, &edited, Action::Checker2Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");

    let stored = f.stored(&task.id).await;
    assert_eq!(stored.status, Status::Pending);
    assert_eq!(stored.checker2, f.checker2.id);
    assert_eq!(stored.version, task.version);
    assert!(f.sink.events().is_empty());
}

#[tokio::test]
async fn snapshot_status_is_not_trusted() {
    let f = fixture();
    let task = f.pending_task().await;

    // The real checker1, handing in a copy that claims the task was submitted.
    let mut edited = f.stored(&task.id).await;
    edited.status = Status::Submitted;

    let err = f
        .engine
        .transition_snapshot(&f.checker1, &edited, Action::Checker1Approve, None)
        .await
        .unwrap_err();
    match err {
        Error::InvalidTransition { from, action, .. } => {
            assert_eq!(from, Status::Pending);
            assert_eq!(action, Action::Checker1Approve);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
    assert_eq!(f.stored(&task.id).await.status, Status::Pending);
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sink_failure_does_not_undo_transition() {
    let repo = Arc::new(MemoryTaskRepository::new());
    let engine = TaskWorkflowEngine::new(repo.clone(), Arc::new(FailingSink));
    let admin = user("admin", Role::Admin);
    let maker = user("maker", Role::Maker);

    let task = engine
        .create_task(
            &admin,
            NewTask::new("Key register", due(), "maker", "checker1", "checker2"),
        )
        .await
        .unwrap();
    let started = engine
        .apply_transition(&maker, &task.id, Action::Start, None)
        .await
        .unwrap();

    assert_eq!(started.status, Status::InProgress);
    assert_eq!(
        repo.get_by_id(&task.id).await.unwrap().status,
        Status::InProgress
    );
}

#[tokio::test]
async fn channel_sink_delivers_to_subscribers() {
    let repo = Arc::new(MemoryTaskRepository::new());
    let sink = audit_tracker::notify::ChannelSink::new(16);
    let mut rx = sink.subscribe();
    let engine = TaskWorkflowEngine::new(repo, Arc::new(sink));

    let task = engine
        .create_task(
            &user("admin", Role::Admin),
            NewTask::new("Locker audit", due(), "maker", "checker1", "checker2"),
        )
        .await
        .unwrap();
    engine
        .apply_transition(&user("maker", Role::Maker), &task.id, Action::Start, None)
        .await
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.task_id, task.id);
    assert_eq!(event.action, Action::Start);
    assert_eq!(event.to_status, Status::InProgress);
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_summary_counts_visible_tasks() {
    let f = fixture();
    let a = f.pending_task().await;
    let b = f.pending_task().await;
    f.pending_task().await;
    f.force_status(&a, Status::Submitted).await;
    f.force_status(&b, Status::Approved).await;

    let summary = f.engine.status_summary(&f.admin).await.unwrap();
    assert_eq!(summary.len(), Status::ALL.len());
    assert_eq!(summary[&Status::Pending], 1);
    assert_eq!(summary[&Status::Submitted], 1);
    assert_eq!(summary[&Status::Approved], 1);
    assert_eq!(summary[&Status::Rejected], 0);

    let outsider = user("nobody", Role::Checker2);
    let empty = f.engine.status_summary(&outsider).await.unwrap();
    assert!(empty.values().all(|n| *n == 0));
}

#[tokio::test]
async fn escalations_surface_overdue_and_rejected() {
    let f = fixture();
    let overdue = f
        .engine
        .create_task(
            &f.admin,
            NewTask::new(
                "Late reconciliation",
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                "maker",
                "checker1",
                "checker2",
            ),
        )
        .await
        .unwrap();
    let rejected = f.pending_task().await;
    f.force_status(&rejected, Status::Rejected).await;
    f.pending_task().await;

    let now = Utc.with_ymd_and_hms(2026, 1, 11, 12, 0, 0).unwrap();
    let escalations = f.engine.escalations(&f.checker2, now).await.unwrap();

    assert_eq!(escalations.len(), 2);
    assert_eq!(escalations[0].task.id, overdue.id);
    assert_eq!(escalations[0].days_overdue, 10);
    assert_eq!(escalations[1].task.id, rejected.id);
}

// ---------------------------------------------------------------------------
// Bulk import
// ---------------------------------------------------------------------------

#[tokio::test]
async fn import_creates_every_task_in_the_batch() {
    let f = fixture();
    let batch = vec![
        NewTask::new("Vault audit", due(), "maker", "checker1", "checker2"),
        NewTask::new("Key register review", due(), "maker", "checker1", "checker2"),
    ];
    let created = f.engine.import_tasks(&f.admin, batch).await.unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|t| t.status == Status::Pending && t.version == 0));
    assert_eq!(f.repo.len().await, 2);
}

#[tokio::test]
async fn import_with_one_bad_entry_creates_nothing() {
    let f = fixture();
    let batch = vec![
        NewTask::new("Vault audit", due(), "maker", "checker1", "checker2"),
        NewTask::new("Self review", due(), "maker", "maker", "checker2"),
    ];
    let err = f.engine.import_tasks(&f.admin, batch).await.unwrap_err();
    match err {
        Error::Validation(msg) => assert!(msg.starts_with("task #2"), "{msg}"),
        other => panic!("expected Validation, got {other:?}"),
    }
    assert!(f.repo.is_empty().await);
}

#[tokio::test]
async fn import_is_admin_only() {
    let f = fixture();
    let batch = vec![NewTask::new("Vault audit", due(), "maker", "checker1", "checker2")];
    let err = f.engine.import_tasks(&f.maker, batch).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(f.repo.is_empty().await);
}
