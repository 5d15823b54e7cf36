//! The task workflow engine: visibility, transitions, and projections.
//!
//! Holds no state between calls. Every write is one snapshot read, one pure
//! [`plan`](super::transition::plan), and one version-checked save.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, warn};

use super::escalation::{self, Escalation};
use super::transition::{self, plan};
use super::visibility::{is_visible, scope_for};
use crate::error::{Error, Result};
use crate::event::StatusChangeEvent;
use crate::model::{Action, NewTask, ObservationStatus, Role, Status, Task, TaskId, User};
use crate::notify::NotificationSink;
use crate::repository::TaskRepository;
use crate::telemetry::metrics;
use crate::telemetry::task::{record_transition, start_transition_span};

pub struct TaskWorkflowEngine {
    repo: Arc<dyn TaskRepository>,
    sink: Arc<dyn NotificationSink>,
}

impl Clone for TaskWorkflowEngine {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl TaskWorkflowEngine {
    pub fn new(repo: Arc<dyn TaskRepository>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { repo, sink }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Every task `user` is allowed to see.
    pub async fn list_visible_tasks(&self, user: &User) -> Result<Vec<Task>> {
        self.query_visible(user, None).await
    }

    /// Visible tasks in one status.
    pub async fn list_visible_tasks_in(&self, user: &User, status: Status) -> Result<Vec<Task>> {
        self.query_visible(user, Some(status)).await
    }

    async fn query_visible(&self, user: &User, status: Option<Status>) -> Result<Vec<Task>> {
        let mut filter = scope_for(user);
        filter.status = status;
        let tasks = self.repo.query(&filter).await?;
        // Visibility holds even if a repository ignores the scope.
        Ok(tasks.into_iter().filter(|t| is_visible(user, t)).collect())
    }

    /// One task, if `user` may see it. Invisible tasks read as not found.
    pub async fn get_visible_task(&self, user: &User, id: &TaskId) -> Result<Task> {
        let task = self.repo.get_by_id(id).await?;
        if !is_visible(user, &task) {
            return Err(Error::NotFound(format!("task {id}")));
        }
        Ok(task)
    }

    /// Count of visible tasks per status. Every status is present, zero or not.
    pub async fn status_summary(&self, user: &User) -> Result<BTreeMap<Status, usize>> {
        let mut counts: BTreeMap<Status, usize> = Status::ALL.iter().map(|s| (*s, 0)).collect();
        for task in self.list_visible_tasks(user).await? {
            *counts.entry(task.status).or_default() += 1;
        }
        Ok(counts)
    }

    /// Visible tasks that are overdue or rejected, most overdue first.
    pub async fn escalations(&self, user: &User, now: DateTime<Utc>) -> Result<Vec<Escalation>> {
        let tasks = self.list_visible_tasks(user).await?;
        Ok(escalation::escalations(&tasks, now))
    }

    /// Actions `user` may attempt on `task` in its current state.
    pub fn available_actions(&self, user: &User, task: &Task) -> Vec<Action> {
        if !is_visible(user, task) {
            return Vec::new();
        }
        transition::available_actions(task, user)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Create a `pending` task. Admin only.
    pub async fn create_task(&self, admin: &User, new: NewTask) -> Result<Task> {
        ensure_admin(admin)?;
        new.validate()?;

        let task = self.repo.insert(&new.into_task(Utc::now())).await?;
        metrics::tasks_created().add(1, &[KeyValue::new("source", "admin")]);
        debug!(task_id = %task.id, "task created");
        Ok(task)
    }

    /// Create a batch of `pending` tasks. Admin only.
    ///
    /// Every entry is validated first and the batch is stored in one step,
    /// so a failure creates nothing.
    pub async fn import_tasks(&self, admin: &User, batch: Vec<NewTask>) -> Result<Vec<Task>> {
        ensure_admin(admin)?;
        for (i, new) in batch.iter().enumerate() {
            new.validate().map_err(|e| match e {
                Error::Validation(msg) => Error::Validation(format!("task #{}: {msg}", i + 1)),
                other => other,
            })?;
        }

        let now = Utc::now();
        let tasks: Vec<Task> = batch.into_iter().map(|new| new.into_task(now)).collect();
        let created = self.repo.insert_all(&tasks).await?;
        metrics::tasks_created().add(created.len() as u64, &[KeyValue::new("source", "import")]);
        debug!(count = created.len(), "tasks imported");
        Ok(created)
    }

    /// Fetch the task and apply `action` on behalf of `user`.
    pub async fn apply_transition(
        &self,
        user: &User,
        task_id: &TaskId,
        action: Action,
        comment: Option<&str>,
    ) -> Result<Task> {
        self.transition(user, task_id, None, action, comment).await
    }

    /// Apply `action` to a task the caller already holds a snapshot of.
    ///
    /// Only `snapshot.id` and `snapshot.version` are taken from the caller.
    /// The rules run against the stored task, and if it has moved past
    /// `snapshot.version` the call fails with `Error::ConcurrentModification`
    /// and nothing is written.
    pub async fn transition_snapshot(
        &self,
        user: &User,
        snapshot: &Task,
        action: Action,
        comment: Option<&str>,
    ) -> Result<Task> {
        self.transition(user, &snapshot.id, Some(snapshot.version), action, comment)
            .await
    }

    async fn transition(
        &self,
        user: &User,
        task_id: &TaskId,
        expected_version: Option<i64>,
        action: Action,
        comment: Option<&str>,
    ) -> Result<Task> {
        let span = start_transition_span(task_id, action, &user.id);
        async {
            let started = Instant::now();
            let result = self
                .commit_transition(user, task_id, expected_version, action, comment)
                .await;
            metrics::operation_duration_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("operation", "task.transition")],
            );

            match result {
                Ok((before, saved)) => {
                    record_transition(&tracing::Span::current(), before.status, saved.status);
                    metrics::task_transitions().add(
                        1,
                        &[
                            KeyValue::new("from", before.status.as_str()),
                            KeyValue::new("to", saved.status.as_str()),
                            KeyValue::new("action", action.as_str()),
                        ],
                    );
                    self.notify(StatusChangeEvent::between(&before, &saved, action, &user.id))
                        .await;
                    Ok(saved)
                }
                Err(e) => {
                    record_rejection(action, &e);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Returns the stored task as it was before the change, and as saved.
    async fn commit_transition(
        &self,
        user: &User,
        task_id: &TaskId,
        expected_version: Option<i64>,
        action: Action,
        comment: Option<&str>,
    ) -> Result<(Task, Task)> {
        let stored = self.get_visible_task(user, task_id).await?;
        let expected = expected_version.unwrap_or(stored.version);
        if stored.version != expected {
            return Err(Error::ConcurrentModification {
                task_id: task_id.clone(),
                expected,
            });
        }
        let next = plan(&stored, user, action, comment, Utc::now())?;
        let saved = self.repo.save(&next, expected).await?;
        Ok((stored, saved))
    }

    /// Set the observation status. Maker only, while the maker owns the task.
    ///
    /// This is a field edit, not a status change, so no event is emitted.
    pub async fn set_observation_status(
        &self,
        user: &User,
        task_id: &TaskId,
        observation: ObservationStatus,
    ) -> Result<Task> {
        let snapshot = self.get_visible_task(user, task_id).await?;
        if !(user.has_role(Role::Maker) && snapshot.assigned_to == user.id) {
            return Err(Error::Validation(format!(
                "only the assigned maker can set the observation status of task {task_id}"
            )));
        }
        if !snapshot.status.is_editable() {
            return Err(Error::Validation(format!(
                "task {task_id} is {} and can no longer be edited",
                snapshot.status
            )));
        }

        let mut next = snapshot.clone();
        next.observation_status = Some(observation);
        next.updated_at = Utc::now();
        self.repo.save(&next, snapshot.version).await
    }

    async fn notify(&self, event: StatusChangeEvent) {
        if let Err(e) = self.sink.publish(&event).await {
            metrics::notification_failures().add(1, &[]);
            warn!(task_id = %event.task_id, error = %e, "notification sink rejected event");
        }
    }
}

fn ensure_admin(user: &User) -> Result<()> {
    if !user.has_role(Role::Admin) {
        return Err(Error::Validation(format!(
            "user {} is not an admin and cannot create tasks",
            user.id
        )));
    }
    Ok(())
}

fn record_rejection(action: Action, error: &Error) {
    metrics::transitions_rejected().add(
        1,
        &[
            KeyValue::new("action", action.as_str()),
            KeyValue::new("reason", error.kind()),
        ],
    );
    debug!(action = %action, error = %error, "transition refused");
}
