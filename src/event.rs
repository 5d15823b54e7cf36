//! Structured events emitted by the engine after every committed transition.
//!
//! Sinks turn these into emails, in-app notifications or audit rows. The
//! engine only describes what happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Action, Status, Task, TaskId, UserId};

/// A task changed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    pub task_id: TaskId,
    pub from_status: Status,
    pub to_status: Status,
    pub action: Action,
    pub actor_id: UserId,
    pub timestamp: DateTime<Utc>,
}

impl StatusChangeEvent {
    /// Describe the step from `before` to `after`, taken by `actor` via `action`.
    pub fn between(before: &Task, after: &Task, action: Action, actor: &UserId) -> Self {
        Self {
            task_id: after.id.clone(),
            from_status: before.status,
            to_status: after.status,
            action,
            actor_id: actor.clone(),
            timestamp: after.updated_at,
        }
    }
}
