//! The task state machine.
//!
//! [`TRANSITIONS`] is the only place a status change is declared legal.
//! [`plan`] turns a snapshot plus a request into the next snapshot without
//! touching storage, so a failed request never leaves anything half-applied.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::visibility::holds;
use crate::error::{Error, Result};
use crate::model::{Action, Comment, Role, Status, Task, User};

/// One legal edge of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: &'static [Status],
    pub action: Action,
    /// Role the actor must hold, and whose slot on the task they must occupy.
    pub actor: Role,
    pub to: Status,
}

const MAKER_OWNED: &[Status] = &[Status::Pending, Status::InProgress, Status::Rejected];

pub const TRANSITIONS: &[Edge] = &[
    Edge {
        from: MAKER_OWNED,
        action: Action::Start,
        actor: Role::Maker,
        to: Status::InProgress,
    },
    Edge {
        from: MAKER_OWNED,
        action: Action::Submit,
        actor: Role::Maker,
        to: Status::Submitted,
    },
    Edge {
        from: &[Status::Submitted],
        action: Action::Checker1Approve,
        actor: Role::Checker1,
        to: Status::Checker1Approved,
    },
    Edge {
        from: &[Status::Submitted],
        action: Action::Reject,
        actor: Role::Checker1,
        to: Status::Rejected,
    },
    Edge {
        from: &[Status::Checker1Approved],
        action: Action::Checker2Approve,
        actor: Role::Checker2,
        to: Status::Approved,
    },
    Edge {
        from: &[Status::Checker1Approved],
        action: Action::Reject,
        actor: Role::Checker2,
        to: Status::Rejected,
    },
];

/// Look up the edge leaving `from` via `action` for an actor in `role`.
pub fn edge(from: Status, action: Action, role: Role) -> Option<&'static Edge> {
    TRANSITIONS
        .iter()
        .find(|e| e.action == action && e.actor == role && e.from.contains(&from))
}

/// The edge `user` may take on `task` via `action`, if any.
fn permitted_edge(task: &Task, user: &User, action: Action) -> Option<&'static Edge> {
    TRANSITIONS.iter().find(|e| {
        e.action == action
            && e.from.contains(&task.status)
            && user.has_role(e.actor)
            && holds(task, user, e.actor)
    })
}

/// Actions `user` could take on `task` right now, in table order.
///
/// Preconditions such as the observation status are not checked here.
pub fn available_actions(task: &Task, user: &User) -> Vec<Action> {
    let mut actions = Vec::new();
    for action in Action::ALL {
        if permitted_edge(task, user, action).is_some() && !actions.contains(&action) {
            actions.push(action);
        }
    }
    actions
}

/// Compute the snapshot that results from `user` applying `action` to `task`.
///
/// Checks run in order: edge exists for this actor, then action
/// preconditions, then the comment. The returned task keeps the input's
/// version; the repository bumps it on save.
pub fn plan(
    task: &Task,
    user: &User,
    action: Action,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Task> {
    let edge = permitted_edge(task, user, action).ok_or_else(|| Error::InvalidTransition {
        task_id: task.id.clone(),
        from: task.status,
        action,
        actor: user.id.clone(),
    })?;

    if action == Action::Submit && task.observation_status.is_none() {
        return Err(Error::Validation(
            "observation status must be set before submitting".to_string(),
        ));
    }

    let comment = match comment {
        Some(text) if text.trim().is_empty() => {
            return Err(Error::Validation("comment must not be blank".to_string()));
        }
        Some(text) => Some(Comment {
            id: Uuid::new_v4(),
            author_id: user.id.clone(),
            text: text.trim().to_string(),
            created_at: now,
        }),
        None => None,
    };

    let mut next = task.clone();
    next.status = edge.to;
    next.updated_at = now;
    if edge.to == Status::Submitted {
        next.submitted_at = Some(now);
    }
    next.comments.extend(comment);
    Ok(next)
}
