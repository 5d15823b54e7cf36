//! Task workflow span helpers.

use tracing::Span;

use crate::model::{Action, Status, TaskId, UserId};

/// Start a span for one transition request.
///
/// `task.to` is declared empty and filled by [`record_transition`] once the
/// transition commits.
pub fn start_transition_span(task_id: &TaskId, action: Action, actor: &UserId) -> Span {
    tracing::info_span!(
        "task.transition",
        "task.id" = %task_id,
        "task.action" = %action,
        "task.actor" = %actor,
        "task.to" = tracing::field::Empty,
    )
}

/// Record a committed status change on `span`.
pub fn record_transition(span: &Span, from: Status, to: Status) {
    span.record("task.to", tracing::field::display(to));
    span.in_scope(|| {
        tracing::info!(from = %from, to = %to, "state_transition");
    });
}
