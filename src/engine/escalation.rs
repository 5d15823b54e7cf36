//! Overdue and escalation projections. Read-only, never stored.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::model::{Status, Task};

/// A task surfaced for escalation, with how late it is.
#[derive(Debug, Clone, Serialize)]
pub struct Escalation {
    pub task: Task,
    pub days_overdue: i64,
    pub reason: EscalationReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    Overdue,
    Rejected,
}

impl EscalationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationReason::Overdue => "overdue",
            EscalationReason::Rejected => "rejected",
        }
    }
}

/// Past its due date and the maker has not handed it in yet.
pub fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    task.due_date < now.date_naive()
        && matches!(task.status, Status::Pending | Status::InProgress)
}

/// Whole days elapsed since the start of the due date, never negative.
pub fn days_overdue(due_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let due = due_date.and_time(chrono::NaiveTime::MIN).and_utc();
    (now - due).num_days().max(0)
}

/// Classify `task` for escalation, if it needs it.
pub fn escalation(task: &Task, now: DateTime<Utc>) -> Option<Escalation> {
    let reason = if is_overdue(task, now) {
        EscalationReason::Overdue
    } else if task.status == Status::Rejected {
        EscalationReason::Rejected
    } else {
        return None;
    };
    Some(Escalation {
        task: task.clone(),
        days_overdue: days_overdue(task.due_date, now),
        reason,
    })
}

/// Escalations among `tasks`, most overdue first.
pub fn escalations<'a>(
    tasks: impl IntoIterator<Item = &'a Task>,
    now: DateTime<Utc>,
) -> Vec<Escalation> {
    let mut out: Vec<Escalation> = tasks
        .into_iter()
        .filter_map(|t| escalation(t, now))
        .collect();
    out.sort_by(|a, b| {
        b.days_overdue
            .cmp(&a.days_overdue)
            .then_with(|| a.task.due_date.cmp(&b.task.due_date))
    });
    out
}
