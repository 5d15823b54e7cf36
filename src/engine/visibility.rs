//! Role-scoped task visibility.
//!
//! A user's primary role decides which relation to a task they must hold to
//! see it. Admins see everything.

use crate::model::{Role, Task, User, UserId};
use crate::repository::TaskFilter;

/// The assignee a task names for `role`. Admin has no slot on a task.
pub fn assignment(task: &Task, role: Role) -> Option<&UserId> {
    match role {
        Role::Admin => None,
        Role::Maker => Some(&task.assigned_to),
        Role::Checker1 => Some(&task.checker1),
        Role::Checker2 => Some(&task.checker2),
    }
}

/// Does `user` hold the task slot for `role`?
pub fn holds(task: &Task, user: &User, role: Role) -> bool {
    assignment(task, role).is_some_and(|id| *id == user.id)
}

/// Can `user` see `task` at all?
pub fn is_visible(user: &User, task: &Task) -> bool {
    user.is_admin() || holds(task, user, user.role)
}

/// The repository filter equivalent of [`is_visible`] for `user`.
pub fn scope_for(user: &User) -> TaskFilter {
    match user.role {
        Role::Admin => TaskFilter::all(),
        Role::Maker => TaskFilter::assigned_to(user.id.clone()),
        Role::Checker1 => TaskFilter::checker1(user.id.clone()),
        Role::Checker2 => TaskFilter::checker2(user.id.clone()),
    }
}
