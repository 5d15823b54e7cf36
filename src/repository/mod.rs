//! Task persistence contract.
//!
//! The engine never issues storage queries itself. It reads snapshots with
//! [`TaskRepository::get_by_id`] / [`TaskRepository::query`] and writes them
//! back with [`TaskRepository::save`], which must reject stale versions.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Status, Task, TaskId, UserId};

pub use memory::MemoryTaskRepository;

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Fetch one task. `Error::NotFound` if it does not exist.
    async fn get_by_id(&self, id: &TaskId) -> Result<Task>;

    /// All tasks matching `filter`, oldest due date first.
    async fn query(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Store a new task. Its version is taken as-is.
    async fn insert(&self, task: &Task) -> Result<Task>;

    /// Store several new tasks. Either all are stored or none are.
    async fn insert_all(&self, tasks: &[Task]) -> Result<Vec<Task>>;

    /// Replace the stored task if its version is still `expected_version`.
    ///
    /// Assignees and `created_at` are fixed at insert and are not changed
    /// here. Comments and attachments are only ever appended.
    ///
    /// On success the stored version is `expected_version + 1` and the task
    /// as persisted is returned. Otherwise `Error::ConcurrentModification`
    /// and nothing is written.
    async fn save(&self, task: &Task, expected_version: i64) -> Result<Task>;
}

/// Which relation a task must have to a user to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    AssignedTo(UserId),
    Checker1(UserId),
    Checker2(UserId),
}

/// Query predicate understood by every repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFilter {
    pub scope: Scope,
    pub status: Option<Status>,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self {
            scope: Scope::All,
            status: None,
        }
    }

    pub fn assigned_to(id: UserId) -> Self {
        Self {
            scope: Scope::AssignedTo(id),
            status: None,
        }
    }

    pub fn checker1(id: UserId) -> Self {
        Self {
            scope: Scope::Checker1(id),
            status: None,
        }
    }

    pub fn checker2(id: UserId) -> Self {
        Self {
            scope: Scope::Checker2(id),
            status: None,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        let in_scope = match &self.scope {
            Scope::All => true,
            Scope::AssignedTo(id) => task.assigned_to == *id,
            Scope::Checker1(id) => task.checker1 == *id,
            Scope::Checker2(id) => task.checker2 == *id,
        };
        in_scope && self.status.is_none_or(|s| task.status == s)
    }
}
