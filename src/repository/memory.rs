//! In-process task repository.
//!
//! Same contract as the Postgres one, including version checks. Used by the
//! tests and by embedders that keep tasks in memory.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{TaskFilter, TaskRepository};
use crate::error::{Error, Result};
use crate::model::{Task, TaskId};

#[derive(Default)]
pub struct MemoryTaskRepository {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks.
    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn get_by_id(&self, id: &TaskId) -> Result<Task> {
        self.tasks
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    async fn query(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock().await;
        let mut out: Vec<Task> = tasks.values().filter(|t| filter.matches(t)).cloned().collect();
        out.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    async fn insert(&self, task: &Task) -> Result<Task> {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&task.id) {
            return Err(Error::Validation(format!("task {} already exists", task.id)));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(task.clone())
    }

    async fn insert_all(&self, tasks: &[Task]) -> Result<Vec<Task>> {
        let mut stored = self.tasks.lock().await;
        let mut seen = HashSet::new();
        for task in tasks {
            if stored.contains_key(&task.id) || !seen.insert(&task.id) {
                return Err(Error::Validation(format!("task {} already exists", task.id)));
            }
        }
        for task in tasks {
            stored.insert(task.id.clone(), task.clone());
        }
        Ok(tasks.to_vec())
    }

    async fn save(&self, task: &Task, expected_version: i64) -> Result<Task> {
        let mut tasks = self.tasks.lock().await;
        let stored = tasks
            .get_mut(&task.id)
            .ok_or_else(|| Error::NotFound(format!("task {}", task.id)))?;

        if stored.version != expected_version {
            return Err(Error::ConcurrentModification {
                task_id: task.id.clone(),
                expected: expected_version,
            });
        }

        let mut saved = task.clone();
        saved.assigned_to = stored.assigned_to.clone();
        saved.checker1 = stored.checker1.clone();
        saved.checker2 = stored.checker2.clone();
        saved.created_at = stored.created_at;
        saved.comments = stored.comments.clone();
        for comment in &task.comments {
            if !saved.comments.iter().any(|c| c.id == comment.id) {
                saved.comments.push(comment.clone());
            }
        }
        saved.attachments = stored.attachments.clone();
        for attachment in &task.attachments {
            if !saved.attachments.iter().any(|a| a.id == attachment.id) {
                saved.attachments.push(attachment.clone());
            }
        }
        saved.version = expected_version + 1;
        *stored = saved.clone();
        Ok(saved)
    }
}
