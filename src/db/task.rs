//! Postgres task repository: tasks, comments, attachments, version checks.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::Db;
use crate::error::{Error, Result};
use crate::model::{Attachment, Comment, ObservationStatus, Task, TaskId, UserId};
use crate::repository::{Scope, TaskFilter, TaskRepository};

const TASK_COLUMNS: &str = "id, name, description, category, priority, frequency, is_recurring, due_date, observation_status, assigned_to, checker1, checker2, status, created_at, updated_at, submitted_at, version";

#[async_trait]
impl TaskRepository for Db {
    async fn get_by_id(&self, id: &TaskId) -> Result<Task> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(self.pool())
                .await?;

        let row = row.ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        let mut tasks = self.hydrate(vec![row]).await?;
        tasks
            .pop()
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    async fn query(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let (assigned_to, checker1, checker2) = match &filter.scope {
            Scope::All => (None, None, None),
            Scope::AssignedTo(id) => (Some(id.as_str()), None, None),
            Scope::Checker1(id) => (None, Some(id.as_str()), None),
            Scope::Checker2(id) => (None, None, Some(id.as_str())),
        };

        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE ($1::text IS NULL OR assigned_to = $1)
             AND ($2::text IS NULL OR checker1 = $2)
             AND ($3::text IS NULL OR checker2 = $3)
             AND ($4::text IS NULL OR status = $4)
             ORDER BY due_date ASC, created_at ASC, id ASC"
        ))
        .bind(assigned_to)
        .bind(checker1)
        .bind(checker2)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(self.pool())
        .await?;

        self.hydrate(rows).await
    }

    async fn insert(&self, task: &Task) -> Result<Task> {
        let mut tx = self.pool().begin().await?;
        insert_task(&mut tx, task).await?;
        tx.commit().await?;
        Ok(task.clone())
    }

    async fn insert_all(&self, tasks: &[Task]) -> Result<Vec<Task>> {
        let mut tx = self.pool().begin().await?;
        for task in tasks {
            insert_task(&mut tx, task).await?;
        }
        tx.commit().await?;
        Ok(tasks.to_vec())
    }

    async fn save(&self, task: &Task, expected_version: i64) -> Result<Task> {
        let mut tx = self.pool().begin().await?;

        // Assignments and creation time are immutable through this path.
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "UPDATE tasks SET name = $1, description = $2, category = $3, priority = $4, frequency = $5, is_recurring = $6, due_date = $7, observation_status = $8, status = $9, updated_at = $10, submitted_at = $11, version = version + 1
             WHERE id = $12 AND version = $13
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.category)
        .bind(task.priority.as_str())
        .bind(task.frequency.as_str())
        .bind(task.is_recurring)
        .bind(task.due_date)
        .bind(task.observation_status.map(|o| o.as_str()))
        .bind(task.status.as_str())
        .bind(task.updated_at)
        .bind(task.submitted_at)
        .bind(task.id.as_str())
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM tasks WHERE id = $1")
                .bind(task.id.as_str())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => Error::ConcurrentModification {
                    task_id: task.id.clone(),
                    expected: expected_version,
                },
                None => Error::NotFound(format!("task {}", task.id)),
            });
        };

        insert_children(&mut tx, task).await?;
        tx.commit().await?;

        self.hydrate(vec![row])
            .await?
            .pop()
            .ok_or_else(|| Error::NotFound(format!("task {}", task.id)))
    }
}

/// Insert one task row and its children inside `tx`.
async fn insert_task(tx: &mut Transaction<'_, Postgres>, task: &Task) -> Result<()> {
    sqlx::query(
        "INSERT INTO tasks (id, name, description, category, priority, frequency, is_recurring, due_date, observation_status, assigned_to, checker1, checker2, status, created_at, updated_at, submitted_at, version)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
    )
    .bind(task.id.as_str())
    .bind(&task.name)
    .bind(&task.description)
    .bind(&task.category)
    .bind(task.priority.as_str())
    .bind(task.frequency.as_str())
    .bind(task.is_recurring)
    .bind(task.due_date)
    .bind(task.observation_status.map(|o| o.as_str()))
    .bind(task.assigned_to.as_str())
    .bind(task.checker1.as_str())
    .bind(task.checker2.as_str())
    .bind(task.status.as_str())
    .bind(task.created_at)
    .bind(task.updated_at)
    .bind(task.submitted_at)
    .bind(task.version)
    .execute(&mut **tx)
    .await?;

    insert_children(tx, task).await
}

/// Append comments and attachments the store has not seen yet.
async fn insert_children(tx: &mut Transaction<'_, Postgres>, task: &Task) -> Result<()> {
    for comment in &task.comments {
        sqlx::query(
            "INSERT INTO task_comments (id, task_id, author_id, body, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(comment.id)
        .bind(task.id.as_str())
        .bind(comment.author_id.as_str())
        .bind(&comment.text)
        .bind(comment.created_at)
        .execute(&mut **tx)
        .await?;
    }

    for attachment in &task.attachments {
        sqlx::query(
            "INSERT INTO task_attachments (id, task_id, file_name, content_type, size_bytes, storage_key, uploaded_by, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(attachment.id)
        .bind(task.id.as_str())
        .bind(&attachment.file_name)
        .bind(&attachment.content_type)
        .bind(attachment.size_bytes)
        .bind(&attachment.storage_key)
        .bind(attachment.uploaded_by.as_str())
        .bind(attachment.uploaded_at)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

impl Db {
    /// Attach comments and attachments to task rows, keeping row order.
    async fn hydrate(&self, rows: Vec<TaskRow>) -> Result<Vec<Task>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

        let comment_rows: Vec<CommentRow> = sqlx::query_as(
            "SELECT id, task_id, author_id, body, created_at FROM task_comments
             WHERE task_id = ANY($1)
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await?;

        let attachment_rows: Vec<AttachmentRow> = sqlx::query_as(
            "SELECT id, task_id, file_name, content_type, size_bytes, storage_key, uploaded_by, uploaded_at
             FROM task_attachments
             WHERE task_id = ANY($1)
             ORDER BY uploaded_at ASC, id ASC",
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await?;

        let mut comments: HashMap<String, Vec<Comment>> = HashMap::new();
        for row in comment_rows {
            comments.entry(row.task_id.clone()).or_default().push(row.into());
        }
        let mut attachments: HashMap<String, Vec<Attachment>> = HashMap::new();
        for row in attachment_rows {
            attachments
                .entry(row.task_id.clone())
                .or_default()
                .push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let task_comments = comments.remove(&row.id).unwrap_or_default();
                let task_attachments = attachments.remove(&row.id).unwrap_or_default();
                row.try_into_task(task_comments, task_attachments)
            })
            .collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    name: String,
    description: String,
    category: String,
    priority: String,
    frequency: String,
    is_recurring: bool,
    due_date: NaiveDate,
    observation_status: Option<String>,
    assigned_to: String,
    checker1: String,
    checker2: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TaskRow {
    fn try_into_task(self, comments: Vec<Comment>, attachments: Vec<Attachment>) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            name: self.name,
            description: self.description,
            category: self.category,
            priority: self.priority.parse()?,
            frequency: self.frequency.parse()?,
            is_recurring: self.is_recurring,
            due_date: self.due_date,
            observation_status: self
                .observation_status
                .as_deref()
                .map(str::parse::<ObservationStatus>)
                .transpose()?,
            assigned_to: UserId(self.assigned_to),
            checker1: UserId(self.checker1),
            checker2: UserId(self.checker2),
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            submitted_at: self.submitted_at,
            comments,
            attachments,
            version: self.version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    task_id: String,
    author_id: String,
    body: String,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            author_id: UserId(row.author_id),
            text: row.body,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: Uuid,
    task_id: String,
    file_name: String,
    content_type: String,
    size_bytes: i64,
    storage_key: String,
    uploaded_by: String,
    uploaded_at: DateTime<Utc>,
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            storage_key: row.storage_key,
            uploaded_by: UserId(row.uploaded_by),
            uploaded_at: row.uploaded_at,
        }
    }
}
