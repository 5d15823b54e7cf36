//! Status-change audit log and `pg_notify` fan-out.
//!
//! `Db` is itself a [`NotificationSink`]: each event is appended to
//! `task_events` and announced on the `task_status_changed` channel. NOTIFY
//! is transactional, so listeners only hear about rows that exist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Db;
use crate::error::{Error, Result};
use crate::event::StatusChangeEvent;
use crate::model::{TaskId, UserId};
use crate::notify::NotificationSink;

/// Channel name used for `LISTEN`.
pub const STATUS_CHANNEL: &str = "task_status_changed";

#[async_trait]
impl NotificationSink for Db {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            "INSERT INTO task_events (task_id, from_status, to_status, action, actor_id, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(event.task_id.as_str())
        .bind(event.from_status.as_str())
        .bind(event.to_status.as_str())
        .bind(event.action.as_str())
        .bind(event.actor_id.as_str())
        .bind(event.timestamp)
        .execute(&mut *tx)
        .await?;

        let payload = serde_json::to_string(event)
            .map_err(|e| Error::Other(format!("serialize event: {e}")))?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(STATUS_CHANNEL)
            .bind(payload)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

impl Db {
    /// The recorded status history of one task, oldest first.
    pub async fn task_events(&self, task_id: &TaskId) -> Result<Vec<StatusChangeEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT task_id, from_status, to_status, action, actor_id, occurred_at
             FROM task_events WHERE task_id = $1 ORDER BY seq ASC",
        )
        .bind(task_id.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(EventRow::try_into_event).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct EventRow {
    task_id: String,
    from_status: String,
    to_status: String,
    action: String,
    actor_id: String,
    occurred_at: DateTime<Utc>,
}

impl EventRow {
    fn try_into_event(self) -> Result<StatusChangeEvent> {
        Ok(StatusChangeEvent {
            task_id: TaskId(self.task_id),
            from_status: self.from_status.parse()?,
            to_status: self.to_status.parse()?,
            action: self.action.parse()?,
            actor_id: UserId(self.actor_id),
            timestamp: self.occurred_at,
        })
    }
}
