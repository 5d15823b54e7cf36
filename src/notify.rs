//! Notification sinks for status-change events.
//!
//! The engine publishes after the transition is committed. Delivery (email,
//! in-app, audit rows) is the sink's business.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::Result;
use crate::event::StatusChangeEvent;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<()>;
}

#[async_trait]
impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<()> {
        (**self).publish(event).await
    }
}

/// Writes each event to the tracing log. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<()> {
        info!(
            task_id = %event.task_id,
            from = %event.from_status,
            to = %event.to_status,
            action = %event.action,
            actor = %event.actor_id,
            "task status changed"
        );
        Ok(())
    }
}

/// Fans events out to in-process subscribers.
///
/// Publishing with no live subscribers is not an error.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: broadcast::Sender<StatusChangeEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChangeEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationSink for ChannelSink {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<()> {
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Publishes to several sinks in order. Stops at the first failure.
pub struct FanoutSink {
    sinks: Vec<Box<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn publish(&self, event: &StatusChangeEvent) -> Result<()> {
        for sink in &self.sinks {
            sink.publish(event).await?;
        }
        Ok(())
    }
}
