use std::sync::Arc;

use anyhow::{Context, Result};
use async_nats::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::messages::StatusMessage;
use crate::session::SessionStatus;

/// Subject a task's status is published on
pub fn status_subject(task_id: &str) -> String {
    format!("session.status.{}", task_id)
}

/// Publishes session status snapshots for remote observers
pub struct StatusPublisher {
    client: Client,
}

impl StatusPublisher {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Publish one status snapshot
    pub async fn publish_status(&self, status: &SessionStatus) -> Result<()> {
        let subject = status_subject(&status.task_id);
        let message = StatusMessage::from(status);
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish session status")?;

        debug!(
            "Published status to {} (state={:?}, remaining={})",
            subject, message.state, message.remaining
        );

        Ok(())
    }

    /// Publish every change of a controller's status until it is disposed
    pub fn forward(self: Arc<Self>, mut status: watch::Receiver<SessionStatus>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let snapshot = status.borrow_and_update().clone();
                if let Err(e) = self.publish_status(&snapshot).await {
                    warn!("Status publish failed for {}: {:#}", snapshot.task_id, e);
                }
                if snapshot.disposed {
                    break;
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
            debug!("Status forwarding finished");
        })
    }
}
