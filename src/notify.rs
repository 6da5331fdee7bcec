//! Outbound notification fan-out.
//!
//! Rollback and degradation alerts are constructed here as structured
//! messages and handed to every registered channel. Concrete transports
//! (chat webhook, email, pager) live in host code behind the single
//! `NotificationChannel` trait; the crate ships a tracing-backed channel.
//!
//! Delivery is best-effort: a failing channel is logged and skipped, and
//! never blocks the state transition that produced the message.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Emits notifications into the process log via tracing.
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let json = serde_json::to_string(notification)?;
        match notification.severity {
            Severity::Critical => {
                tracing::error!(notification = %json, "ALERT: {}", notification.title)
            }
            Severity::Warning => {
                tracing::warn!(notification = %json, "ALERT: {}", notification.title)
            }
            Severity::Info => {
                tracing::info!(notification = %json, "{}", notification.title)
            }
        }
        Ok(())
    }
}

pub struct Notifier {
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(vec![Arc::new(LogChannel)]),
        }
    }

    pub async fn register(&self, channel: Arc<dyn NotificationChannel>) {
        self.channels.write().await.push(channel);
    }

    /// Fans the notification out to every channel. Failures are logged and
    /// do not stop delivery to the remaining channels.
    pub async fn broadcast(&self, notification: &Notification) {
        let channels = self.channels.read().await.clone();
        for channel in channels {
            if let Err(e) = channel.send(notification).await {
                tracing::warn!(
                    channel = channel.name(),
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
