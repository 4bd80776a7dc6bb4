//! Out-of-band alerts for operators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Notification types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A whole retention run failed
    RetentionFailed {
        message: String,
        error_count: u64,
        occurred_at: DateTime<Utc>,
    },
}

/// Notification channel.
#[derive(Debug, Clone)]
pub enum NotificationChannel {
    /// Log only (default)
    Log,
    /// JSON POST to a webhook
    Webhook { url: String },
}

/// Fans notifications out to every configured channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    channels: Vec<NotificationChannel>,
    http: reqwest::Client,
    /// Notifications dispatched, shared between clones
    sent: Arc<AtomicU64>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            channels: vec![NotificationChannel::Log],
            http: reqwest::Client::new(),
            sent: Arc::default(),
        }
    }

    /// Log channel plus a webhook when one is configured.
    pub fn from_webhook(url: Option<&str>) -> Self {
        let notifier = Self::new();
        match url {
            Some(url) if !url.is_empty() => notifier.with_channel(NotificationChannel::Webhook {
                url: url.to_string(),
            }),
            _ => notifier,
        }
    }

    pub fn with_channel(mut self, channel: NotificationChannel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channels(&self) -> &[NotificationChannel] {
        &self.channels
    }

    /// Notifications handed to the channels so far.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Send a notification. Channel failures are logged, never returned.
    pub async fn send(&self, notification: &Notification) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        for channel in &self.channels {
            match channel {
                NotificationChannel::Log => {
                    info!(notification = ?notification, "Notification");
                }
                NotificationChannel::Webhook { url } => {
                    let result = self
                        .http
                        .post(url)
                        .json(notification)
                        .send()
                        .await
                        .and_then(|resp| resp.error_for_status());

                    if let Err(e) = result {
                        error!(url = %url, error = %e, "Failed to deliver webhook notification");
                    }
                }
            }
        }
    }
}
