//! Outbound notification dispatch. Delivery is best-effort by contract:
//! callers spawn dispatch off the request path and a failed send never fails
//! the business operation that triggered it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    AppointmentUpdate,
    ReorderAlert,
    SupplierReorder,
    RestockCompleted,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::AppointmentUpdate => write!(f, "appointment_update"),
            NotificationKind::ReorderAlert => write!(f, "reorder_alert"),
            NotificationKind::SupplierReorder => write!(f, "supplier_reorder"),
            NotificationKind::RestockCompleted => write!(f, "restock_completed"),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the channel accepted the message. Transport errors are
    /// returned as `false`; callers treat any failure as non-fatal.
    async fn send(&self, kind: NotificationKind, payload: Value) -> bool;
}

/// Posts `{kind, payload}` JSON to a configured webhook endpoint.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, kind: NotificationKind, payload: Value) -> bool {
        let body = json!({
            "kind": kind.to_string(),
            "payload": payload,
        });

        match self.client.post(&self.webhook_url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Notification {} delivered", kind);
                true
            }
            Ok(response) => {
                warn!("Notification {} rejected with status {}", kind, response.status());
                false
            }
            Err(e) => {
                warn!("Notification {} failed to send: {}", kind, e);
                false
            }
        }
    }
}

/// Fallback channel when no webhook is configured; also the test double.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, kind: NotificationKind, payload: Value) -> bool {
        debug!("Notification {}: {}", kind, payload);
        true
    }
}

pub fn notifier_from_config(config: &AppConfig) -> Arc<dyn Notifier> {
    match config.notification_webhook_url.as_deref() {
        Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url.to_string())),
        _ => Arc::new(LogNotifier),
    }
}

/// Fire-and-forget dispatch; failures are logged and swallowed.
pub fn dispatch_background(notifier: Arc<dyn Notifier>, kind: NotificationKind, payload: Value) {
    tokio::spawn(async move {
        if !notifier.send(kind, payload).await {
            warn!("Background notification {} was not delivered", kind);
        }
    });
}
