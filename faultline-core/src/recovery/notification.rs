//! Outbound notifications for UI reactions to recovery
//!
//! Strategy handlers never talk to the UI directly. They emit typed
//! [`RecoveryEvent`]s into a [`NotificationSink`] injected into the
//! [`super::RecoveryManager`]; the UI layer decides how to render them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events emitted by the strategy handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RecoveryEvent {
    #[serde(rename_all = "camelCase")]
    Error { message: String },
    #[serde(rename_all = "camelCase")]
    CriticalError { message: String },
    #[serde(rename_all = "camelCase")]
    FallbackData {
        store_name: String,
        action_name: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SignOut { reason: Option<String> },
    #[serde(rename_all = "camelCase")]
    AccessDenied {
        required_role: Option<String>,
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    LoginRedirect { reason: Option<String> },
    #[serde(rename_all = "camelCase")]
    FieldError { field: String, message: String },
    #[serde(rename_all = "camelCase")]
    FormReset { form: Option<String> },
    #[serde(rename_all = "camelCase")]
    StoreReset { store_name: String },
    #[serde(rename_all = "camelCase")]
    StateRefresh { store_name: String },
    #[serde(rename_all = "camelCase")]
    RevertToCheckpoint { store_name: String },
}

impl RecoveryEvent {
    /// Stable event name used by UI subscribers
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryEvent::Error { .. } => "error",
            RecoveryEvent::CriticalError { .. } => "critical-error",
            RecoveryEvent::FallbackData { .. } => "fallback:load",
            RecoveryEvent::SignOut { .. } => "auth:signout",
            RecoveryEvent::AccessDenied { .. } => "auth:access-denied",
            RecoveryEvent::LoginRedirect { .. } => "auth:login-redirect",
            RecoveryEvent::FieldError { .. } => "validation:field-error",
            RecoveryEvent::FormReset { .. } => "validation:form-reset",
            RecoveryEvent::StoreReset { .. } => "store:reset",
            RecoveryEvent::StateRefresh { .. } => "store:refresh",
            RecoveryEvent::RevertToCheckpoint { .. } => "store:revert",
        }
    }
}

/// Receiver of recovery events
///
/// Implementations must not block: handlers call `notify` inline.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: RecoveryEvent);
}

/// Writes every event to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, event: RecoveryEvent) {
        let name = event.name();
        match &event {
            RecoveryEvent::CriticalError { message } => {
                error!(event = name, %message, "recovery notification")
            }
            RecoveryEvent::Error { message } => {
                warn!(event = name, %message, "recovery notification")
            }
            other => info!(event = name, detail = ?other, "recovery notification"),
        }
    }
}

/// Fans events out to any number of subscribers over a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<RecoveryEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify(&self, event: RecoveryEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            debug!(event = name, "no subscribers for recovery notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::default();
        let mut rx = notifier.subscribe();

        notifier.notify(RecoveryEvent::StoreReset {
            store_name: "cart".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "store:reset");
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(1);
        notifier.notify(RecoveryEvent::SignOut { reason: None });
    }

    #[test]
    fn test_event_wire_format() {
        let event = RecoveryEvent::FieldError {
            field: "price".to_string(),
            message: "too low".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "fieldError");
        assert_eq!(json["field"], "price");
    }
}
