//! Event publication: liveness heartbeats for in-flight reconciliations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the in-flight pass is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatAction {
    Update,
    Delete,
}

/// Periodic liveness signal emitted while a pass is running
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatData {
    pub job_id: String,
    /// Namespace scope of the pass
    pub scope: String,
    pub action: HeartbeatAction,
    pub time: DateTime<Utc>,
}

/// A published event envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub body: serde_json::Value,
}

impl Event {
    pub fn new(body: impl Serialize) -> Self {
        Self {
            body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Fire-and-forget event sink
pub trait EventSink: Send + Sync {
    fn publish(&self, topic: &str, event: Event);
}

/// Sink that drops every event; the default for embedded use
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _topic: &str, _event: Event) {}
}

/// Sink backed by a tokio broadcast channel; test double and bridge for
/// hosts that relay events elsewhere
pub struct ChannelEventSink {
    sender: tokio::sync::broadcast::Sender<(String, Event)>,
}

impl ChannelEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<(String, Event)> {
        self.sender.subscribe()
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, topic: &str, event: Event) {
        // fire-and-forget: no subscribers is not an error
        let _ = self.sender.send((topic.to_string(), event));
    }
}
