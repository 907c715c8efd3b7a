//! Heartbeat emitter scoped to one reconciliation pass

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::{Event, EventSink, HeartbeatAction, HeartbeatData};

/// Topic heartbeat events are published on
pub const HEARTBEAT_TOPIC: &str = "heartbeat";

/// Handle to a running heartbeat emitter.
///
/// The emitter stops when the guard is dropped, so it cannot outlive the
/// pass that started it, whichever way that pass exits.
pub struct HeartbeatGuard {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl HeartbeatGuard {
    /// Spawn a task emitting one heartbeat per interval until stopped
    pub fn start(
        events: Arc<dyn EventSink>,
        job_id: String,
        scope: String,
        remove: bool,
        interval: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let action = if remove {
            HeartbeatAction::Delete
        } else {
            HeartbeatAction::Update
        };

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            debug!("Heartbeat emitter for job {} stopping", job_id);
                            return;
                        }
                    }
                    _ = tokio::time::sleep(interval) => {
                        events.publish(
                            HEARTBEAT_TOPIC,
                            Event::new(HeartbeatData {
                                job_id: job_id.clone(),
                                scope: scope.clone(),
                                action,
                                time: chrono::Utc::now(),
                            }),
                        );
                    }
                }
            }
        });

        Self { stop_tx, handle }
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        // the task may be parked in sleep; don't wait for it
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelEventSink;

    #[tokio::test]
    async fn emits_heartbeats_until_dropped() {
        let sink = Arc::new(ChannelEventSink::new(16));
        let mut rx = sink.subscribe();

        let guard = HeartbeatGuard::start(
            sink.clone(),
            "job-1".to_string(),
            "default".to_string(),
            false,
            Duration::from_millis(10),
        );

        let (topic, event) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("heartbeat not emitted")
            .unwrap();
        assert_eq!(topic, HEARTBEAT_TOPIC);
        let data: HeartbeatData = serde_json::from_value(event.body).unwrap();
        assert_eq!(data.job_id, "job-1");
        assert_eq!(data.action, HeartbeatAction::Update);

        drop(guard);
        // drain whatever was in flight; the channel then closes quickly
        tokio::time::sleep(Duration::from_millis(50)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn removal_passes_emit_delete_action() {
        let sink = Arc::new(ChannelEventSink::new(16));
        let mut rx = sink.subscribe();
        let _guard = HeartbeatGuard::start(
            sink.clone(),
            "job-2".to_string(),
            "ns".to_string(),
            true,
            Duration::from_millis(5),
        );
        let (_, event) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let data: HeartbeatData = serde_json::from_value(event.body).unwrap();
        assert_eq!(data.action, HeartbeatAction::Delete);
        assert_eq!(data.scope, "ns");
    }
}
