use std::collections::HashMap;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::listener::RawNotification;
use crate::mapping::{convert_to_agent_event, NotifyPayload};
use crate::types::AgentEvent;

const SUBSCRIBER_QUEUE_DEPTH: usize = 128;

/// Translates database NOTIFY payloads into semantic [`AgentEvent`]s and
/// fans them out to per-run subscriber queues (spec §4.2, "Bridge mapping"
/// and "Subscription lifecycle").
pub struct EventBridge {
    subscribers: RwLock<HashMap<String, Vec<mpsc::Sender<AgentEvent>>>>,
    heartbeat_interval: Duration,
}

impl EventBridge {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self { subscribers: RwLock::new(HashMap::new()), heartbeat_interval }
    }

    /// Parses a raw NOTIFY delivery and dispatches the resulting semantic
    /// event, if any, to every subscriber of its run id. Malformed payloads
    /// and unrecognized table/operation pairs are dropped silently, per
    /// spec.
    pub async fn handle_notification(&self, raw: RawNotification) {
        let payload: NotifyPayload = match serde_json::from_value(raw.payload) {
            Ok(p) => p,
            Err(_) => return,
        };
        if let Some(event) = convert_to_agent_event(&payload) {
            self.dispatch(event).await;
        }
    }

    async fn dispatch(&self, event: AgentEvent) {
        let senders = {
            let subs = self.subscribers.read().await;
            subs.get(&event.run_id).cloned().unwrap_or_default()
        };
        for sender in senders {
            if sender.send(event.clone()).await.is_err() {
                debug!(run_id = %event.run_id, "subscriber queue dropped mid-dispatch");
            }
        }
    }

    /// A lazy, finite sequence of events for one run id. Idles with a
    /// synthetic `CUSTOM{name:"heartbeat"}` every `heartbeat_interval` so
    /// the connection stays open, and terminates after a terminal event
    /// (`RUN_FINISHED`/`RUN_ERROR`). The subscriber's queue is removed on
    /// drop; if its run id then has no further subscribers, the entry is
    /// purged (spec §4.2).
    pub fn subscribe(&self, run_id: String) -> impl Stream<Item = AgentEvent> + '_ {
        stream! {
            let (tx, mut rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
            self.subscribers.write().await.entry(run_id.clone()).or_default().push(tx.clone());

            loop {
                match tokio::time::timeout(self.heartbeat_interval, rx.recv()).await {
                    Ok(Some(event)) => {
                        let terminal = event.event_type.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_elapsed) => yield AgentEvent::heartbeat(&run_id),
                }
            }

            let mut subs = self.subscribers.write().await;
            if let Some(queues) = subs.get_mut(&run_id) {
                queues.retain(|s| !s.same_channel(&tx));
                if queues.is_empty() {
                    subs.remove(&run_id);
                }
            }
        }
    }

    pub async fn subscriber_count(&self, run_id: &str) -> usize {
        self.subscribers.read().await.get(run_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentEventType;
    use futures::StreamExt;
    use serde_json::{json, Map};

    #[tokio::test]
    async fn test_dispatch_reaches_matching_subscriber() {
        let bridge = EventBridge::new(Duration::from_secs(30));
        let raw = RawNotification {
            channel: "event_stream".to_string(),
            payload: json!({"table": "runs", "operation": "INSERT", "data": {"id": "run-1"}}),
            received_at: chrono::Utc::now(),
        };

        let stream_fut = bridge.subscribe("run-1".to_string());
        tokio::pin!(stream_fut);

        // Give the stream a moment to register its queue before dispatch.
        tokio::time::sleep(Duration::from_millis(10)).await;
        bridge.handle_notification(raw).await;

        let event = tokio::time::timeout(Duration::from_secs(1), stream_fut.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, AgentEventType::RunStarted);
    }

    #[tokio::test]
    async fn test_stream_terminates_on_run_finished() {
        let bridge = EventBridge::new(Duration::from_secs(30));
        let stream_fut = bridge.subscribe("run-2".to_string());
        tokio::pin!(stream_fut);

        tokio::time::sleep(Duration::from_millis(10)).await;
        bridge
            .dispatch(AgentEvent::new(AgentEventType::RunFinished, "run-2", Map::new()))
            .await;

        let event = stream_fut.next().await.unwrap();
        assert_eq!(event.event_type, AgentEventType::RunFinished);
        assert!(stream_fut.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unrelated_run_id_does_not_receive_event() {
        let bridge = EventBridge::new(Duration::from_secs(30));
        bridge
            .dispatch(AgentEvent::new(AgentEventType::RunStarted, "run-3", Map::new()))
            .await;
        assert_eq!(bridge.subscriber_count("run-3").await, 0);
    }
}
