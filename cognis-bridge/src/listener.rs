use chrono::{DateTime, Utc};
use cognis_core::{CognisError, Result};
use serde_json::Value;
use sqlx::postgres::PgListener as SqlxPgListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A NOTIFY payload after it has arrived on the wire. Kept distinct from
/// [`crate::mapping::NotifyPayload`] — that one is the parsed `{table,
/// operation, data}` envelope; this is the raw channel delivery it sits
/// inside.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub channel: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// A single long-lived LISTEN connection (spec §4.2, "Listener contract").
/// The listener itself does not fan out to subscribers — it hands every
/// notification to the caller over a channel; [`crate::bridge::EventBridge`]
/// is what performs the semantic translation and per-run fan-out.
pub struct NotifyListener {
    dsn: String,
    channels: Vec<String>,
}

impl NotifyListener {
    pub fn new(dsn: impl Into<String>, channels: Vec<String>) -> Self {
        Self { dsn: dsn.into(), channels }
    }

    /// Connects, issues `LISTEN` on every configured channel, and spawns a
    /// task that forwards notifications until the connection is dropped or
    /// errors. Returns the receiving half and the task's join handle so the
    /// caller can detect a dead listener and reconnect.
    pub async fn listen(&self) -> Result<(mpsc::Receiver<RawNotification>, JoinHandle<()>)> {
        let mut listener = SqlxPgListener::connect(&self.dsn)
            .await
            .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

        for channel in &self.channels {
            listener
                .listen(channel)
                .await
                .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
            info!(channel = %channel, "listening on notify channel");
        }

        let (tx, rx) = mpsc::channel(1024);

        let handle = tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        let payload = serde_json::from_str(notification.payload())
                            .unwrap_or_else(|_| Value::from(notification.payload()));
                        let raw = RawNotification {
                            channel: notification.channel().to_string(),
                            payload,
                            received_at: Utc::now(),
                        };
                        if tx.send(raw).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "notify listener connection lost");
                        break;
                    }
                }
            }
        });

        Ok((rx, handle))
    }
}
