use std::time::Duration;

use cognis_core::{Author, CognisError, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::event::{Event, EventActions};
use crate::service::SessionService;
use crate::session::Session;

/// Exponential backoff schedule for `update_session_state` retries (spec
/// §4.1: "10 ms, 20 ms, 30 ms").
fn backoff_for(attempt: u32) -> Duration {
    Duration::from_millis(10 * (attempt as u64 + 1))
}

/// Wraps `append_event` with a state-only event; on `ConcurrencyConflict`
/// re-reads the session, reapplies `delta` on top of the fresh state, and
/// retries with backoff. After `max_retries` consecutive conflicts the
/// error propagates (spec §4.1, "Optimistic retry").
pub async fn update_session_state(
    service: &dyn SessionService,
    session_id: Uuid,
    delta: Map<String, Value>,
    max_retries: u32,
) -> Result<Session> {
    let mut attempt = 0;
    let mut current = service.get(crate::service::GetRequest {
        session_id,
        num_recent_events: Some(0),
        after: None,
    }).await?;

    loop {
        let event = Event::draft(
            Author::System,
            cognis_core::EventType::StateUpdate,
            Value::Object(Map::new()),
        )
        .with_actions(EventActions::with_state_delta(delta.clone()));

        match service.append_event(session_id, current.version, event).await {
            Ok(session) => return Ok(session),
            Err(CognisError::ConcurrencyConflict { .. }) if attempt < max_retries => {
                attempt += 1;
                current = service.get(crate::service::GetRequest {
                    session_id,
                    num_recent_events: Some(0),
                    after: None,
                }).await?;
                tokio::time::sleep(backoff_for(attempt - 1)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_for(0), Duration::from_millis(10));
        assert_eq!(backoff_for(1), Duration::from_millis(20));
        assert_eq!(backoff_for(2), Duration::from_millis(30));
    }
}
