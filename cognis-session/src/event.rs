use chrono::{DateTime, Utc};
use cognis_core::{Author, EventType};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Optional side effects an event carries. Only `state_delta` is
/// interpreted by the session engine (spec §4.1); the rest pass through
/// for higher layers.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EventActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_delta: Option<Map<String, Value>>,
}

impl EventActions {
    pub fn with_state_delta(delta: Map<String, Value>) -> Self {
        Self { state_delta: Some(delta) }
    }

    pub fn is_empty(&self) -> bool {
        matches!(&self.state_delta, None) || self.state_delta.as_ref().is_some_and(|m| m.is_empty())
    }
}

/// An immutable log entry for one session (spec §3, "Event"). Sequence
/// numbers are assigned by the engine at append time and are total within
/// a session; across sessions no ordering is implied.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sequence_num: i64,
    pub invocation_id: Option<String>,
    pub author: Author,
    pub event_type: EventType,
    pub content: Value,
    pub actions: EventActions,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Builds an event that has not yet been assigned an id or sequence
    /// number — the shape `append_event` accepts before persisting.
    pub fn draft(author: Author, event_type: EventType, content: Value) -> Self {
        Self {
            id: Uuid::nil(),
            session_id: Uuid::nil(),
            sequence_num: 0,
            invocation_id: None,
            author,
            event_type,
            content,
            actions: EventActions::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_invocation_id(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = Some(invocation_id.into());
        self
    }
}

/// Accessor over a session's event log. Kept as a trait (rather than a bare
/// `Vec<Event>`) so both the in-memory and database-backed sessions can
/// expose it uniformly, mirroring the way the session engine separates
/// event storage from the session handle itself.
pub trait Events: Send + Sync {
    fn all(&self) -> &[Event];
    fn len(&self) -> usize;
    fn at(&self, index: usize) -> Option<&Event>;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Events for Vec<Event> {
    fn all(&self) -> &[Event] {
        self.as_slice()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn at(&self, index: usize) -> Option<&Event> {
        self.as_slice().get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_is_empty() {
        assert!(EventActions::default().is_empty());
        let mut delta = Map::new();
        delta.insert("counter".to_string(), Value::from(1));
        assert!(!EventActions::with_state_delta(delta).is_empty());
    }

    #[test]
    fn test_event_draft_defaults() {
        let event = Event::draft(Author::User, EventType::Message, Value::from("hi"));
        assert_eq!(event.sequence_num, 0);
        assert!(event.actions.is_empty());
    }
}
