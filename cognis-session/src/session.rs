use chrono::{DateTime, Utc};
use serde_json::Map;
use serde_json::Value;
use uuid::Uuid;

use crate::event::Event;

/// A conversation thread within a scope tuple `(app_name, user_id)` (spec
/// §3, "Session (Thread)"). `version` increases by exactly one per
/// successful state-mutating `append_event`.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub app_name: String,
    pub user_id: String,
    pub state: Map<String, Value>,
    pub version: i64,
    pub events: Vec<Event>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>, initial_state: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state: initial_state,
            version: 1,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn last_update_time(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_starts_at_version_one() {
        let session = Session::new("travel-agent", "user-1", Map::new());
        assert_eq!(session.version, 1);
        assert!(session.events.is_empty());
    }
}
