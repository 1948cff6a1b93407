use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cognis_core::Result;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::event::Event;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: Option<Uuid>,
    pub state: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct GetRequest {
    pub session_id: Uuid,
    pub num_recent_events: Option<usize>,
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ListRequest {
    pub app_name: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub session_id: Uuid,
}

/// Exposes the contract named in spec §4.1: `create_session`, `get_session`,
/// `list_sessions`, `delete_session`, `append_event`, `get_state`,
/// `set_state`, `get_all_state`. `append_event` is the only legal path for
/// mutating session state — there is deliberately no `set session.state`
/// method on this trait.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create(&self, req: CreateRequest) -> Result<Session>;
    async fn get(&self, req: GetRequest) -> Result<Session>;
    async fn list(&self, req: ListRequest) -> Result<Vec<Session>>;
    async fn delete(&self, req: DeleteRequest) -> Result<()>;

    /// Atomically appends `event` to `session_id`, applying its
    /// `state_delta` (if any) under an optimistic version check against
    /// `expected_version` — the version the caller's handle was last read
    /// at (spec §4.1, "Atomic append"). A mismatch aborts with
    /// `ConcurrencyConflict` and inserts no event. Returns the session as
    /// committed.
    async fn append_event(
        &self,
        session_id: Uuid,
        expected_version: i64,
        event: Event,
    ) -> Result<Session>;

    /// Scope-routed read: `user:`/`app:`/`temp:` prefixes route to their
    /// respective store; an unprefixed key reads session state.
    async fn get_state(&self, session_id: Uuid, key: &str) -> Result<Option<Value>>;

    /// Scope-routed write. An unprefixed key goes through `append_event`
    /// with a `state_update` event so it remains subject to the same
    /// optimistic-concurrency path as any other state mutation.
    async fn set_state(&self, session_id: Uuid, key: &str, value: Value) -> Result<()>;

    /// Returns a single map covering all scopes, with keys re-prefixed so
    /// callers can tell them apart (spec §4.1).
    async fn get_all_state(&self, session_id: Uuid) -> Result<Map<String, Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults_session_id_none() {
        let req = CreateRequest {
            app_name: "travel-agent".to_string(),
            user_id: "user-1".to_string(),
            session_id: None,
            state: Map::new(),
        };
        assert!(req.session_id.is_none());
    }
}
