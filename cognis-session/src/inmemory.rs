use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use cognis_core::{parse_state_key, CognisError, Result, Scope};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::event::Event;
use crate::service::{CreateRequest, DeleteRequest, GetRequest, ListRequest, SessionService};
use crate::session::Session;
use crate::state::merge_state;

/// Reference `SessionService` for tests and local development. Holds
/// everything behind `RwLock<HashMap<_>>`s the way the ADK's in-memory
/// session service does; the four scopes (session, user, app, temp) are
/// four separate maps rather than one nested structure, matching the
/// separation the database schema enforces with separate tables.
#[derive(Default)]
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<Uuid, Session>>,
    user_state: RwLock<HashMap<(String, String), Map<String, Value>>>,
    app_state: RwLock<HashMap<String, Map<String, Value>>>,
    temp_state: RwLock<HashMap<Uuid, Map<String, Value>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create(&self, req: CreateRequest) -> Result<Session> {
        let mut session = Session::new(req.app_name, req.user_id, req.state);
        if let Some(id) = req.session_id {
            session.id = id;
        }
        let id = session.id;
        self.sessions.write().unwrap().insert(id, session.clone());
        Ok(session)
    }

    async fn get(&self, req: GetRequest) -> Result<Session> {
        let sessions = self.sessions.read().unwrap();
        let session = sessions
            .get(&req.session_id)
            .ok_or_else(|| CognisError::NotFound(format!("session {}", req.session_id)))?;

        let mut session = session.clone();
        if let Some(after) = req.after {
            session.events.retain(|e| e.created_at > after);
        }
        if let Some(n) = req.num_recent_events {
            let len = session.events.len();
            if n < len {
                session.events = session.events[len - n..].to_vec();
            }
        }
        Ok(session)
    }

    async fn list(&self, req: ListRequest) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().unwrap();
        Ok(sessions
            .values()
            .filter(|s| s.app_name == req.app_name && s.user_id == req.user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, req: DeleteRequest) -> Result<()> {
        self.sessions.write().unwrap().remove(&req.session_id);
        self.temp_state.write().unwrap().remove(&req.session_id);
        Ok(())
    }

    async fn append_event(
        &self,
        session_id: Uuid,
        expected_version: i64,
        mut event: Event,
    ) -> Result<Session> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| CognisError::NotFound(format!("session {}", session_id)))?;

        if session.version != expected_version {
            return Err(CognisError::ConcurrencyConflict {
                session_id: session_id.to_string(),
                expected: expected_version,
            });
        }

        if let Some(delta) = event.actions.state_delta.clone() {
            if !delta.is_empty() {
                session.state = merge_state(&session.state, &delta);
                session.version += 1;
            }
        }

        event.id = Uuid::new_v4();
        event.session_id = session_id;
        event.sequence_num = session.events.last().map_or(1, |e| e.sequence_num + 1);
        session.events.push(event);
        session.updated_at = Utc::now();

        Ok(session.clone())
    }

    async fn get_state(&self, session_id: Uuid, key: &str) -> Result<Option<Value>> {
        let (scope, bare_key) = parse_state_key(key);
        match scope {
            Scope::Session => {
                let sessions = self.sessions.read().unwrap();
                let session = sessions
                    .get(&session_id)
                    .ok_or_else(|| CognisError::NotFound(format!("session {}", session_id)))?;
                Ok(session.state.get(bare_key).cloned())
            }
            Scope::User => {
                let sessions = self.sessions.read().unwrap();
                let session = sessions
                    .get(&session_id)
                    .ok_or_else(|| CognisError::NotFound(format!("session {}", session_id)))?;
                let scope_key = (session.user_id.clone(), session.app_name.clone());
                Ok(self
                    .user_state
                    .read()
                    .unwrap()
                    .get(&scope_key)
                    .and_then(|m| m.get(bare_key))
                    .cloned())
            }
            Scope::App => {
                let sessions = self.sessions.read().unwrap();
                let session = sessions
                    .get(&session_id)
                    .ok_or_else(|| CognisError::NotFound(format!("session {}", session_id)))?;
                Ok(self
                    .app_state
                    .read()
                    .unwrap()
                    .get(&session.app_name)
                    .and_then(|m| m.get(bare_key))
                    .cloned())
            }
            Scope::Temp => Ok(self
                .temp_state
                .read()
                .unwrap()
                .get(&session_id)
                .and_then(|m| m.get(bare_key))
                .cloned()),
        }
    }

    async fn set_state(&self, session_id: Uuid, key: &str, value: Value) -> Result<()> {
        let (scope, bare_key) = parse_state_key(key);
        match scope {
            Scope::Session => {
                let mut delta = Map::new();
                delta.insert(bare_key.to_string(), value);
                crate::retry::update_session_state(self, session_id, delta, 3).await?;
            }
            Scope::User => {
                let sessions = self.sessions.read().unwrap();
                let session = sessions
                    .get(&session_id)
                    .ok_or_else(|| CognisError::NotFound(format!("session {}", session_id)))?;
                let scope_key = (session.user_id.clone(), session.app_name.clone());
                drop(sessions);
                self.user_state
                    .write()
                    .unwrap()
                    .entry(scope_key)
                    .or_default()
                    .insert(bare_key.to_string(), value);
            }
            Scope::App => {
                let sessions = self.sessions.read().unwrap();
                let session = sessions
                    .get(&session_id)
                    .ok_or_else(|| CognisError::NotFound(format!("session {}", session_id)))?;
                let app_name = session.app_name.clone();
                drop(sessions);
                self.app_state
                    .write()
                    .unwrap()
                    .entry(app_name)
                    .or_default()
                    .insert(bare_key.to_string(), value);
            }
            Scope::Temp => {
                self.temp_state
                    .write()
                    .unwrap()
                    .entry(session_id)
                    .or_default()
                    .insert(bare_key.to_string(), value);
            }
        }
        Ok(())
    }

    async fn get_all_state(&self, session_id: Uuid) -> Result<Map<String, Value>> {
        let sessions = self.sessions.read().unwrap();
        let session = sessions
            .get(&session_id)
            .ok_or_else(|| CognisError::NotFound(format!("session {}", session_id)))?;
        let scope_key = (session.user_id.clone(), session.app_name.clone());
        let app_name = session.app_name.clone();

        let mut out = Map::new();
        for (k, v) in &session.state {
            out.insert(k.clone(), v.clone());
        }
        if let Some(user_map) = self.user_state.read().unwrap().get(&scope_key) {
            for (k, v) in user_map {
                out.insert(format!("{}{}", cognis_core::KEY_PREFIX_USER, k), v.clone());
            }
        }
        if let Some(app_map) = self.app_state.read().unwrap().get(&app_name) {
            for (k, v) in app_map {
                out.insert(format!("{}{}", cognis_core::KEY_PREFIX_APP, k), v.clone());
            }
        }
        if let Some(temp_map) = self.temp_state.read().unwrap().get(&session_id) {
            for (k, v) in temp_map {
                out.insert(format!("{}{}", cognis_core::KEY_PREFIX_TEMP, k), v.clone());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cognis_core::{Author, EventType};

    fn service() -> InMemorySessionService {
        InMemorySessionService::new()
    }

    async fn make_session(svc: &InMemorySessionService) -> Session {
        svc.create(CreateRequest {
            app_name: "travel-agent".to_string(),
            user_id: "user-1".to_string(),
            session_id: None,
            state: {
                let mut m = Map::new();
                m.insert("counter".to_string(), Value::from(0));
                m
            },
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_atomic_append_succeeds() {
        let svc = service();
        let session = make_session(&svc).await;

        let mut delta = Map::new();
        delta.insert("counter".to_string(), Value::from(1));
        let event = Event::draft(Author::Assistant, EventType::StateUpdate, Value::from("ok"))
            .with_actions(crate::event::EventActions::with_state_delta(delta));

        let updated = svc.append_event(session.id, session.version, event).await.unwrap();
        assert_eq!(updated.state.get("counter"), Some(&Value::from(1)));
        assert_eq!(updated.version, 2);
        assert_eq!(updated.events.len(), 1);
        assert_eq!(updated.events[0].sequence_num, 1);
    }

    #[tokio::test]
    async fn test_concurrency_conflict_on_stale_version() {
        let svc = service();
        let session = make_session(&svc).await;

        // External writer bumps the version to 2.
        let mut delta = Map::new();
        delta.insert("counter".to_string(), Value::from(1));
        let bump = Event::draft(Author::System, EventType::StateUpdate, Value::Object(Map::new()))
            .with_actions(crate::event::EventActions::with_state_delta(delta));
        svc.append_event(session.id, session.version, bump).await.unwrap();

        // Stale caller still thinks version is 1.
        let mut delta2 = Map::new();
        delta2.insert("counter".to_string(), Value::from(99));
        let event = Event::draft(Author::User, EventType::StateUpdate, Value::Object(Map::new()))
            .with_actions(crate::event::EventActions::with_state_delta(delta2));

        let result = svc.append_event(session.id, session.version, event).await;
        assert!(matches!(result, Err(CognisError::ConcurrencyConflict { .. })));

        let current = svc
            .get(GetRequest { session_id: session.id, num_recent_events: None, after: None })
            .await
            .unwrap();
        assert_eq!(current.state.get("counter"), Some(&Value::from(1)));
        assert_eq!(current.events.len(), 1);
    }

    #[tokio::test]
    async fn test_scope_routing() {
        let svc = service();
        let session = make_session(&svc).await;

        svc.set_state(session.id, "user:language", Value::from("en")).await.unwrap();
        svc.set_state(session.id, "app:max_retries", Value::from(3)).await.unwrap();
        svc.set_state(session.id, "temp:scratch", Value::from("x")).await.unwrap();

        assert_eq!(
            svc.get_state(session.id, "user:language").await.unwrap(),
            Some(Value::from("en"))
        );
        assert_eq!(
            svc.get_state(session.id, "app:max_retries").await.unwrap(),
            Some(Value::from(3))
        );

        let all = svc.get_all_state(session.id).await.unwrap();
        assert_eq!(all.get("user:language"), Some(&Value::from("en")));
        assert_eq!(all.get("app:max_retries"), Some(&Value::from(3)));
        assert_eq!(all.get("temp:scratch"), Some(&Value::from("x")));
        assert_eq!(all.get("counter"), Some(&Value::from(0)));
    }

    #[tokio::test]
    async fn test_temp_state_not_shared_across_sessions() {
        let svc = service();
        let s1 = make_session(&svc).await;
        let s2 = svc
            .create(CreateRequest {
                app_name: "travel-agent".to_string(),
                user_id: "user-1".to_string(),
                session_id: None,
                state: Map::new(),
            })
            .await
            .unwrap();

        svc.set_state(s1.id, "temp:scratch", Value::from("only-s1")).await.unwrap();
        assert_eq!(svc.get_state(s2.id, "temp:scratch").await.unwrap(), None);
    }
}
