//! Postgres-backed `SessionService`. Schema assumed (spec §6): `threads`,
//! `events`, `user_state`, `app_state`, each with triggers emitting on the
//! `event_stream` NOTIFY channel — those triggers live in SQL migrations
//! shipped alongside this crate, not in this file.

use async_trait::async_trait;
use cognis_core::{parse_state_key, CognisError, Result, Scope};
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::event::{Event, EventActions};
use crate::service::{CreateRequest, DeleteRequest, GetRequest, ListRequest, SessionService};
use crate::session::Session;
use crate::state::merge_state;

pub struct DatabaseSessionService {
    pool: PgPool,
}

impl DatabaseSessionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_events(&self, session_id: Uuid) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT id, thread_id, sequence_num, invocation_id, author, event_type, content, actions, created_at \
             FROM events WHERE thread_id = $1 ORDER BY sequence_num ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

        rows.iter().map(row_to_event).collect()
    }

    async fn load_session_row(&self, session_id: Uuid) -> Result<Session> {
        let row = sqlx::query(
            "SELECT id, app_name, user_id, state, version, created_at, updated_at FROM threads WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?
        .ok_or_else(|| CognisError::NotFound(format!("session {session_id}")))?;

        let events = self.load_events(session_id).await?;
        row_to_session(row, events)
    }
}

fn row_to_event(row: &PgRow) -> Result<Event> {
    let content: Value = row.try_get("content").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
    let actions_raw: Value = row.try_get("actions").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
    let author_str: String = row.try_get("author").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
    let event_type_str: String =
        row.try_get("event_type").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

    let actions: EventActions = serde_json::from_value(actions_raw).unwrap_or_default();
    let author = serde_json::from_value(Value::String(author_str))?;
    let event_type = serde_json::from_value(Value::String(event_type_str))?;

    Ok(Event {
        id: row.try_get("id").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
        session_id: row.try_get("thread_id").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
        sequence_num: row.try_get("sequence_num").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
        invocation_id: row.try_get("invocation_id").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
        author,
        event_type,
        content,
        actions,
        created_at: row.try_get("created_at").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
    })
}

fn row_to_session(row: PgRow, events: Vec<Event>) -> Result<Session> {
    let state_raw: Value = row.try_get("state").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
    let state = match state_raw {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    Ok(Session {
        id: row.try_get("id").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
        app_name: row.try_get("app_name").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
        user_id: row.try_get("user_id").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
        state,
        version: row.try_get("version").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
        events,
        created_at: row.try_get("created_at").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?,
    })
}

#[async_trait]
impl SessionService for DatabaseSessionService {
    async fn create(&self, req: CreateRequest) -> Result<Session> {
        let session_id = req.session_id.unwrap_or_else(Uuid::new_v4);
        let state = Value::Object(req.state.clone());

        let row = sqlx::query(
            "INSERT INTO threads (id, app_name, user_id, state, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 1, now(), now()) \
             RETURNING id, app_name, user_id, state, version, created_at, updated_at",
        )
        .bind(session_id)
        .bind(&req.app_name)
        .bind(&req.user_id)
        .bind(state)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

        row_to_session(row, Vec::new())
    }

    async fn get(&self, req: GetRequest) -> Result<Session> {
        let mut session = self.load_session_row(req.session_id).await?;
        if let Some(after) = req.after {
            session.events.retain(|e: &Event| e.created_at > after);
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
        let rows = sqlx::query(
            "SELECT id, app_name, user_id, state, version, created_at, updated_at FROM threads \
             WHERE app_name = $1 AND user_id = $2 ORDER BY updated_at DESC",
        )
        .bind(&req.app_name)
        .bind(&req.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
            let events = self.load_events(id).await?;
            sessions.push(row_to_session(row, events)?);
        }
        Ok(sessions)
    }

    async fn delete(&self, req: DeleteRequest) -> Result<()> {
        // `events` cascades on thread delete (spec §3, "Ownership").
        sqlx::query("DELETE FROM threads WHERE id = $1")
            .bind(req.session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn append_event(
        &self,
        session_id: Uuid,
        expected_version: i64,
        mut event: Event,
    ) -> Result<Session> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

        let new_version = if let Some(delta) = event.actions.state_delta.clone().filter(|d| !d.is_empty()) {
            let current_state: Value = sqlx::query_scalar("SELECT state FROM threads WHERE id = $1")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?
                .ok_or_else(|| CognisError::NotFound(format!("session {session_id}")))?;

            let base = match current_state {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            let merged = merge_state(&base, &delta);

            let updated: Option<(i64,)> = sqlx::query_as(
                "UPDATE threads SET state = $1, version = version + 1, updated_at = now() \
                 WHERE id = $2 AND version = $3 RETURNING version",
            )
            .bind(Value::Object(merged))
            .bind(session_id)
            .bind(expected_version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

            match updated {
                Some((version,)) => version,
                None => {
                    return Err(CognisError::ConcurrencyConflict {
                        session_id: session_id.to_string(),
                        expected: expected_version,
                    })
                }
            }
        } else {
            expected_version
        };

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence_num), 0) + 1 FROM events WHERE thread_id = $1",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

        event.id = Uuid::new_v4();
        event.session_id = session_id;
        event.sequence_num = next_seq;

        sqlx::query(
            "INSERT INTO events (id, thread_id, sequence_num, invocation_id, author, event_type, content, actions, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(event.id)
        .bind(event.session_id)
        .bind(event.sequence_num)
        .bind(&event.invocation_id)
        .bind(event.author.as_str())
        .bind(event.event_type.as_str())
        .bind(&event.content)
        .bind(serde_json::to_value(&event.actions)?)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

        tx.commit().await.map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;

        let _ = new_version;
        self.load_session_row(session_id).await
    }

    async fn get_state(&self, session_id: Uuid, key: &str) -> Result<Option<Value>> {
        let (scope, bare_key) = parse_state_key(key);
        match scope {
            Scope::Session => {
                let session = self.load_session_row(session_id).await?;
                Ok(session.state.get(bare_key).cloned())
            }
            Scope::User => {
                let session = self.load_session_row(session_id).await?;
                let row: Option<(Value,)> = sqlx::query_as(
                    "SELECT state FROM user_state WHERE user_id = $1 AND app_name = $2",
                )
                .bind(&session.user_id)
                .bind(&session.app_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
                Ok(row.and_then(|(v,)| v.get(bare_key).cloned()))
            }
            Scope::App => {
                let session = self.load_session_row(session_id).await?;
                let row: Option<(Value,)> =
                    sqlx::query_as("SELECT state FROM app_state WHERE app_name = $1")
                        .bind(&session.app_name)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
                Ok(row.and_then(|(v,)| v.get(bare_key).cloned()))
            }
            // temp: is never persisted; a process-restart-scoped database
            // service has no in-process map to route to, so it reads as
            // absent by design (spec §4.1, "Failure semantics").
            Scope::Temp => Ok(None),
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
                let session = self.load_session_row(session_id).await?;
                sqlx::query(
                    "INSERT INTO user_state (user_id, app_name, state, updated_at) \
                     VALUES ($1, $2, jsonb_build_object($3::text, $4::jsonb), now()) \
                     ON CONFLICT (user_id, app_name) DO UPDATE \
                     SET state = user_state.state || EXCLUDED.state, updated_at = now()",
                )
                .bind(&session.user_id)
                .bind(&session.app_name)
                .bind(bare_key)
                .bind(&value)
                .execute(&self.pool)
                .await
                .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
            }
            Scope::App => {
                let session = self.load_session_row(session_id).await?;
                sqlx::query(
                    "INSERT INTO app_state (app_name, state, updated_at) \
                     VALUES ($1, jsonb_build_object($2::text, $3::jsonb), now()) \
                     ON CONFLICT (app_name) DO UPDATE \
                     SET state = app_state.state || EXCLUDED.state, updated_at = now()",
                )
                .bind(&session.app_name)
                .bind(bare_key)
                .bind(&value)
                .execute(&self.pool)
                .await
                .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
            }
            Scope::Temp => {
                return Err(CognisError::Validation(
                    "temp: state is process-local and unsupported on a database-backed service"
                        .to_string(),
                ))
            }
        }
        Ok(())
    }

    async fn get_all_state(&self, session_id: Uuid) -> Result<Map<String, Value>> {
        let session = self.load_session_row(session_id).await?;
        let mut out = session.state.clone();

        let user_row: Option<(Value,)> =
            sqlx::query_as("SELECT state FROM user_state WHERE user_id = $1 AND app_name = $2")
                .bind(&session.user_id)
                .bind(&session.app_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
        if let Some((Value::Object(map),)) = user_row {
            for (k, v) in map {
                out.insert(format!("{}{}", cognis_core::KEY_PREFIX_USER, k), v);
            }
        }

        let app_row: Option<(Value,)> = sqlx::query_as("SELECT state FROM app_state WHERE app_name = $1")
            .bind(&session.app_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CognisError::BackendUnavailable(e.to_string()))?;
        if let Some((Value::Object(map),)) = app_row {
            for (k, v) in map {
                out.insert(format!("{}{}", cognis_core::KEY_PREFIX_APP, k), v);
            }
        }

        Ok(out)
    }
}
