use serde::Deserialize;
use serde_json::{Map, Value};

use crate::types::{AgentEvent, AgentEventType};

/// Raw NOTIFY payload shape emitted by the database triggers (spec §4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyPayload {
    pub table: String,
    pub operation: String,
    pub data: Map<String, Value>,
}

fn row_str(row: &Map<String, Value>, key: &str) -> Option<String> {
    row.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Translates one NOTIFY payload into at most one semantic event, per the
/// closed mapping table in spec §4.2. Unknown table/operation pairs yield
/// `None` and are silently dropped.
pub fn convert_to_agent_event(payload: &NotifyPayload) -> Option<AgentEvent> {
    let row = &payload.data;
    let run_id = row_str(row, "run_id").or_else(|| row_str(row, "id"))?;

    match (payload.table.as_str(), payload.operation.as_str()) {
        ("runs", "INSERT") => {
            let mut data = Map::new();
            if let Some(thread_id) = row.get("thread_id") {
                data.insert("threadId".to_string(), thread_id.clone());
            }
            Some(AgentEvent::new(AgentEventType::RunStarted, run_id, data))
        }
        ("runs", "UPDATE") => match row.get("status").and_then(|v| v.as_str()) {
            Some("completed") => {
                let mut data = Map::new();
                data.insert("status".to_string(), Value::from("completed"));
                Some(AgentEvent::new(AgentEventType::RunFinished, run_id, data))
            }
            Some("failed") => {
                let mut data = Map::new();
                if let Some(error) = row.get("error") {
                    data.insert("error".to_string(), error.clone());
                }
                Some(AgentEvent::new(AgentEventType::RunError, run_id, data))
            }
            _ => None,
        },
        ("events", "INSERT") => match row.get("event_type").and_then(|v| v.as_str()) {
            Some("message") => {
                let delta = row
                    .get("content")
                    .and_then(|c| c.get("text"))
                    .cloned()
                    .unwrap_or_else(|| Value::from(""));
                let mut data = Map::new();
                if let Some(id) = row.get("id") {
                    data.insert("messageId".to_string(), id.clone());
                }
                data.insert("delta".to_string(), delta);
                Some(AgentEvent::new(AgentEventType::TextMessageContent, run_id, data))
            }
            Some("tool_call") => {
                let tool_name = row.get("content").and_then(|c| c.get("tool_name")).cloned();
                let mut data = Map::new();
                if let Some(id) = row.get("id") {
                    data.insert("toolCallId".to_string(), id.clone());
                }
                if let Some(tool_name) = tool_name {
                    data.insert("toolCallName".to_string(), tool_name);
                }
                Some(AgentEvent::new(AgentEventType::ToolCallStart, run_id, data))
            }
            _ => None,
        },
        ("threads", "UPDATE") if row.contains_key("state") => {
            let mut data = Map::new();
            data.insert(
                "delta".to_string(),
                row.get("state_delta").cloned().unwrap_or_else(|| Value::Array(Vec::new())),
            );
            Some(AgentEvent::new(AgentEventType::StateDelta, run_id, data))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(table: &str, operation: &str, data: Value) -> NotifyPayload {
        NotifyPayload {
            table: table.to_string(),
            operation: operation.to_string(),
            data: match data {
                Value::Object(m) => m,
                _ => Map::new(),
            },
        }
    }

    #[test]
    fn test_runs_insert_maps_to_run_started() {
        let p = payload("runs", "INSERT", json!({"id": "run-1", "thread_id": "t-1"}));
        let event = convert_to_agent_event(&p).unwrap();
        assert_eq!(event.event_type, AgentEventType::RunStarted);
        assert_eq!(event.run_id, "run-1");
        assert_eq!(event.data.get("threadId"), Some(&Value::from("t-1")));
    }

    #[test]
    fn test_runs_update_completed_maps_to_run_finished() {
        let p = payload("runs", "UPDATE", json!({"id": "run-1", "status": "completed"}));
        let event = convert_to_agent_event(&p).unwrap();
        assert_eq!(event.event_type, AgentEventType::RunFinished);
    }

    #[test]
    fn test_runs_update_failed_maps_to_run_error_with_error() {
        let p = payload("runs", "UPDATE", json!({"id": "run-1", "status": "failed", "error": "boom"}));
        let event = convert_to_agent_event(&p).unwrap();
        assert_eq!(event.event_type, AgentEventType::RunError);
        assert_eq!(event.data.get("error"), Some(&Value::from("boom")));
    }

    #[test]
    fn test_events_insert_message_maps_to_text_message_content() {
        let p = payload(
            "events",
            "INSERT",
            json!({"id": "e-1", "run_id": "run-1", "event_type": "message", "content": {"text": "hi"}}),
        );
        let event = convert_to_agent_event(&p).unwrap();
        assert_eq!(event.event_type, AgentEventType::TextMessageContent);
        assert_eq!(event.data.get("delta"), Some(&Value::from("hi")));
    }

    #[test]
    fn test_threads_update_without_state_yields_none() {
        let p = payload("threads", "UPDATE", json!({"id": "run-1"}));
        assert!(convert_to_agent_event(&p).is_none());
    }

    #[test]
    fn test_unknown_table_operation_yields_none() {
        let p = payload("traces", "INSERT", json!({"id": "x"}));
        assert!(convert_to_agent_event(&p).is_none());
    }

    #[test]
    fn test_missing_run_id_yields_none() {
        let p = payload("runs", "INSERT", json!({"status": "ok"}));
        assert!(convert_to_agent_event(&p).is_none());
    }
}
