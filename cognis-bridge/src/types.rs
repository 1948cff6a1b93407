use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed vocabulary the bridge maps database rows into (spec §4.2).
/// Not every variant is ever emitted by this crate — `StepStarted` and
/// friends exist so higher layers (the agent executor) can synthesize
/// additional events on the same wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentEventType {
    RunStarted,
    RunFinished,
    RunError,
    StepStarted,
    StepFinished,
    TextMessageStart,
    TextMessageContent,
    TextMessageEnd,
    ToolCallStart,
    ToolCallArgs,
    ToolCallEnd,
    StateSnapshot,
    StateDelta,
    MessagesSnapshot,
    Raw,
    Custom,
}

impl AgentEventType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEventType::RunFinished | AgentEventType::RunError)
    }
}

/// A semantic event on the wire. Serializes to the flat shape spec §6
/// describes: `{type, runId, timestamp, ...data}`.
#[derive(Debug, Clone)]
pub struct AgentEvent {
    pub event_type: AgentEventType,
    pub run_id: String,
    pub timestamp: f64,
    pub data: Map<String, Value>,
}

impl AgentEvent {
    pub fn new(event_type: AgentEventType, run_id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            event_type,
            run_id: run_id.into(),
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            data,
        }
    }

    pub fn heartbeat(run_id: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("name".to_string(), Value::from("heartbeat"));
        Self::new(AgentEventType::Custom, run_id, data)
    }

    /// Serializes to the JSON payload the spec's wire format describes.
    pub fn to_json(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("type".to_string(), serde_json::to_value(self.event_type).unwrap());
        payload.insert("runId".to_string(), Value::from(self.run_id.clone()));
        payload.insert("timestamp".to_string(), Value::from(self.timestamp));
        for (k, v) in &self.data {
            payload.insert(k.clone(), v.clone());
        }
        Value::Object(payload)
    }

    /// Frames the event as a server-sent event: `data: {json}\n\n`.
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_sse_framing() {
        let event = AgentEvent::new(AgentEventType::RunStarted, "run-1", Map::new());
        let sse = event.to_sse();
        assert!(sse.starts_with("data: "));
        assert!(sse.ends_with("\n\n"));
        assert!(sse.contains("\"type\":\"RUN_STARTED\""));
        assert!(sse.contains("\"runId\":\"run-1\""));
    }

    #[test]
    fn test_heartbeat_is_custom_with_name() {
        let hb = AgentEvent::heartbeat("run-1");
        assert_eq!(hb.event_type, AgentEventType::Custom);
        assert_eq!(hb.data.get("name"), Some(&Value::from("heartbeat")));
    }

    #[test]
    fn test_is_terminal() {
        assert!(AgentEventType::RunFinished.is_terminal());
        assert!(AgentEventType::RunError.is_terminal());
        assert!(!AgentEventType::TextMessageContent.is_terminal());
    }
}
