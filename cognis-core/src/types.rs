use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Who produced an event. Closed set per spec §3 ("Event").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Assistant,
    Tool,
    System,
}

impl Author {
    pub fn as_str(&self) -> &'static str {
        match self {
            Author::User => "user",
            Author::Assistant => "assistant",
            Author::Tool => "tool",
            Author::System => "system",
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The event's kind. The set is open (spec: "message | tool_call | state_update | …"),
/// so unrecognized values round-trip through `Custom` rather than being rejected.
///
/// `Custom` carries the original string, so it can't use `#[serde(other)]`
/// (serde only allows that attribute on a unit variant); `Serialize`/
/// `Deserialize` are implemented by hand instead, both going through
/// [`EventType::as_str`] so the wire form is always a bare string rather
/// than a tagged object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    Message,
    ToolCall,
    StateUpdate,
    Custom(String),
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "message" => EventType::Message,
            "tool_call" => EventType::ToolCall,
            "state_update" => EventType::StateUpdate,
            _ => EventType::Custom(s),
        })
    }
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Message => "message",
            EventType::ToolCall => "tool_call",
            EventType::StateUpdate => "state_update",
            EventType::Custom(s) => s,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Scope prefixes recognized by the state-key parser (spec §4.1 "Prefix routing").
pub const KEY_PREFIX_USER: &str = "user:";
pub const KEY_PREFIX_APP: &str = "app:";
pub const KEY_PREFIX_TEMP: &str = "temp:";

/// Which store a state key resolves to, after stripping its scope prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Session,
    User,
    App,
    Temp,
}

/// Parses a raw state key into its scope and the key with the prefix stripped.
///
/// A single parse-once helper, as called for in spec §9 ("Prefix-based scope
/// routing") — no dynamic dispatch through a base class, just a match on the
/// returned `Scope`.
pub fn parse_state_key(key: &str) -> (Scope, &str) {
    if let Some(rest) = key.strip_prefix(KEY_PREFIX_USER) {
        (Scope::User, rest)
    } else if let Some(rest) = key.strip_prefix(KEY_PREFIX_APP) {
        (Scope::App, rest)
    } else if let Some(rest) = key.strip_prefix(KEY_PREFIX_TEMP) {
        (Scope::Temp, rest)
    } else {
        (Scope::Session, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_key_prefixes() {
        assert_eq!(parse_state_key("user:language"), (Scope::User, "language"));
        assert_eq!(parse_state_key("app:max_retries"), (Scope::App, "max_retries"));
        assert_eq!(parse_state_key("temp:cache"), (Scope::Temp, "cache"));
        assert_eq!(parse_state_key("task_progress"), (Scope::Session, "task_progress"));
    }

    #[test]
    fn test_event_type_custom_roundtrip() {
        let custom = EventType::Custom("heartbeat".into());
        let json = serde_json::to_string(&custom).unwrap();
        assert_eq!(json, "\"heartbeat\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, custom);
    }

    #[test]
    fn test_event_type_known_variant_roundtrip() {
        let json = serde_json::to_string(&EventType::ToolCall).unwrap();
        assert_eq!(json, "\"tool_call\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventType::ToolCall);
    }

    #[test]
    fn test_event_type_known_variants() {
        assert_eq!(EventType::Message.as_str(), "message");
        assert_eq!(EventType::ToolCall.as_str(), "tool_call");
        assert_eq!(EventType::StateUpdate.as_str(), "state_update");
    }

    #[test]
    fn test_author_display() {
        assert_eq!(Author::Assistant.to_string(), "assistant");
    }
}
