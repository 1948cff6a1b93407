use serde_json::{Map, Value};

/// In-process view over a session's state map. `Session::state` hands out a
/// `&dyn State`; mutation always flows back through `append_event`, never
/// through this trait directly (spec §4.1: "direct SQL mutation is a
/// programming error" — the in-process analogue is "direct map mutation").
pub trait State: Send + Sync {
    fn get(&self, key: &str) -> Option<&Value>;
    fn all(&self) -> &Map<String, Value>;
}

impl State for Map<String, Value> {
    fn get(&self, key: &str) -> Option<&Value> {
        Map::get(self, key)
    }

    fn all(&self) -> &Map<String, Value> {
        self
    }
}

/// Shallow key overlay: nested values are replaced wholesale, never deep
/// merged (spec §4.1, step 1).
pub fn merge_state(base: &Map<String, Value>, delta: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (k, v) in delta {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_state_shallow_overlay() {
        let mut base = Map::new();
        base.insert("counter".to_string(), Value::from(1));
        base.insert("nested".to_string(), serde_json::json!({"a": 1, "b": 2}));

        let mut delta = Map::new();
        delta.insert("counter".to_string(), Value::from(2));
        delta.insert("nested".to_string(), serde_json::json!({"a": 9}));

        let merged = merge_state(&base, &delta);
        assert_eq!(merged.get("counter"), Some(&Value::from(2)));
        // nested replaced wholesale, not deep-merged: "b" must be gone.
        assert_eq!(merged.get("nested"), Some(&serde_json::json!({"a": 9})));
    }

    #[test]
    fn test_merge_state_empty_delta_is_noop() {
        let mut base = Map::new();
        base.insert("x".to_string(), Value::from(1));
        let merged = merge_state(&base, &Map::new());
        assert_eq!(merged, base);
    }
}
