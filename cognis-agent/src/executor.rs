use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use cognis_core::{ChatMessage, LanguageModel};
use serde_json::Value;

use crate::tool::ToolRegistry;

/// Terminal and non-terminal states of one `run` call (spec §4.7, "Agent
/// Executor").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    MaxStepsReached,
}

#[derive(Debug, Clone)]
pub struct ThinkingStep {
    pub step_number: u32,
    pub thought: String,
    pub action: Option<String>,
    pub action_input: Option<Value>,
    pub observation: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub final_answer: Option<String>,
    pub steps: Vec<ThinkingStep>,
    pub total_duration_ms: f64,
    pub error: Option<String>,
}

const DEFAULT_MAX_STEPS: u32 = 10;
const DEFAULT_TIMEOUT_SECONDS: f64 = 300.0;

/// Runs a bounded thought/action/observation loop over a language model and
/// a [`ToolRegistry`], one step per LM call (spec §4.7, "Agent Executor").
/// Bounded by both `max_steps` and `timeout_seconds`, whichever triggers
/// first.
pub struct AgentExecutor {
    lm: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    max_steps: u32,
    timeout: Duration,
}

impl AgentExecutor {
    pub fn new(lm: Arc<dyn LanguageModel>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            lm,
            registry,
            max_steps: DEFAULT_MAX_STEPS,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drives the loop: a `Final Answer:` prefix terminates with
    /// `COMPLETED`; otherwise an `Action:`/`Action Input:` pair is parsed
    /// and invoked, with the result fed back as the next step's
    /// observation. A tool exception becomes an `Error: …` observation and
    /// does not terminate the loop (spec §4.7).
    pub async fn run(&self, user_input: &str, run_id: Option<&str>) -> ExecutionResult {
        let start = Instant::now();
        let mut transcript = vec![ChatMessage::user(user_input)];
        let mut steps = Vec::new();

        for step_num in 1..=self.max_steps {
            if start.elapsed() > self.timeout {
                return ExecutionResult {
                    status: ExecutionStatus::Timeout,
                    final_answer: None,
                    steps,
                    total_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                    error: Some("execution timeout".to_string()),
                };
            }

            let completion = match self.lm.complete(&transcript).await {
                Ok(completion) => completion,
                Err(err) => {
                    return ExecutionResult {
                        status: ExecutionStatus::Failed,
                        final_answer: None,
                        steps,
                        total_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                        error: Some(err.to_string()),
                    };
                }
            };

            let ParsedResponse { thought, action, action_input, is_final } = parse_response(&completion.text);
            transcript.push(ChatMessage { role: "assistant".to_string(), content: completion.text.clone() });

            if is_final {
                steps.push(ThinkingStep {
                    step_number: step_num,
                    thought: thought.clone(),
                    action: None,
                    action_input: None,
                    observation: None,
                    timestamp: Utc::now(),
                });
                return ExecutionResult {
                    status: ExecutionStatus::Completed,
                    final_answer: Some(thought),
                    steps,
                    total_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
                    error: None,
                };
            }

            let mut observation = None;
            if let Some(action_name) = &action {
                let params = action_input.clone().unwrap_or_else(|| Value::Object(Default::default()));
                observation = Some(match self.registry.invoke_tool(action_name, params, run_id).await {
                    Ok(result) => result.to_string(),
                    Err(err) => format!("Error: {err}"),
                });
                transcript.push(ChatMessage::user(format!("Observation: {}", observation.as_deref().unwrap_or(""))));
            }

            steps.push(ThinkingStep {
                step_number: step_num,
                thought,
                action,
                action_input,
                observation,
                timestamp: Utc::now(),
            });
        }

        ExecutionResult {
            status: ExecutionStatus::MaxStepsReached,
            final_answer: None,
            steps,
            total_duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            error: Some(format!("max steps ({}) reached", self.max_steps)),
        }
    }
}

struct ParsedResponse {
    thought: String,
    action: Option<String>,
    action_input: Option<Value>,
    is_final: bool,
}

/// Parses one LM turn's raw text (spec §4.7: "a `Final Answer:` prefix
/// terminates the loop ... otherwise an `Action:` and `Action Input:` pair
/// is parsed"; ported from `agent_executor.py::_parse_response`, extended
/// to actually decode the `Action Input:` payload rather than discarding it).
fn parse_response(response: &str) -> ParsedResponse {
    if let Some((_, after)) = response.split_once("Final Answer:") {
        return ParsedResponse { thought: after.trim().to_string(), action: None, action_input: None, is_final: true };
    }

    let thought = response
        .split_once("Thought:")
        .map(|(_, rest)| rest.split("Action:").next().unwrap_or(rest).trim().to_string())
        .unwrap_or_default();

    let action = response.split_once("Action:").map(|(_, rest)| {
        rest.split("Action Input:").next().unwrap_or(rest).trim().to_string()
    });

    let action_input = response.split_once("Action Input:").map(|(_, rest)| {
        let raw = rest.trim();
        serde_json::from_str::<Value>(raw).unwrap_or_else(|_| {
            let mut obj = serde_json::Map::new();
            obj.insert("input".to_string(), Value::String(raw.to_string()));
            Value::Object(obj)
        })
    });

    ParsedResponse { thought, action, action_input, is_final: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cognis_core::{CognisError, Completion, Result, UsageMetadata};
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedLm {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedLm {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<Completion> {
            let mut responses = self.responses.lock().unwrap();
            let text = if responses.is_empty() { "Final Answer: done".to_string() } else { responses.remove(0) };
            Ok(Completion { text, usage: UsageMetadata::default() })
        }
    }

    #[test]
    fn test_parse_final_answer() {
        let parsed = parse_response("Some text... Final Answer: Result");
        assert!(parsed.is_final);
        assert_eq!(parsed.thought, "Result");
    }

    #[test]
    fn test_parse_action_and_input() {
        let parsed = parse_response("Thought: T1\nAction: A1\nAction Input: {\"q\": \"hi\"}");
        assert!(!parsed.is_final);
        assert_eq!(parsed.thought, "T1");
        assert_eq!(parsed.action.as_deref(), Some("A1"));
        assert_eq!(parsed.action_input, Some(json!({"q": "hi"})));
    }

    #[test]
    fn test_parse_action_input_non_json_falls_back_to_string_wrapper() {
        let parsed = parse_response("Action: search\nAction Input: plain text query");
        assert_eq!(parsed.action_input, Some(json!({"input": "plain text query"})));
    }

    #[tokio::test]
    async fn test_run_simple_turn_completes_immediately() {
        let lm = Arc::new(ScriptedLm { responses: Mutex::new(vec!["Final Answer: Hello world".to_string()]) });
        let registry = Arc::new(ToolRegistry::new());
        let executor = AgentExecutor::new(lm, registry);

        let result = executor.run("Hi", None).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.final_answer.as_deref(), Some("Hello world"));
        assert_eq!(result.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_run_with_tool_call() {
        let lm = Arc::new(ScriptedLm {
            responses: Mutex::new(vec![
                "Thought: I need to search.\nAction: search_tool\nAction Input: query".to_string(),
                "Final Answer: Found it.".to_string(),
            ]),
        });
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register_tool("search_tool", "Search", "searches", json!({}), vec![], |_| async move {
                Ok(json!("Search Result 123"))
            })
            .await
            .unwrap();

        let executor = AgentExecutor::new(lm, registry);
        let result = executor.run("Search something", None).await;

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.final_answer.as_deref(), Some("Found it."));
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[0].action.as_deref(), Some("search_tool"));
        assert!(result.steps[0].observation.as_deref().unwrap().contains("Search Result 123"));
    }

    #[tokio::test]
    async fn test_max_steps_reached() {
        let lm = Arc::new(ScriptedLm { responses: Mutex::new(vec!["Thought: loop...".to_string(); 5]) });
        let registry = Arc::new(ToolRegistry::new());
        let executor = AgentExecutor::new(lm, registry).with_max_steps(3);

        let result = executor.run("Loop", None).await;
        assert_eq!(result.status, ExecutionStatus::MaxStepsReached);
        assert_eq!(result.steps.len(), 3);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_tool_error_becomes_observation_not_termination() {
        let lm = Arc::new(ScriptedLm {
            responses: Mutex::new(vec!["Thought: try tool\nAction: fail_tool\nAction Input: {}".to_string()]),
        });
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register_tool("fail_tool", "Fail", "always fails", json!({}), vec![], |_| async move {
                Err(CognisError::Validation("Tool failed".to_string()))
            })
            .await
            .unwrap();

        let executor = AgentExecutor::new(lm, registry).with_max_steps(1);
        let result = executor.run("Fail me", None).await;

        assert_eq!(result.status, ExecutionStatus::MaxStepsReached);
        let step = &result.steps[0];
        assert!(step.observation.as_deref().unwrap().contains("Error: "));
        assert!(step.observation.as_deref().unwrap().contains("Tool failed"));
    }

    #[tokio::test]
    async fn test_timeout() {
        struct DelayedLm;
        #[async_trait]
        impl LanguageModel for DelayedLm {
            async fn complete(&self, _messages: &[ChatMessage]) -> Result<Completion> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Completion { text: "Thought: delay...".to_string(), usage: UsageMetadata::default() })
            }
        }

        let executor = AgentExecutor::new(Arc::new(DelayedLm), Arc::new(ToolRegistry::new()))
            .with_timeout(Duration::from_millis(100));
        let result = executor.run("Timeout test", None).await;
        assert_eq!(result.status, ExecutionStatus::Timeout);
    }
}
