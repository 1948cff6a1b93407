use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use cognis_core::{CognisError, Result};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::repository::ToolRepository;

type ToolHandler =
    Box<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Metadata row for one tool (spec §4.7, "Tool Registry persists tool
/// metadata"). Mirrored to a `tools` table row when the registry is built
/// with [`ToolRegistry::with_repository`]; `call_count`/`average_latency_ms`
/// are updated after every invocation, everything else only on
/// `register_tool`.
#[derive(Debug, Clone)]
pub struct ToolMetadata {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub parameters_schema: Value,
    pub permissions: Vec<String>,
    pub active: bool,
    pub call_count: u64,
    pub average_latency_ms: f64,
}

impl ToolMetadata {
    fn new(name: impl Into<String>, display_name: impl Into<String>, description: impl Into<String>, parameters_schema: Value, permissions: Vec<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            parameters_schema,
            permissions,
            active: true,
            call_count: 0,
            average_latency_ms: 0.0,
        }
    }

    /// Incremental mean, so the full latency history never needs to be
    /// retained (spec §4.7, "rolling average latency").
    fn record_latency(&mut self, elapsed_ms: f64) {
        self.call_count += 1;
        self.average_latency_ms += (elapsed_ms - self.average_latency_ms) / self.call_count as f64;
    }
}

struct RegisteredTool {
    handler: ToolHandler,
    metadata: std::sync::Mutex<ToolMetadata>,
}

/// Hot-registerable name-to-callable map with call-count/latency
/// bookkeeping (spec §4.7, "Tool Registry & Agent Executor"). A tool
/// registered mid-run is callable on the very next `invoke_tool` — there is
/// no separate activation step, matching the ADK's `FunctionTool` pattern
/// of wrapping a boxed async closure directly.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<RegisteredTool>>>,
    repository: Option<Arc<dyn ToolRepository>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose `register_tool`/`invoke_tool` write through to
    /// `repository` (spec §4.7: "upserts both the database row and the
    /// in-memory callable"). The in-process map stays authoritative for
    /// dispatch; the repository only mirrors metadata and stats.
    pub fn with_repository(repository: Arc<dyn ToolRepository>) -> Self {
        Self { tools: RwLock::new(HashMap::new()), repository: Some(repository) }
    }

    /// Upserts both the metadata row and the in-memory callable (spec
    /// §4.7: "hot update: a new tool is callable on the next invocation
    /// without restart"). The database write (if a repository is
    /// configured) happens before the in-memory insert returns, so a
    /// caller that awaits `register_tool` sees both sides committed.
    pub async fn register_tool<F, Fut>(
        &self,
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        permissions: Vec<String>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let name = name.into();
        let metadata = ToolMetadata::new(name.clone(), display_name, description, parameters_schema, permissions);

        if let Some(repository) = &self.repository {
            repository.upsert(&metadata).await?;
        }

        let registered = Arc::new(RegisteredTool {
            handler: Box::new(move |args| Box::pin(handler(args))),
            metadata: std::sync::Mutex::new(metadata),
        });
        self.tools.write().await.insert(name, registered);
        Ok(())
    }

    pub async fn deactivate(&self, name: &str) -> Result<()> {
        let tool = {
            let tools = self.tools.read().await;
            tools.get(name).cloned().ok_or_else(|| CognisError::NotFound(format!("tool {name}")))?
        };
        tool.metadata.lock().unwrap().active = false;

        if let Some(repository) = &self.repository {
            repository.set_active(name, false).await?;
        }
        Ok(())
    }

    pub async fn metadata(&self, name: &str) -> Result<ToolMetadata> {
        let tools = self.tools.read().await;
        let tool = tools.get(name).ok_or_else(|| CognisError::NotFound(format!("tool {name}")))?;
        Ok(tool.metadata.lock().unwrap().clone())
    }

    pub async fn list(&self) -> Vec<ToolMetadata> {
        self.tools.read().await.values().map(|t| t.metadata.lock().unwrap().clone()).collect()
    }

    /// Looks up `name`, awaits its handler, and records elapsed time. The
    /// call-count/latency update is spawned rather than awaited — a
    /// fire-and-forget write, so a slow stats update never adds latency to
    /// the caller (spec §4.7: "updates the row's call count and rolling
    /// average latency in a fire-and-forget write").
    pub async fn invoke_tool(&self, name: &str, params: Value, run_id: Option<&str>) -> Result<Value> {
        let registered = {
            let tools = self.tools.read().await;
            tools.get(name).cloned().ok_or_else(|| CognisError::NotFound(format!("tool {name}")))?
        };

        if !registered.metadata.lock().unwrap().active {
            return Err(CognisError::Validation(format!("tool {name} is deactivated")));
        }

        debug!(tool = name, run_id = ?run_id, "invoking tool");
        let start = Instant::now();
        let result = (registered.handler)(params).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let repository = self.repository.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            registered.metadata.lock().unwrap().record_latency(elapsed_ms);
            if let Some(repository) = repository {
                if let Err(err) = repository.record_invocation(&name, elapsed_ms).await {
                    warn!(tool = %name, error = %err, "failed to persist tool invocation stats");
                }
            }
        });

        if let Err(ref err) = result {
            warn!(tool = %name, error = %err, "tool invocation failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingRepository {
        upserts: StdMutex<Vec<String>>,
        invocations: StdMutex<Vec<(String, f64)>>,
    }

    #[async_trait::async_trait]
    impl ToolRepository for RecordingRepository {
        async fn upsert(&self, metadata: &ToolMetadata) -> Result<()> {
            self.upserts.lock().unwrap().push(metadata.name.clone());
            Ok(())
        }

        async fn set_active(&self, _name: &str, _active: bool) -> Result<()> {
            Ok(())
        }

        async fn record_invocation(&self, name: &str, elapsed_ms: f64) -> Result<()> {
            self.invocations.lock().unwrap().push((name.to_string(), elapsed_ms));
            Ok(())
        }

        async fn get(&self, _name: &str) -> Result<Option<ToolMetadata>> {
            Ok(None)
        }

        async fn list(&self) -> Result<Vec<ToolMetadata>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_register_writes_through_to_repository() {
        let repository = Arc::new(RecordingRepository::default());
        let registry = ToolRegistry::with_repository(repository.clone());
        registry.register_tool("echo", "Echo", "echoes input", json!({}), vec![], |params| async move { Ok(params) }).await.unwrap();

        assert_eq!(repository.upserts.lock().unwrap().as_slice(), ["echo"]);
    }

    #[tokio::test]
    async fn test_invoke_records_stats_to_repository() {
        let repository = Arc::new(RecordingRepository::default());
        let registry = ToolRegistry::with_repository(repository.clone());
        registry.register_tool("echo", "Echo", "echoes input", json!({}), vec![], |params| async move { Ok(params) }).await.unwrap();

        registry.invoke_tool("echo", json!({}), None).await.unwrap();
        // the stats write is fire-and-forget; give the spawned task a turn.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let invocations = repository.invocations.lock().unwrap();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].0, "echo");
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let registry = ToolRegistry::new();
        registry
            .register_tool("echo", "Echo", "echoes input", json!({}), vec![], |params| async move { Ok(params) })
            .await
            .unwrap();

        let result = registry.invoke_tool("echo", json!({"x": 1}), None).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.invoke_tool("nope", json!({}), None).await.unwrap_err();
        assert!(matches!(err, CognisError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_hot_registration_overwrites_existing() {
        let registry = ToolRegistry::new();
        registry.register_tool("tool", "T", "v1", json!({}), vec![], |_| async move { Ok(json!("v1")) }).await.unwrap();
        registry.register_tool("tool", "T", "v2", json!({}), vec![], |_| async move { Ok(json!("v2")) }).await.unwrap();

        let result = registry.invoke_tool("tool", json!({}), None).await.unwrap();
        assert_eq!(result, json!("v2"));
    }

    #[tokio::test]
    async fn test_deactivated_tool_is_rejected() {
        let registry = ToolRegistry::new();
        registry.register_tool("tool", "T", "d", json!({}), vec![], |_| async move { Ok(json!(null)) }).await.unwrap();
        registry.deactivate("tool").await.unwrap();
        let err = registry.invoke_tool("tool", json!({}), None).await.unwrap_err();
        assert!(matches!(err, CognisError::Validation(_)));
    }

    #[tokio::test]
    async fn test_tool_error_is_propagated() {
        let registry = ToolRegistry::new();
        registry
            .register_tool("boom", "Boom", "fails", json!({}), vec![], |_| async move {
                Err(CognisError::Validation("bad params".to_string()))
            })
            .await
            .unwrap();
        let err = registry.invoke_tool("boom", json!({}), None).await.unwrap_err();
        assert!(matches!(err, CognisError::Validation(_)));
    }
}
