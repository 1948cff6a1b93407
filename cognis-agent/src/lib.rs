//! # cognis-agent
//!
//! Tool registry and bounded agent executor: a hot-updatable name-to-callable
//! map with call-count/latency bookkeeping, and a thought/action/observation
//! loop bounded by both step count and wall time.
//!
//! ## Overview
//!
//! - [`ToolRegistry`] — `register_tool` / `invoke_tool`
//! - [`ToolRepository`] / [`PgToolRepository`] (feature `postgres`) — the
//!   persisted metadata row a registry optionally writes through to
//! - [`AgentExecutor`] — the bounded ReAct-style loop
//! - [`ExecutionResult`] / [`ExecutionStatus`] / [`ThinkingStep`] — the
//!   outcome of one `run`

pub mod executor;
pub mod repository;
pub mod tool;

pub use executor::{AgentExecutor, ExecutionResult, ExecutionStatus, ThinkingStep};
pub use repository::ToolRepository;
pub use tool::{ToolMetadata, ToolRegistry};

#[cfg(feature = "postgres")]
pub use repository::PgToolRepository;
