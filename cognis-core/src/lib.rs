//! # cognis-core
//!
//! Shared types, error handling, configuration, and provider contracts for
//! the Cognis cognitive engine runtime.
//!
//! ## Overview
//!
//! This crate has no business logic of its own — it is the vocabulary the
//! other `cognis-*` crates share:
//!
//! - [`CognisError`] / [`Result`] — unified error handling
//! - [`Author`] / [`EventType`] — tagged-variant identifiers for events
//! - [`Scope`] / [`parse_state_key`] — prefix-based state routing
//! - [`CognisConfig`] — process-wide configuration
//! - [`LanguageModel`] / [`Embedder`] / [`Reranker`] — external collaborator
//!   contracts for whatever LLM, embedding, and reranking backends the
//!   caller wires in
//!
//! State uses typed prefixes for organization, same convention the session
//! engine routes on:
//!
//! - `user:` — persists across sessions for a given user
//! - `app:` — shared across all sessions for an app
//! - `temp:` — cleared at the end of a turn

pub mod config;
pub mod error;
pub mod model;
pub mod types;

pub use config::CognisConfig;
pub use error::{CognisError, Result};
pub use model::{ChatMessage, Completion, Embedder, LanguageModel, Reranker, UsageMetadata};
pub use types::{
    Author, EventType, Scope, parse_state_key, KEY_PREFIX_APP, KEY_PREFIX_TEMP, KEY_PREFIX_USER,
};
