//! # cognis-bridge
//!
//! Database-native event bridge: a single long-lived `LISTEN` connection
//! fans `NOTIFY` payloads out to per-run subscriber queues as a standardized
//! semantic event stream (spec §4.2).
//!
//! ## Overview
//!
//! - [`NotifyListener`] — the single long-lived LISTEN connection
//! - [`EventBridge`] — per-run subscription queues, heartbeat, teardown
//! - [`convert_to_agent_event`] — the closed row→event mapping table
//! - [`AgentEvent`] / [`AgentEventType`] — the semantic event and its
//!   closed-plus-extensible vocabulary

pub mod bridge;
pub mod listener;
pub mod mapping;
pub mod types;

pub use bridge::EventBridge;
pub use listener::{NotifyListener, RawNotification};
pub use mapping::{convert_to_agent_event, NotifyPayload};
pub use types::{AgentEvent, AgentEventType};
