//! # cognis-session
//!
//! Session and state engine: atomic event append with optimistic-concurrency
//! state mutation, and a prefix-based state-scope model.
//!
//! ## Overview
//!
//! - [`InMemorySessionService`] — reference backend for tests and local dev
//! - [`DatabaseSessionService`] (feature `postgres`) — the production backend
//! - [`Session`] / [`Event`] — the persisted shapes
//! - [`SessionService`] — the trait custom backends implement
//! - [`retry::update_session_state`] — optimistic-retry wrapper around
//!   `append_event`
//!
//! ## State Prefixes
//!
//! | Prefix | Target | Persistence |
//! |---|---|---|
//! | none | session state (via atomic append) | yes |
//! | `user:` | per-`(user_id, app_name)` state | yes |
//! | `app:` | per-`app_name` state | yes |
//! | `temp:` | in-process map keyed by session id | no |

pub mod event;
pub mod inmemory;
pub mod retry;
pub mod service;
pub mod session;
pub mod state;

#[cfg(feature = "postgres")]
pub mod database;

pub use event::{Event, EventActions, Events};
pub use inmemory::InMemorySessionService;
pub use retry::update_session_state;
pub use service::{CreateRequest, DeleteRequest, GetRequest, ListRequest, SessionService};
pub use session::Session;
pub use state::{merge_state, State};

#[cfg(feature = "postgres")]
pub use database::DatabaseSessionService;
