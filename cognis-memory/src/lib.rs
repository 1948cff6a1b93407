//! # cognis-memory
//!
//! Memory consolidation and retention management: distills session event
//! logs into searchable [`Memory`] and [`Fact`] rows, then scores, decays,
//! and prunes them under a forgetting curve.
//!
//! ## Overview
//!
//! - [`InMemoryMemoryRepository`] — reference backend for tests and local dev
//! - [`DatabaseMemoryRepository`] (feature `postgres`) — the production backend
//! - [`Memory`] / [`Fact`] / [`ConsolidationJob`] — the persisted shapes
//! - [`MemoryRepository`] / [`JobRepository`] — the traits custom backends implement
//! - [`ConsolidationWorker`] — Fast Replay / Deep Reflection / Full Consolidation
//! - [`RetentionManager`] — scoring, decay, and cleanup

pub mod consolidation;
pub mod inmemory;
pub mod repository;
pub mod retention;
pub mod types;

#[cfg(feature = "postgres")]
pub mod database;

pub use consolidation::{strip_code_fence, ConsolidationWorker, JobRepository, DEFAULT_EVENT_WINDOW};
pub use inmemory::InMemoryMemoryRepository;
pub use repository::{MemoryFilter, MemoryRepository, RetentionDistribution};
pub use retention::{score, CleanupStats, RetentionManager, HIGH_THRESHOLD, MEDIUM_THRESHOLD, SQL_RETENTION_FUNCTION};
pub use types::{ConsolidationJob, Fact, FactType, JobStatus, JobType, Memory, MemoryType};

#[cfg(feature = "postgres")]
pub use database::DatabaseMemoryRepository;
