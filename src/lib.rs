//! # benchwatch
//!
//! Activity auditing, anomaly sweeping, and live catalog fanout for the
//! A3S ecosystem.
//!
//! ## Overview
//!
//! `benchwatch` records user actions into an append-only audit trail,
//! periodically sweeps that trail to flag users whose recent activity
//! volume crosses a threshold, and serves read-side activity reports.
//! Alongside the audit pipeline it maintains a live catalog of CPU
//! benchmark entries and fans catalog events out to any number of
//! connected observers. Swap storage backends (file, in-memory, etc.)
//! without changing application code.
//!
//! ## Quick Start
//!
//! ```rust
//! use benchwatch::{ActionKind, AuditRecorder, MemoryAuditStore, MonitorConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> benchwatch::Result<()> {
//! let config = MonitorConfig::default();
//! let store = Arc::new(MemoryAuditStore::new());
//!
//! // Record an action; ingest never fails the caller
//! let recorder = AuditRecorder::new(store.clone(), &config);
//! let accepted = recorder
//!     .record("user-1", ActionKind::Create, "CPU", Some("42".into()), None)
//!     .await;
//!
//! assert!(accepted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! - **memory** — In-memory store for testing and single-process use
//! - **file** — JSONL audit log plus atomically-written flag state
//!
//! ## Architecture
//!
//! - **AuditStore** trait — storage abstraction all backends implement
//! - **AuditRecorder** — fire-and-forget ingest that never fails callers
//! - **AnomalySweeper** — periodic threshold sweep that flags suspicious users
//! - **ActivityQuery** — read-side reports over the audit trail
//! - **FanoutHub** — observer registry with catalog snapshots and broadcasts

pub mod catalog;
pub mod config;
pub mod error;
pub mod hub;
pub mod query;
pub mod recorder;
pub mod store;
pub mod sweep;
pub mod types;

// Re-export core types
pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use query::{ActivityQuery, RECENT_ACTIONS_LIMIT};
pub use recorder::AuditRecorder;
pub use store::{AuditStore, FileAuditStore, MemoryAuditStore};
pub use sweep::{AnomalySweeper, SweepEvent, SweepOutcome};
pub use types::{
    ActionKind, ActionLogPage, ActivityBucket, AuditRecord, CatalogEntry, CatalogPage, HubMessage,
    MonitoredUser, RecordFilter, UserFlag,
};

// Re-export the live catalog side for convenience
pub use catalog::Catalog;
pub use hub::{FanoutHub, ObserverConnection};
