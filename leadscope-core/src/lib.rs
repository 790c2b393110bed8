//! # leadscope-core
//!
//! Core library for leadscope - FDD engagement telemetry and lead insight.
//!
//! This library provides:
//! - Viewer-side telemetry: activity monitoring, a gated accumulator, and
//!   a flush scheduler with debounced/periodic/on-hide/beacon paths
//! - Ingestion with commutative merge semantics (max/union/OR)
//! - Per-lead aggregation and engagement tier classification
//! - Insight generation: deterministic templates with an optional
//!   AI-backed strategy that always falls back to templates
//! - Configuration, storage, and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows one way:
//!
//! ```text
//! ActivityMonitor -> TelemetryAccumulator -> PersistenceScheduler
//!     -> ingestion (merge upsert) -> EngagementAggregator
//!     -> TierClassifier -> InsightGenerator -> caller
//! ```
//!
//! The stored sessions are the only durable state; aggregates, tiers, and
//! focus areas are derived on read, and insight reports are a regenerable
//! cache keyed by a prompt hash.

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use store::Database;
pub use tier::{classify, EngagementTier};
pub use types::*;

// Public modules
pub mod aggregate;
pub mod config;
pub mod error;
pub mod format;
pub mod insight;
pub mod logging;
pub mod store;
pub mod telemetry;
pub mod tier;
pub mod types;
