//! Keeps a local SQLite copy of trading post daily history in step with the
//! remote source, downloading only what is missing.

use std::sync::Arc;

use chrono::{DateTime, Utc};

mod cache;
mod config;
mod error;
pub mod freshness;
pub mod merge;
pub mod planner;
mod report;

pub use cache::HistoryCache;
pub use config::{SyncConfig, DEFAULT_CHUNK_SIZE, GLOB_OF_ECTOPLASM};
pub use error::SyncError;
pub use freshness::{Freshness, FreshnessResolver};
pub use merge::MergeWriter;
pub use planner::{plan, Chunk, SyncPlan};
pub use report::{BatchReport, PopulateOutcome, SyncOutcome, UnitKind, UnitReport};

/// Source of "now". Replaced in tests to pin the remote probe window.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Always reports `at`.
pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}
