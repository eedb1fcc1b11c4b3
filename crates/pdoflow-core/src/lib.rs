//! # pdoflow-core
//!
//! Data model, failure accounting, and function registry shared between
//! the PostgreSQL-backed dispatcher (`pdoflow-postgres`) and the operator
//! CLI (`pdoflow-cli`).
//!
//! This crate has no database dependency beyond the `sqlx` type mappings
//! needed to round-trip [`JobPosting`] and [`JobRecord`] through query
//! results — the claim protocol, execution loop, and pool supervisor all
//! live in `pdoflow-postgres`. Keeping this crate IO-free means the
//! failure-accounting and progress-math invariants can be unit tested
//! without a running Postgres instance.

mod config;
mod error;
mod failure_cache;
mod model;
mod registry;
mod status;

pub use config::DbConfig;
pub use error::PdoflowError;
pub use failure_cache::FailureCache;
pub use model::{JobPosting, JobRecord};
pub use registry::{FunctionRegistry, JobFn};
pub use status::{JobStatus, PostingStatus};

/// Default number of consecutive posting-level failures a single worker
/// will tolerate before blacklisting the posting locally. Matches the
/// original implementation's `ClusterProcess.failure_threshold`.
pub const DEFAULT_FAILURE_THRESHOLD: i32 = 10;

/// Fixed idle sleep between empty claim attempts, per `spec.md` §4.4.
pub const IDLE_POLL_INTERVAL_SECS: u64 = 5;
