//! # pdoflow-postgres
//!
//! The PostgreSQL-backed half of PDOFlow: the claim protocol, the
//! per-job execution loop, the worker pool supervisor, progress
//! polling, the submission helper, and the connection-ownership guard.
//!
//! Everything in this crate is described in `spec.md` §4 and
//! `SPEC_FULL.md` §4; `pdoflow-core` holds the parts of the system that
//! do not need a database connection to be correct.

pub mod claim;
pub mod guard;
pub mod poll;
pub mod pool;
pub mod submission;
pub mod worker;

pub use claim::ClaimStore;
pub use guard::connection_guarded_pool;
pub use poll::{poll_job_status_count, poll_posting, poll_posting_percent, PostingSnapshot};
pub use pool::ClusterPool;
pub use submission::{post_work, PostedBatch};
pub use worker::ClusterWorker;
