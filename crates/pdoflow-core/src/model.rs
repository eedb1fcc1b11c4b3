use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::status::{JobStatus, PostingStatus};

/// One submitted batch of work. See `spec.md` §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobPosting {
    pub id: Uuid,
    pub created_on: DateTime<Utc>,
    pub poster: String,
    pub status: PostingStatus,
    pub target_function: String,
    pub entry_point: String,
}

impl JobPosting {
    /// `total_jobs`, `total_jobs_done`, and `percent_done` computed
    /// in-process over a fetched batch of this posting's records. The
    /// SQL-side equivalent lives in `pdoflow_postgres::claim` as a
    /// `SELECT` expression over the same definition, and the two are
    /// exercised against each other in integration tests.
    pub fn total_jobs(records: &[JobRecord]) -> usize {
        records.len()
    }

    pub fn total_jobs_done(records: &[JobRecord]) -> usize {
        records.iter().filter(|r| r.done()).count()
    }

    /// `(done / total) * 100`, or `NaN` when there are no jobs — never
    /// `0.0`, which is reserved for "posting does not exist" in the
    /// polling API (`spec.md` §4.5 / §7).
    pub fn percent_done(records: &[JobRecord]) -> f64 {
        let total = Self::total_jobs(records);
        if total == 0 {
            return f64::NAN;
        }
        (Self::total_jobs_done(records) as f64 / total as f64) * 100.0
    }
}

/// One executable unit within a posting. See `spec.md` §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobRecord {
    pub id: Uuid,
    pub created_on: DateTime<Utc>,
    pub posting_id: Uuid,
    pub priority: i32,
    pub positional_arguments: serde_json::Value,
    pub keyword_arguments: Option<serde_json::Value>,
    pub tries_remaining: i32,
    pub status: JobStatus,
    pub exited_ok: Option<bool>,
    pub work_started_on: Option<DateTime<Utc>>,
    pub completed_on: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// `true` for `Done` and `ErroredOut`.
    pub fn done(&self) -> bool {
        self.status.is_terminal()
    }

    /// `work_started_on - created_on`, or `None` if work has not
    /// started yet.
    pub fn waiting_time(&self) -> Option<Duration> {
        self.work_started_on.map(|started| started - self.created_on)
    }

    /// `completed_on - work_started_on`, substituting "now" for
    /// whichever endpoint is still `None` — matches the original's
    /// hybrid property so in-flight jobs report a live elapsed time.
    pub fn time_elapsed(&self) -> Option<Duration> {
        let started = self.work_started_on?;
        let completed = self.completed_on.unwrap_or_else(Utc::now);
        Some(completed - started)
    }

    /// Is this record eligible to be claimed right now, ignoring the
    /// posting's own status and the worker's local blacklist (those are
    /// applied by the claim query and the execution loop respectively)?
    pub fn is_individually_claimable(&self) -> bool {
        self.status == JobStatus::Waiting && self.tries_remaining > 0
    }

    /// Apply the "terminally failed" transition from `spec.md` §4.2:
    /// `status = ErroredOut`, `exited_ok = false`, `tries_remaining = 0`,
    /// `completed_on = now`.
    pub fn mark_terminally_failed(&mut self) {
        self.status = JobStatus::ErroredOut;
        self.exited_ok = Some(false);
        self.tries_remaining = 0;
        self.completed_on = Some(Utc::now());
    }

    /// Apply the "retry" transition: decrement `tries_remaining`, reset
    /// status to `Waiting` so another worker may attempt it, clear the
    /// timestamps a fresh attempt will re-stamp.
    pub fn mark_for_retry(&mut self) {
        self.tries_remaining -= 1;
        self.status = JobStatus::Waiting;
        self.work_started_on = None;
        self.completed_on = None;
    }

    /// Apply the "transient failure" transition from `spec.md` §4.2
    /// step 7: revert to `Waiting` without consuming a try.
    pub fn revert_after_transient_failure(&mut self) {
        self.status = JobStatus::Waiting;
        self.work_started_on = None;
        self.completed_on = None;
    }

    /// Apply the successful-completion transition.
    pub fn mark_succeeded(&mut self) {
        self.status = JobStatus::Done;
        self.exited_ok = Some(true);
        self.completed_on = Some(Utc::now());
    }
}
