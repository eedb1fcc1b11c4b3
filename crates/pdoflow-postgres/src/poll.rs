//! Progress polling: streaming snapshots of posting/job progress, plus
//! blocking-with-deadline helpers built on top. See `spec.md` §4.5.
//!
//! Each stream performs exactly one database read per item pulled —
//! cadence (how long to wait between pulls) is entirely the caller's
//! responsibility, matching the original's generator-based design.
//! The `await_*` helpers are the one piece of this module that do
//! their own sleeping, since they exist specifically to turn a stream
//! into a single blocking call.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Stream;
use pdoflow_core::{JobStatus, PdoflowError, PostingStatus};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// One snapshot yielded by [`poll_posting`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostingSnapshot {
    pub query_time: DateTime<Utc>,
    pub total_jobs: i64,
    pub total_jobs_done: i64,
    pub status: PostingStatus,
}

#[derive(FromRow)]
struct ProgressRow {
    status: PostingStatus,
    total_jobs: i64,
    total_jobs_done: i64,
}

async fn fetch_progress(pool: &PgPool, posting_id: Uuid) -> Result<Option<ProgressRow>, PdoflowError> {
    let row = sqlx::query_as::<_, ProgressRow>(
        r#"
        SELECT
            jp.status AS status,
            COUNT(jr.id) AS total_jobs,
            COUNT(jr.id) FILTER (WHERE jr.status IN ('done', 'errored_out')) AS total_jobs_done
        FROM job_postings jp
        LEFT JOIN job_records jr ON jr.posting_id = jp.id
        WHERE jp.id = $1
        GROUP BY jp.id, jp.status
        "#,
    )
    .bind(posting_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Yields `(query_time, total_jobs, total_jobs_done, status)` while the
/// posting's status is `Executing`. If a pull observes
/// `total_jobs_done >= total_jobs` (and the posting has at least one
/// job), finalizes the posting to `Finished` and terminates the
/// stream. Terminates without yielding if the posting does not exist
/// (`spec.md` §7: "Missing posting in a poller").
pub fn poll_posting(
    pool: PgPool,
    posting_id: Uuid,
) -> impl Stream<Item = Result<PostingSnapshot, PdoflowError>> {
    async_stream::try_stream! {
        loop {
            let Some(row) = fetch_progress(&pool, posting_id).await? else {
                break;
            };

            if row.status != PostingStatus::Executing {
                break;
            }

            yield PostingSnapshot {
                query_time: Utc::now(),
                total_jobs: row.total_jobs,
                total_jobs_done: row.total_jobs_done,
                status: row.status,
            };

            if row.total_jobs > 0 && row.total_jobs_done >= row.total_jobs {
                sqlx::query("UPDATE job_postings SET status = $2 WHERE id = $1")
                    .bind(posting_id)
                    .bind(PostingStatus::Finished)
                    .execute(&pool)
                    .await?;
                break;
            }
        }
    }
}

/// Yields the posting's completion percentage forever (the stream
/// never terminates on its own — the caller stops pulling). `NaN` for
/// a posting with no jobs; `0.0` for a posting that does not exist.
pub fn poll_posting_percent(
    pool: PgPool,
    posting_id: Uuid,
) -> impl Stream<Item = Result<f64, PdoflowError>> {
    async_stream::try_stream! {
        loop {
            let percent = match fetch_progress(&pool, posting_id).await? {
                None => 0.0,
                Some(row) if row.total_jobs == 0 => f64::NAN,
                Some(row) => (row.total_jobs_done as f64 / row.total_jobs as f64) * 100.0,
            };
            yield percent;
        }
    }
}

/// Yields the count of this posting's jobs in `status` forever.
pub fn poll_job_status_count(
    pool: PgPool,
    posting_id: Uuid,
    status: JobStatus,
) -> impl Stream<Item = Result<i64, PdoflowError>> {
    async_stream::try_stream! {
        loop {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM job_records WHERE posting_id = $1 AND status = $2",
            )
            .bind(posting_id)
            .bind(status)
            .fetch_one(&pool)
            .await?;
            yield count;
        }
    }
}

/// Block until `posting_id` finishes (percent_done reaches 100) or
/// `max_wait` elapses. Per `SPEC_FULL.md` §4.5 / §9, the deadline is an
/// explicit `tokio::time::timeout` rather than a process-wide signal —
/// it fires even if a single poll iteration (the database round trip)
/// is slow, since the whole loop body is inside the timeout.
pub async fn await_posting_completion(
    pool: &PgPool,
    posting_id: Uuid,
    poll_interval: Duration,
    max_wait: Option<Duration>,
) -> Result<(), PdoflowError> {
    let body = async {
        loop {
            let row = fetch_progress(pool, posting_id)
                .await?
                .ok_or_else(|| PdoflowError::NotFound(posting_id.to_string()))?;

            // A posting with no jobs yet has nothing to wait on — the
            // original's `amount_finished < 100.0` check is false for
            // its NaN percentage too, so it returns immediately rather
            // than spinning on an undefined percentage.
            if row.total_jobs == 0 {
                return Ok(());
            }

            let percent = (row.total_jobs_done as f64 / row.total_jobs as f64) * 100.0;
            if percent >= 100.0 {
                return Ok(());
            }

            tokio::time::sleep(poll_interval).await;
        }
    };

    match max_wait {
        Some(deadline) => tokio::time::timeout(deadline, body)
            .await
            .map_err(|_| PdoflowError::Timeout)?,
        None => body.await,
    }
}

/// Default predicate for [`await_for_status_threshold`]: wait until
/// the count drops to zero or below.
pub fn status_count_exhausted(count: i64) -> bool {
    count <= 0
}

/// Block until the count of `status` jobs for `posting_id` satisfies
/// `predicate`, or `max_wait` elapses.
pub async fn await_for_status_threshold<F>(
    pool: &PgPool,
    posting_id: Uuid,
    status: JobStatus,
    poll_interval: Duration,
    max_wait: Option<Duration>,
    predicate: F,
) -> Result<i64, PdoflowError>
where
    F: Fn(i64) -> bool,
{
    let body = async {
        loop {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM job_records WHERE posting_id = $1 AND status = $2",
            )
            .bind(posting_id)
            .bind(status)
            .fetch_one(pool)
            .await?;

            if predicate(count) {
                return Ok(count);
            }

            tokio::time::sleep(poll_interval).await;
        }
    };

    match max_wait {
        Some(deadline) => tokio::time::timeout(deadline, body)
            .await
            .map_err(|_| PdoflowError::Timeout)?,
        None => body.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_count_predicate_matches_spec() {
        assert!(status_count_exhausted(0));
        assert!(status_count_exhausted(-1));
        assert!(!status_count_exhausted(1));
    }
}
