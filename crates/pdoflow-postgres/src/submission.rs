//! Posting submission: a thin client-side helper that inserts a
//! posting row plus its job rows in one transaction. Out-of-core per
//! `spec.md` §1 ("the function registry and posting-submission API...
//! the core only consumes rows"), kept here because nothing else in
//! this workspace can otherwise produce rows for the claim protocol to
//! consume, end to end.

use chrono::Utc;
use pdoflow_core::{FunctionRegistry, PdoflowError, PostingStatus};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// One job's worth of submission-time arguments.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub priority: i32,
    pub positional_arguments: Value,
    pub keyword_arguments: Option<Value>,
    pub tries_remaining: i32,
}

impl JobSpec {
    pub fn new(positional_arguments: Value) -> Self {
        Self {
            priority: 0,
            positional_arguments,
            keyword_arguments: None,
            tries_remaining: 1,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tries_remaining(mut self, tries_remaining: i32) -> Self {
        self.tries_remaining = tries_remaining;
        self
    }

    pub fn with_keyword_arguments(mut self, keyword_arguments: Value) -> Self {
        self.keyword_arguments = Some(keyword_arguments);
        self
    }
}

/// The posting id and job ids created by [`post_work`], in submission
/// order.
#[derive(Debug, Clone)]
pub struct PostedBatch {
    pub posting_id: Uuid,
    pub job_ids: Vec<Uuid>,
}

/// Insert a posting and its jobs in one transaction, starting the
/// posting `paused` (`spec.md` §3's documented default — callers flip
/// it to `executing` explicitly, typically via
/// `set-posting-status`).
///
/// Refuses to post against an `entry_point` absent from `registry`
/// (`spec.md` §9: "submission-side validation refuses paths not
/// present in the local registry") so a posting can never be created
/// for a function this process cannot itself run.
pub async fn post_work(
    pool: &PgPool,
    registry: &FunctionRegistry,
    poster: &str,
    target_function: &str,
    entry_point: &str,
    jobs: Vec<JobSpec>,
) -> Result<PostedBatch, PdoflowError> {
    if !registry.contains(entry_point) {
        return Err(PdoflowError::UnknownEntryPoint(entry_point.to_string()));
    }

    let mut tx = pool.begin().await?;

    let posting_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO job_postings (id, created_on, poster, status, target_function, entry_point)
        VALUES (gen_random_uuid(), $1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(Utc::now())
    .bind(poster)
    .bind(PostingStatus::Paused)
    .bind(target_function)
    .bind(entry_point)
    .fetch_one(&mut *tx)
    .await?;

    let mut job_ids = Vec::with_capacity(jobs.len());
    for job in jobs {
        let job_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO job_records (
                id, created_on, posting_id, priority,
                positional_arguments, keyword_arguments, tries_remaining, status
            )
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, 'waiting')
            RETURNING id
            "#,
        )
        .bind(Utc::now())
        .bind(posting_id)
        .bind(job.priority)
        .bind(job.positional_arguments)
        .bind(job.keyword_arguments)
        .bind(job.tries_remaining)
        .fetch_one(&mut *tx)
        .await?;
        job_ids.push(job_id);
    }

    tx.commit().await?;

    Ok(PostedBatch {
        posting_id,
        job_ids,
    })
}

#[cfg(test)]
mod tests {
    // Exercising `post_work` requires a real Postgres instance (it
    // issues live INSERT statements), so its row-level behavior is
    // covered by the `#[sqlx::test]` integration tests in
    // `tests/claim.rs` rather than here.
}
