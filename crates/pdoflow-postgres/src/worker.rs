//! The per-job execution loop: claim, invoke, classify the outcome,
//! commit. See `spec.md` §4.2 and §4.3.

use std::time::Duration;

use pdoflow_core::{FailureCache, FunctionRegistry, JobRecord, PdoflowError, PostingStatus};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::claim::{ClaimStore, ClaimedJob};

/// Executes claimed jobs in a serial loop on behalf of one worker
/// process. Each `ClusterWorker` owns its own connection pool and its
/// own failure cache — nothing here is shared with sibling workers.
pub struct ClusterWorker {
    claim_store: ClaimStore,
    registry: FunctionRegistry,
    failure_cache: FailureCache,
    poster: String,
    batchsize: i64,
}

impl ClusterWorker {
    pub fn new(pool: PgPool, registry: FunctionRegistry, poster: impl Into<String>) -> Self {
        Self::with_batchsize(pool, registry, poster, 10)
    }

    pub fn with_batchsize(
        pool: PgPool,
        registry: FunctionRegistry,
        poster: impl Into<String>,
        batchsize: i64,
    ) -> Self {
        Self {
            claim_store: ClaimStore::new(pool),
            registry,
            failure_cache: FailureCache::new(pdoflow_core::DEFAULT_FAILURE_THRESHOLD),
            poster: poster.into(),
            batchsize,
        }
    }

    /// Override the default failure threshold (`spec.md` §4.3 says it
    /// defaults to 10; `spec.md` §8 scenario 4 exercises a threshold
    /// of 2).
    pub fn with_failure_threshold(mut self, threshold: i32) -> Self {
        self.failure_cache = FailureCache::new(threshold);
        self
    }

    /// Run forever: claim a batch, process every record in it, sleep
    /// the idle interval when a claim comes back empty. Exits cleanly
    /// (without attempting to finish an in-flight batch) on `ctrl_c` —
    /// the supervisor's next `upkeep()` call replaces this slot.
    pub async fn run(mut self) -> Result<(), PdoflowError> {
        loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    warn!("worker received interrupt, exiting");
                    return Ok(());
                }
                result = self.process_batch() => {
                    let processed = result?;
                    if processed == 0 {
                        tokio::time::sleep(Duration::from_secs(
                            pdoflow_core::IDLE_POLL_INTERVAL_SECS,
                        ))
                        .await;
                    }
                }
            }
        }
    }

    /// Claim one batch and process every record in it sequentially, in
    /// the order they were returned (`spec.md` §4.2: "in insertion
    /// order within the batch"). Returns the number of records
    /// processed (0 means the queue was empty for this worker).
    pub async fn process_batch(&mut self) -> Result<usize, PdoflowError> {
        let excluded = self.failure_cache.blacklisted_postings();
        let batch = self
            .claim_store
            .claim_batch(&self.poster, self.batchsize, &excluded)
            .await?;

        let count = batch.len();
        for job in batch {
            self.process_job(job).await?;
        }
        Ok(count)
    }

    async fn process_job(&mut self, job: ClaimedJob) -> Result<(), PdoflowError> {
        let ClaimedJob {
            mut record,
            entry_point,
        } = job;

        if self.failure_cache.is_blacklisted(record.posting_id) {
            record.mark_terminally_failed();
            return self.commit_record(&record).await;
        }

        record.work_started_on = Some(chrono::Utc::now());

        let outcome = self.registry.resolve_and_invoke(
            &entry_point,
            &record.positional_arguments,
            record.keyword_arguments.as_ref(),
        );

        match outcome {
            Ok(_value) => {
                record.mark_succeeded();
                info!(job_id = %record.id, "job completed successfully");
                self.commit_record(&record).await
            }
            Err(err) if err.is_transient_database_error() => {
                warn!(job_id = %record.id, %err, "transient database error, backing off");
                let backoff_secs = fastrand::f64() * 2.0;
                tokio::time::sleep(Duration::from_secs_f64(backoff_secs)).await;
                record.revert_after_transient_failure();
                self.commit_record(&record).await
            }
            Err(err) => {
                warn!(job_id = %record.id, %err, "job execution failed");
                let failure_outcome = self
                    .failure_cache
                    .record_failure(record.posting_id, record.tries_remaining);

                if failure_outcome.blacklist_posting {
                    warn!(
                        posting_id = %record.posting_id,
                        "posting deemed too erroneous to continue, blacklisting"
                    );
                    self.mark_posting_errored_out(record.posting_id).await?;
                }

                if failure_outcome.mark_record_terminally_failed {
                    record.mark_terminally_failed();
                } else if failure_outcome.decrement_tries_and_retry {
                    record.mark_for_retry();
                }

                self.commit_record(&record).await
            }
        }
    }

    async fn commit_record(&self, record: &JobRecord) -> Result<(), PdoflowError> {
        sqlx::query(
            r#"
            UPDATE job_records
            SET status = $2,
                exited_ok = $3,
                tries_remaining = $4,
                work_started_on = $5,
                completed_on = $6
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status)
        .bind(record.exited_ok)
        .bind(record.tries_remaining)
        .bind(record.work_started_on)
        .bind(record.completed_on)
        .execute(self.claim_store.pool())
        .await?;
        Ok(())
    }

    async fn mark_posting_errored_out(&self, posting_id: Uuid) -> Result<(), PdoflowError> {
        sqlx::query("UPDATE job_postings SET status = $2 WHERE id = $1")
            .bind(posting_id)
            .bind(PostingStatus::ErroredOut)
            .execute(self.claim_store.pool())
            .await?;
        Ok(())
    }
}
