//! End-to-end scenarios requiring a real Postgres instance. Mirrors
//! the six concrete scenarios in `spec.md` §8 that cannot be exercised
//! with plain unit tests: the claim protocol's locking semantics,
//! retry bookkeeping as it actually round-trips through the database,
//! and priority ordering under `ORDER BY ... FOR UPDATE SKIP LOCKED`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pdoflow_core::{FunctionRegistry, JobStatus, PdoflowError, PostingStatus};
use pdoflow_postgres::submission::{post_work, JobSpec};
use pdoflow_postgres::worker::ClusterWorker;
use sqlx::PgPool;

const POSTER: &str = "test-poster";

async fn start_posting(pool: &PgPool, posting_id: uuid::Uuid) {
    sqlx::query("UPDATE job_postings SET status = $2 WHERE id = $1")
        .bind(posting_id)
        .bind(PostingStatus::Executing)
        .execute(pool)
        .await
        .unwrap();
}

async fn job_status(pool: &PgPool, id: uuid::Uuid) -> (JobStatus, Option<bool>, i32) {
    sqlx::query_as(
        "SELECT status, exited_ok, tries_remaining FROM job_records WHERE id = $1",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Drains every claimable job for `worker`, looping `process_batch`
/// until a pass returns zero records, bounded so a bug that keeps
/// re-queuing forever fails the test instead of hanging it.
async fn run_to_completion(worker: &mut ClusterWorker) {
    for _ in 0..50 {
        let processed = worker.process_batch().await.unwrap();
        if processed == 0 {
            return;
        }
    }
    panic!("worker did not reach a fixed point within the iteration budget");
}

#[sqlx::test]
async fn single_successful_job_runs_to_done(pool: PgPool) {
    let registry = FunctionRegistry::new();
    registry.register(
        "test.multiply",
        Arc::new(|args, _kwargs| {
            let a = args[0].as_f64().unwrap();
            let b = args[1].as_f64().unwrap();
            Ok(serde_json::json!(a * b))
        }),
    );

    let job = JobSpec::new(serde_json::json!([3, 4.0])).with_tries_remaining(3);
    let batch = post_work(&pool, &registry, POSTER, "multiply", "test.multiply", vec![job])
        .await
        .unwrap();
    start_posting(&pool, batch.posting_id).await;

    let mut worker = ClusterWorker::new(pool.clone(), registry, POSTER);
    run_to_completion(&mut worker).await;

    let (status, exited_ok, _) = job_status(&pool, batch.job_ids[0]).await;
    assert_eq!(status, JobStatus::Done);
    assert_eq!(exited_ok, Some(true));
}

#[sqlx::test]
async fn deterministic_failure_retries_then_terminally_fails(pool: PgPool) {
    let registry = FunctionRegistry::new();
    registry.register(
        "test.fail_if_even",
        Arc::new(|args, _kwargs| {
            let n = args[0].as_i64().unwrap();
            if n % 2 == 0 {
                Err(PdoflowError::JobExecution("n is even".into()))
            } else {
                Ok(serde_json::json!(n))
            }
        }),
    );

    let jobs: Vec<JobSpec> = [1, 2, 3, 4]
        .into_iter()
        .map(|n| JobSpec::new(serde_json::json!([n])).with_tries_remaining(3))
        .collect();
    let batch = post_work(
        &pool,
        &registry,
        POSTER,
        "fail_if_even",
        "test.fail_if_even",
        jobs,
    )
    .await
    .unwrap();
    start_posting(&pool, batch.posting_id).await;

    let mut worker = ClusterWorker::new(pool.clone(), registry, POSTER);
    run_to_completion(&mut worker).await;

    let odd_ids = [batch.job_ids[0], batch.job_ids[2]];
    let even_ids = [batch.job_ids[1], batch.job_ids[3]];

    for id in odd_ids {
        let (status, exited_ok, _) = job_status(&pool, id).await;
        assert_eq!(status, JobStatus::Done);
        assert_eq!(exited_ok, Some(true));
    }
    for id in even_ids {
        let (status, exited_ok, tries_remaining) = job_status(&pool, id).await;
        assert_eq!(status, JobStatus::ErroredOut);
        assert_eq!(exited_ok, Some(false));
        assert_eq!(tries_remaining, 0);
    }
}

#[sqlx::test]
async fn jobs_claimed_in_priority_then_fifo_order(pool: PgPool) {
    let registry = FunctionRegistry::new();
    registry.register("test.noop", Arc::new(|_args, _kwargs| Ok(serde_json::json!(null))));

    let priorities = [100, 100, 0, -50, -50];
    let mut job_ids = Vec::new();
    for priority in priorities {
        let job = JobSpec::new(serde_json::json!([])).with_priority(priority);
        let batch = post_work(&pool, &registry, POSTER, "noop", "test.noop", vec![job])
            .await
            .unwrap();
        start_posting(&pool, batch.posting_id).await;
        job_ids.push(batch.job_ids[0]);
    }

    let claim_store = pdoflow_postgres::ClaimStore::new(pool.clone());
    let mut claim_order = Vec::new();
    for _ in 0..priorities.len() {
        let claimed = claim_store.claim_batch(POSTER, 1, &[]).await.unwrap();
        assert_eq!(claimed.len(), 1);
        claim_order.push(claimed[0].record.id);
    }

    assert_eq!(
        claim_order,
        vec![job_ids[0], job_ids[1], job_ids[2], job_ids[3], job_ids[4]]
    );
}

#[sqlx::test]
async fn posting_blacklisted_after_failure_threshold(pool: PgPool) {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();
    let registry = FunctionRegistry::new();
    registry.register(
        "test.always_fails",
        Arc::new(move |_args, _kwargs| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(PdoflowError::JobExecution("always fails".into()))
        }),
    );

    let jobs: Vec<JobSpec> = (0..5)
        .map(|_| JobSpec::new(serde_json::json!([])).with_tries_remaining(1))
        .collect();
    let batch = post_work(
        &pool,
        &registry,
        POSTER,
        "always_fails",
        "test.always_fails",
        jobs,
    )
    .await
    .unwrap();
    start_posting(&pool, batch.posting_id).await;

    let mut worker = ClusterWorker::new(pool.clone(), registry, POSTER).with_failure_threshold(2);
    run_to_completion(&mut worker).await;

    assert!(invocations.load(Ordering::SeqCst) <= 3);

    for id in &batch.job_ids {
        let (status, _, _) = job_status(&pool, *id).await;
        assert_eq!(status, JobStatus::ErroredOut);
    }

    let posting_status: (PostingStatus,) =
        sqlx::query_as("SELECT status FROM job_postings WHERE id = $1")
            .bind(batch.posting_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(posting_status.0, PostingStatus::ErroredOut);
}

#[sqlx::test]
async fn concurrent_claims_return_disjoint_id_sets(pool: PgPool) {
    let registry = FunctionRegistry::new();
    registry.register("test.noop", Arc::new(|_args, _kwargs| Ok(serde_json::json!(null))));

    let jobs: Vec<JobSpec> = (0..20).map(|_| JobSpec::new(serde_json::json!([]))).collect();
    let batch = post_work(&pool, &registry, POSTER, "noop", "test.noop", jobs)
        .await
        .unwrap();
    start_posting(&pool, batch.posting_id).await;

    let store_a = pdoflow_postgres::ClaimStore::new(pool.clone());
    let store_b = pdoflow_postgres::ClaimStore::new(pool.clone());

    let (claimed_a, claimed_b) = tokio::join!(
        store_a.claim_batch(POSTER, 10, &[]),
        store_b.claim_batch(POSTER, 10, &[]),
    );
    let claimed_a = claimed_a.unwrap();
    let claimed_b = claimed_b.unwrap();

    let ids_a: HashSet<_> = claimed_a.iter().map(|j| j.record.id).collect();
    let ids_b: HashSet<_> = claimed_b.iter().map(|j| j.record.id).collect();

    assert!(ids_a.is_disjoint(&ids_b));
    assert_eq!(ids_a.len() + ids_b.len(), 20);
}
