//! The claim protocol: the single SQL statement by which a worker
//! atomically selects, locks, and takes ownership of a batch of waiting
//! jobs. See `spec.md` §4.1 — this module's query shape is the wire
//! contract; any rewrite must emit an equivalent statement.

use pdoflow_core::{JobRecord, PdoflowError};
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

/// A claimed record paired with its posting's `entry_point`, resolved
/// once at claim time so the execution loop never needs a lazy lookup
/// of the parent posting per job (`spec.md` §9's note on static
/// linking applies just as much to avoiding a second round trip).
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub record: JobRecord,
    pub entry_point: String,
}

#[derive(Debug, FromRow)]
struct ClaimedRow {
    id: Uuid,
    created_on: chrono::DateTime<chrono::Utc>,
    posting_id: Uuid,
    priority: i32,
    positional_arguments: serde_json::Value,
    keyword_arguments: Option<serde_json::Value>,
    tries_remaining: i32,
    status: pdoflow_core::JobStatus,
    exited_ok: Option<bool>,
    work_started_on: Option<chrono::DateTime<chrono::Utc>>,
    completed_on: Option<chrono::DateTime<chrono::Utc>>,
    entry_point: String,
}

impl From<ClaimedRow> for ClaimedJob {
    fn from(row: ClaimedRow) -> Self {
        ClaimedJob {
            record: JobRecord {
                id: row.id,
                created_on: row.created_on,
                posting_id: row.posting_id,
                priority: row.priority,
                positional_arguments: row.positional_arguments,
                keyword_arguments: row.keyword_arguments,
                tries_remaining: row.tries_remaining,
                status: row.status,
                exited_ok: row.exited_ok,
                work_started_on: row.work_started_on,
                completed_on: row.completed_on,
            },
            entry_point: row.entry_point,
        }
    }
}

/// Thin wrapper over a `PgPool` exposing the claim protocol. Kept
/// separate from [`crate::worker::ClusterWorker`] so the protocol can
/// be exercised directly in concurrency tests (`spec.md` §8 scenario 5)
/// without spinning up a full execution loop.
#[derive(Clone)]
pub struct ClaimStore {
    pool: PgPool,
}

impl ClaimStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Claim up to `batchsize` waiting records belonging to `executing`
    /// postings owned by `poster`, ordered by `priority DESC,
    /// created_on ASC`, excluding any posting id in
    /// `excluded_postings` (the worker's local blacklist — `spec.md`
    /// §4.1 "The worker may additionally suppress rows ...").
    ///
    /// Returns the claimed records already reflecting the
    /// `Executing` status that was durably committed for them — the
    /// `status = executing` write is the handoff that prevents re-claim
    /// even after the `FOR UPDATE` lock is released at commit.
    pub async fn claim_batch(
        &self,
        poster: &str,
        batchsize: i64,
        excluded_postings: &[Uuid],
    ) -> Result<Vec<ClaimedJob>, PdoflowError> {
        let mut tx = self.pool.begin().await?;

        let mut query = QueryBuilder::new(
            "SELECT jr.id, jr.created_on, jr.posting_id, jr.priority, \
             jr.positional_arguments, jr.keyword_arguments, jr.tries_remaining, \
             jr.status, jr.exited_ok, jr.work_started_on, jr.completed_on, \
             jp.entry_point \
             FROM job_records jr JOIN job_postings jp ON jr.posting_id = jp.id \
             WHERE jp.poster = ",
        );
        query.push_bind(poster.to_string());
        query.push(" AND jp.status = 'executing' AND jr.status = 'waiting' AND jr.tries_remaining > 0");

        if !excluded_postings.is_empty() {
            query.push(" AND jr.posting_id NOT IN (");
            let mut separated = query.separated(", ");
            for id in excluded_postings {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }

        query.push(" ORDER BY jr.priority DESC, jr.created_on ASC LIMIT ");
        query.push_bind(batchsize);
        query.push(" FOR UPDATE OF jr SKIP LOCKED");

        let rows: Vec<ClaimedRow> = query
            .build_query_as::<ClaimedRow>()
            .fetch_all(&mut *tx)
            .await?;

        if rows.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        sqlx::query("UPDATE job_records SET status = 'executing' WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let claimed = rows
            .into_iter()
            .map(|row| {
                let mut job: ClaimedJob = row.into();
                job.record.status = pdoflow_core::JobStatus::Executing;
                job
            })
            .collect();

        Ok(claimed)
    }
}
