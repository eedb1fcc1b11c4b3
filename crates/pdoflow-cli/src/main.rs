//! `pdoflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `pool`            — spawn a supervised pool of worker processes.
//! - `worker`          — internal: run one worker loop (spawned by `pool`, or standalone).
//! - `post`            — submit a posting and its jobs.
//! - `posting-status`  — show a posting's progress, optionally with its jobs.
//! - `list-postings`   — list postings, optionally filtered by poster/status.
//! - `set-posting-status` — force a posting's status.
//! - `priority-stats`  — histogram of waiting jobs by priority.
//! - `execute-job`     — run one job's entry point ad hoc, outside the claim protocol.

use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pdoflow_core::{DbConfig, FunctionRegistry, JobStatus, PdoflowError, PostingStatus};
use pdoflow_postgres::submission::{post_work, JobSpec};
use pdoflow_postgres::{poll, ClusterPool, ClusterWorker};
use sqlx::postgres::PgConnectOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pdoflow", about = "Distributed PostgreSQL-backed job dispatcher", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Spawn and supervise `workers` worker processes against `poster`.
    Pool {
        #[arg(long, default_value_t = 4)]
        workers: usize,
        #[arg(long)]
        poster: Option<String>,
        #[arg(long, default_value_t = 10)]
        batchsize: i64,
        /// Seconds between `upkeep()` passes.
        #[arg(long, default_value_t = 5)]
        upkeep_interval: u64,
    },
    /// Run a single worker loop in the current process. Used internally
    /// by `pool`, but safe to invoke standalone for a one-off worker.
    Worker {
        #[arg(long)]
        poster: Option<String>,
        #[arg(long, default_value_t = 10)]
        batchsize: i64,
        #[arg(long, default_value_t = pdoflow_core::DEFAULT_FAILURE_THRESHOLD)]
        failure_threshold: i32,
    },
    /// Submit a posting with one job built from `--args`.
    Post {
        #[arg(long)]
        poster: Option<String>,
        #[arg(long)]
        target_function: String,
        #[arg(long)]
        entry_point: String,
        /// JSON array of positional arguments, e.g. `[1, 2.0]`.
        #[arg(long, default_value = "[]")]
        args: String,
        #[arg(long)]
        kwargs: Option<String>,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long, default_value_t = 1)]
        tries_remaining: i32,
        /// Start the posting `executing` immediately rather than leaving it `paused`.
        #[arg(long)]
        start: bool,
    },
    /// Show one posting's progress. Exits `1` if it does not exist.
    PostingStatus {
        posting_id: Uuid,
        #[arg(long)]
        show_jobs: bool,
    },
    /// List postings, optionally filtered.
    ListPostings {
        #[arg(long)]
        poster: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Force a posting's status column.
    SetPostingStatus {
        posting_id: Uuid,
        status: String,
    },
    /// Histogram of `waiting` jobs grouped by priority.
    PriorityStats {
        #[arg(long)]
        poster: Option<String>,
    },
    /// Run one job's entry point immediately, outside the claim
    /// protocol, and commit its outcome. For operator debugging; not
    /// part of the concurrent dispatch path.
    ExecuteJob { job_id: Uuid },
}

fn resolve_poster(poster: Option<String>) -> String {
    poster.unwrap_or_else(|| {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    })
}

/// Functions this binary can execute. Real deployments link in their
/// own job functions at this same seam (`spec.md` §9); these are
/// stand-ins so the CLI is runnable end to end without an embedding
/// application.
fn builtin_registry() -> FunctionRegistry {
    let registry = FunctionRegistry::new();
    registry.register(
        "pdoflow.echo",
        std::sync::Arc::new(|args, kwargs| {
            Ok(serde_json::json!({"args": args, "kwargs": kwargs}))
        }),
    );
    registry.register(
        "pdoflow.sum",
        std::sync::Arc::new(|args, _kwargs| {
            let total: f64 = args
                .as_array()
                .ok_or_else(|| PdoflowError::JobExecution("expected a JSON array".into()))?
                .iter()
                .filter_map(|v| v.as_f64())
                .sum();
            Ok(serde_json::json!(total))
        }),
    );
    registry
}

async fn connect() -> Result<PgPool, PdoflowError> {
    let url = DbConfig::resolve_connection_string()?;
    let options = PgConnectOptions::from_str(&url)
        .map_err(|e| PdoflowError::Config(format!("invalid connection string: {e}")))?;
    pdoflow_postgres::connection_guarded_pool(options).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let exit_code = match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            2
        }
    };
    std::process::exit(exit_code);
}

async fn run(command: Command) -> Result<i32, PdoflowError> {
    match command {
        Command::Pool {
            workers,
            poster,
            batchsize,
            upkeep_interval,
        } => {
            let poster = resolve_poster(poster);
            let mut args = vec!["worker".to_string(), "--poster".to_string(), poster];
            args.push("--batchsize".to_string());
            args.push(batchsize.to_string());

            let mut pool = ClusterPool::spawn(workers, args)?;
            info!(workers = pool.worker_count(), "worker pool started");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutting down worker pool");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_secs(upkeep_interval)) => {
                        let replaced = pool.upkeep()?;
                        if replaced > 0 {
                            info!(replaced, "resurrected dead worker slots");
                        }
                    }
                }
            }
            Ok(0)
        }

        Command::Worker {
            poster,
            batchsize,
            failure_threshold,
        } => {
            let db_pool = connect().await?;
            let registry = builtin_registry();
            let worker = ClusterWorker::with_batchsize(db_pool, registry, resolve_poster(poster), batchsize)
                .with_failure_threshold(failure_threshold);
            worker.run().await?;
            Ok(0)
        }

        Command::Post {
            poster,
            target_function,
            entry_point,
            args,
            kwargs,
            priority,
            tries_remaining,
            start,
        } => {
            let db_pool = connect().await?;
            let registry = builtin_registry();
            let positional_arguments: serde_json::Value = serde_json::from_str(&args)
                .map_err(|e| PdoflowError::Config(format!("invalid --args JSON: {e}")))?;
            let keyword_arguments = kwargs
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(|e| PdoflowError::Config(format!("invalid --kwargs JSON: {e}")))?;

            let mut job = JobSpec::new(positional_arguments)
                .with_priority(priority)
                .with_tries_remaining(tries_remaining);
            if let Some(kwargs) = keyword_arguments {
                job = job.with_keyword_arguments(kwargs);
            }

            let batch = post_work(
                &db_pool,
                &registry,
                &resolve_poster(poster),
                &target_function,
                &entry_point,
                vec![job],
            )
            .await?;

            if start {
                sqlx::query("UPDATE job_postings SET status = $2 WHERE id = $1")
                    .bind(batch.posting_id)
                    .bind(PostingStatus::Executing)
                    .execute(&db_pool)
                    .await?;
            }

            println!("posting {}", batch.posting_id);
            for job_id in &batch.job_ids {
                println!("  job {job_id}");
            }
            Ok(0)
        }

        Command::PostingStatus {
            posting_id,
            show_jobs,
        } => {
            let db_pool = connect().await?;
            let posting: Option<(PostingStatus, String, String)> = sqlx::query_as(
                "SELECT status, target_function, entry_point FROM job_postings WHERE id = $1",
            )
            .bind(posting_id)
            .fetch_optional(&db_pool)
            .await?;

            let Some((status, target_function, entry_point)) = posting else {
                eprintln!("posting {posting_id} not found");
                return Ok(1);
            };

            let snapshot = poll::poll_posting(db_pool.clone(), posting_id);
            futures::pin_mut!(snapshot);
            use futures::StreamExt;
            let progress = snapshot.next().await.transpose()?;

            println!("posting {posting_id}");
            println!("  status: {status}");
            println!("  target_function: {target_function}");
            println!("  entry_point: {entry_point}");
            match progress {
                Some(snap) => println!(
                    "  progress: {}/{} jobs done",
                    snap.total_jobs_done, snap.total_jobs
                ),
                None => println!("  progress: not executing"),
            }

            if show_jobs {
                let jobs: Vec<(Uuid, JobStatus, i32, i32)> = sqlx::query_as(
                    "SELECT id, status, priority, tries_remaining FROM job_records \
                     WHERE posting_id = $1 ORDER BY priority DESC, created_on ASC",
                )
                .bind(posting_id)
                .fetch_all(&db_pool)
                .await?;
                for (id, status, priority, tries_remaining) in jobs {
                    println!("    job {id} status={status} priority={priority} tries_remaining={tries_remaining}");
                }
            }
            Ok(0)
        }

        Command::ListPostings { poster, status } => {
            let db_pool = connect().await?;
            let parsed_status = status
                .map(|s| PostingStatus::from_str(&s))
                .transpose()
                .map_err(PdoflowError::Config)?;

            let rows: Vec<(Uuid, String, PostingStatus, String)> = sqlx::query_as(
                "SELECT id, poster, status, target_function FROM job_postings \
                 WHERE ($1::TEXT IS NULL OR poster = $1) \
                 AND ($2::TEXT IS NULL OR status = $2) \
                 ORDER BY created_on DESC",
            )
            .bind(poster)
            .bind(parsed_status.map(|s| s.to_string()))
            .fetch_all(&db_pool)
            .await?;

            for (id, poster, status, target_function) in rows {
                println!("{id}  poster={poster}  status={status}  target_function={target_function}");
            }
            Ok(0)
        }

        Command::SetPostingStatus { posting_id, status } => {
            let db_pool = connect().await?;
            let status = PostingStatus::from_str(&status).map_err(PdoflowError::Config)?;

            let result = sqlx::query("UPDATE job_postings SET status = $2 WHERE id = $1")
                .bind(posting_id)
                .bind(status)
                .execute(&db_pool)
                .await?;

            if result.rows_affected() == 0 {
                eprintln!("posting {posting_id} not found");
                return Ok(1);
            }
            println!("posting {posting_id} -> {status}");
            Ok(0)
        }

        Command::PriorityStats { poster } => {
            let db_pool = connect().await?;
            let rows: Vec<(i32, i64)> = sqlx::query_as(
                "SELECT jr.priority, COUNT(*) FROM job_records jr \
                 JOIN job_postings jp ON jp.id = jr.posting_id \
                 WHERE jr.status = 'waiting' AND ($1::TEXT IS NULL OR jp.poster = $1) \
                 GROUP BY jr.priority ORDER BY jr.priority DESC",
            )
            .bind(poster)
            .fetch_all(&db_pool)
            .await?;

            for (priority, count) in rows {
                println!("priority {priority}: {count} waiting job(s)");
            }
            Ok(0)
        }

        Command::ExecuteJob { job_id } => {
            let db_pool = connect().await?;
            let registry = builtin_registry();

            let row: Option<(serde_json::Value, Option<serde_json::Value>, String)> =
                sqlx::query_as(
                    "SELECT jr.positional_arguments, jr.keyword_arguments, jp.entry_point \
                     FROM job_records jr JOIN job_postings jp ON jp.id = jr.posting_id \
                     WHERE jr.id = $1",
                )
                .bind(job_id)
                .fetch_optional(&db_pool)
                .await?;

            let Some((positional_arguments, keyword_arguments, entry_point)) = row else {
                eprintln!("job {job_id} not found");
                return Ok(1);
            };

            let result = registry.resolve_and_invoke(
                &entry_point,
                &positional_arguments,
                keyword_arguments.as_ref(),
            )?;
            println!("{result}");
            Ok(0)
        }
    }
}
