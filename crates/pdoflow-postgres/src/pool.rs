//! Worker pool supervisor: spawns N worker processes, replaces dead
//! ones on `upkeep()`, and terminates them all on teardown. See
//! `spec.md` §4.4.
//!
//! Workers here are real OS processes (re-exec of the current binary
//! with a `worker` subcommand), not in-process tasks — see
//! `SPEC_FULL.md` §2 for why that distinction matters for this spec.
//! `std::process::Command`/`Child` are used rather than
//! `tokio::process` because teardown happens from [`Drop`], which
//! cannot `.await`.

use std::path::PathBuf;
use std::process::{Child, Command};

use pdoflow_core::PdoflowError;
use tracing::{debug, warn};

/// A scoped resource guaranteeing worker teardown on drop, mirroring
/// the original's `contextlib.AbstractContextManager` — Rust's `Drop`
/// plays the role of `__exit__`, firing on both normal scope exit and
/// panic unwind.
pub struct ClusterPool {
    worker_binary: PathBuf,
    worker_args: Vec<String>,
    workers: Vec<Child>,
}

impl ClusterPool {
    /// Spawn `max_workers` worker processes, each running the current
    /// executable with `worker_args` (typically `["worker", ...]`).
    pub fn spawn(max_workers: usize, worker_args: Vec<String>) -> Result<Self, PdoflowError> {
        let worker_binary = std::env::current_exe()
            .map_err(|e| PdoflowError::Config(format!("cannot resolve own executable: {e}")))?;

        let mut pool = Self {
            worker_binary,
            worker_args,
            workers: Vec::with_capacity(max_workers),
        };

        for _ in 0..max_workers {
            pool.workers.push(pool.spawn_one()?);
        }

        Ok(pool)
    }

    fn spawn_one(&self) -> Result<Child, PdoflowError> {
        Command::new(&self.worker_binary)
            .args(&self.worker_args)
            .spawn()
            .map_err(|e| PdoflowError::Config(format!("failed to spawn worker: {e}")))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Replace any slot whose worker is no longer alive. Never blocks
    /// on worker output — workers are autonomous and fully
    /// database-driven (`spec.md` §4.4 / §9).
    ///
    /// Returns the number of slots that were replaced (0 when every
    /// worker is alive — calling `upkeep` then is a no-op on the
    /// worker set, per `spec.md` §8's idempotence property).
    pub fn upkeep(&mut self) -> Result<usize, PdoflowError> {
        let mut replaced = 0;

        for index in 0..self.workers.len() {
            let alive = matches!(self.workers[index].try_wait(), Ok(None));
            if alive {
                continue;
            }

            debug!(slot = index, "worker slot empty, resurrecting");
            self.workers[index] = self.spawn_one()?;
            replaced += 1;
        }

        Ok(replaced)
    }
}

impl Drop for ClusterPool {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            if let Err(err) = worker.kill() {
                // Already exited — not an error worth surfacing.
                if err.kind() != std::io::ErrorKind::InvalidInput {
                    warn!(%err, "failed to terminate worker on pool teardown");
                }
            }
            let _ = worker.wait();
        }
    }
}
