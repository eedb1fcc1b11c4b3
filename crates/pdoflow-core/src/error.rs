use thiserror::Error;

/// Error taxonomy for PDOFlow, organized by handling strategy rather than
/// by source — see `SPEC_FULL.md` §7.
#[derive(Debug, Error)]
pub enum PdoflowError {
    /// A database operation failed. Callers in `pdoflow-postgres`
    /// further classify the wrapped `sqlx::Error` into transient
    /// (back off and retry) vs. fatal.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Connection parameters were missing, contradictory, or otherwise
    /// unusable. Fails fast rather than binding a partially-configured
    /// session.
    #[error("configuration error: {0}")]
    Config(String),

    /// A posting's `entry_point` has no matching registration in this
    /// worker's `FunctionRegistry`. Treated as a user-code failure
    /// per `spec.md` §7.
    #[error("unknown entry point: {0}")]
    UnknownEntryPoint(String),

    /// The registered function itself returned an error during
    /// invocation.
    #[error("job execution failed: {0}")]
    JobExecution(String),

    /// A poller's `max_wait` elapsed before the awaited condition was
    /// observed.
    #[error("timed out waiting for condition")]
    Timeout,

    /// A lookup (posting, job record, registry entry) did not resolve.
    #[error("not found: {0}")]
    NotFound(String),
}

impl PdoflowError {
    /// `true` if the underlying failure is a transient database
    /// connectivity problem that should be retried after a short
    /// backoff rather than consuming a job's retry budget — see
    /// `spec.md` §4.2 step 7 and §7.
    pub fn is_transient_database_error(&self) -> bool {
        match self {
            PdoflowError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_transient() {
        let err = PdoflowError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient_database_error());
    }

    #[test]
    fn unknown_entry_point_is_not_transient() {
        let err = PdoflowError::UnknownEntryPoint("foo.bar".into());
        assert!(!err.is_transient_database_error());
    }
}
