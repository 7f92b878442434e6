use thiserror::Error;

/// Failures that cross job boundaries.
///
/// Unparseable result strings are not errors; see `ScheduleOutcome::Malformed`.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A Source or Store call failed. The next scheduled cycle retries it.
    #[error("fetch failed for {what}: {cause:#}")]
    TransientFetch { what: String, cause: anyhow::Error },

    /// The Settler failed for one fixture. The backoff schedule retries it.
    #[error("settlement failed for fixture {fixture_id}: {cause:#}")]
    Settlement { fixture_id: i64, cause: anyhow::Error },

    /// The task that owns the settlement table has stopped.
    #[error("settlement scheduler is no longer running")]
    SchedulerClosed,

    /// A job escaped its own per-cycle guard.
    #[error("job '{job}' stopped: {reason}")]
    JobFatal { job: &'static str, reason: String },
}

impl WorkerError {
    /// True when the error must stop the owning job instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkerError::SchedulerClosed | WorkerError::JobFatal { .. })
    }
}

/// Walk an `anyhow` chain and report whether it carries a fatal `WorkerError`.
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<WorkerError>())
        .any(WorkerError::is_fatal)
}
