use domain::SchedulerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    /// A status refresh batch failed. The whole page view fails instead of
    /// rendering stale status next to fresh status.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// The history store could not be read or written.
    #[error("history store error: {0}")]
    Store(#[from] anyhow::Error),
}
