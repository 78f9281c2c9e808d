use std::collections::HashMap;

use crate::error::SchedulerError;
use crate::model::job::JobUpdate;

/// Capability set every batch-scheduler backend satisfies.
///
/// Adapters are stateless with respect to jobs: every call carries the full
/// id set it operates on. Binary resolution and SSH wrapping are adapter
/// construction concerns, resolved once from configuration.
#[mockall::automock]
#[async_trait::async_trait]
pub trait JobScheduler {
    /// Submit the script at `script_path`. Returns the scheduler-assigned
    /// job id, or the full ascending subjob id list for an array job.
    async fn submit(
        &self,
        script_path: &str,
        job_name: &str,
        extra_options: &[String],
    ) -> Result<Vec<String>, SchedulerError>;

    /// Cancel all listed jobs with a single backend command.
    async fn cancel(&self, job_ids: &[String]) -> Result<(), SchedulerError>;

    /// Query live status for the listed jobs. Ids the backend no longer
    /// reports (e.g. finished outside its lookback window) are omitted from
    /// the map, never an error.
    async fn query(&self, job_ids: &[String])
        -> Result<HashMap<String, JobUpdate>, SchedulerError>;
}
