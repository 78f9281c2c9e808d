use std::collections::HashMap;
use std::sync::Arc;

use domain::{JobScheduler, JobUpdate, SchedulerError};

use super::pbs_common::{self, IdPatterns};
use crate::infrastructure::command::RunCommand;

/// Maximum retrospective window `qstat -H` accepts on this backend.
const HISTORY_DAYS: u32 = 31;

pub struct Pbs {
    runner: Arc<dyn RunCommand + Send + Sync>,
    patterns: IdPatterns,
}

impl Pbs {
    pub fn new(runner: Arc<dyn RunCommand + Send + Sync>) -> Self {
        Self {
            runner,
            patterns: IdPatterns::opbs(),
        }
    }
}

#[async_trait::async_trait]
impl JobScheduler for Pbs {
    async fn submit(
        &self,
        script_path: &str,
        job_name: &str,
        extra_options: &[String],
    ) -> Result<Vec<String>, SchedulerError> {
        pbs_common::submit(&self.runner, &self.patterns, script_path, job_name, extra_options)
            .await
    }

    async fn cancel(&self, job_ids: &[String]) -> Result<(), SchedulerError> {
        pbs_common::cancel(&self.runner, job_ids).await
    }

    async fn query(
        &self,
        job_ids: &[String],
    ) -> Result<HashMap<String, JobUpdate>, SchedulerError> {
        pbs_common::query(&self.runner, HISTORY_DAYS, job_ids).await
    }
}
