use std::sync::Arc;

use domain::{JobRecord, StatusFilter};
use service::{HistoryError, HistoryService, SubmitRequest, SubmitService};

use crate::config::ComposerConfig;
use crate::infrastructure::command::CommandRunner;
use crate::infrastructure::database::HistoryDb;
use crate::infrastructure::scheduler;

/// The surface the web/form layer consumes: submit, cancel, delete, and the
/// history read with live status refresh.
pub struct Composer {
    history: HistoryService,
    submit: SubmitService,
}

impl Composer {
    pub async fn new(config: &ComposerConfig) -> anyhow::Result<Self> {
        let runner = Arc::new(CommandRunner::new(
            config.bin.as_deref(),
            config.bin_overrides.clone(),
            config.ssh_wrapper.as_deref(),
        ));
        let scheduler = scheduler::create(&config.scheduler, runner)?;
        let repository = Arc::new(HistoryDb::open(config.history_db_path()).await?);

        Ok(Self {
            history: HistoryService::new(scheduler.clone(), repository.clone()),
            submit: SubmitService::new(scheduler, repository),
        })
    }

    pub async fn submit_job(&self, request: SubmitRequest) -> Result<Vec<String>, HistoryError> {
        self.submit.submit(request).await
    }

    pub async fn cancel_jobs(&self, job_ids: &[String]) -> Result<(), HistoryError> {
        self.history.cancel(job_ids).await
    }

    pub async fn delete_jobs(&self, job_ids: &[String]) -> Result<(), HistoryError> {
        self.history.delete(job_ids).await
    }

    pub async fn query_history(
        &self,
        status: StatusFilter,
        start_index: usize,
        end_index: usize,
        filter: Option<&str>,
    ) -> Result<Vec<JobRecord>, HistoryError> {
        self.history.query_history(status, start_index, end_index, filter).await
    }

    pub async fn history_size(&self) -> Result<usize, HistoryError> {
        self.history.size().await
    }
}
