use std::path::Path;
use std::sync::Arc;

use domain::{HistoryRepository, JobRecord, JobScheduler, JobStatus};

use crate::error::HistoryError;

/// Everything the form layer supplies for one submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub script_location: String,
    pub script_name: String,
    pub script_content: String,
    pub job_name: String,
    pub extra_options: Vec<String>,
    /// Form-supplied metadata, kept in form order so it round-trips into
    /// the job-details view.
    pub form_fields: Vec<(String, String)>,
}

/// Writes the job script, submits it, and records one history entry per
/// resulting job id (array jobs expand to one entry per subjob).
pub struct SubmitService {
    scheduler: Arc<dyn JobScheduler + Send + Sync>,
    repository: Arc<dyn HistoryRepository + Send + Sync>,
}

impl SubmitService {
    pub fn new(
        scheduler: Arc<dyn JobScheduler + Send + Sync>,
        repository: Arc<dyn HistoryRepository + Send + Sync>,
    ) -> Self {
        Self {
            scheduler,
            repository,
        }
    }

    /// The script is persisted before the backend is involved, so a failed
    /// submission still leaves it on disk for inspection and resubmission.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Vec<String>, HistoryError> {
        let script_path = self.write_script(&request).await?;

        let ids = self
            .scheduler
            .submit(&script_path, &request.job_name, &request.extra_options)
            .await?;

        let submitted_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let records = ids
            .iter()
            .map(|id| {
                let mut record = JobRecord::new(id.clone());
                record.status = JobStatus::Queued;
                record.name = Some(request.job_name.clone());
                record.submission_time = Some(submitted_at.clone());
                record.script_location = Some(request.script_location.clone());
                record.script_name = Some(request.script_name.clone());
                record.script_content = Some(request.script_content.clone());
                record.extra = request
                    .form_fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Some(v.clone())))
                    .collect();
                record.known_keys = request.form_fields.iter().map(|(k, _)| k.clone()).collect();
                record
            })
            .collect();
        self.repository.put_many(records).await?;

        tracing::info!(jobs = ids.len(), "submitted {}", request.script_name);
        Ok(ids)
    }

    async fn write_script(&self, request: &SubmitRequest) -> Result<String, HistoryError> {
        let dir = Path::new(&request.script_location);
        tokio::fs::create_dir_all(dir).await.map_err(anyhow::Error::from)?;
        let path = dir.join(&request.script_name);
        // Browsers send CRLF line endings; schedulers want LF.
        tokio::fs::write(&path, request.script_content.replace("\r\n", "\n"))
            .await
            .map_err(anyhow::Error::from)?;
        Ok(path.to_string_lossy().into_owned())
    }
}
