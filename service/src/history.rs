use std::sync::Arc;

use domain::{HistoryRepository, JobRecord, JobScheduler, StatusFilter};

use crate::error::HistoryError;

/// Reads history pages, refreshing live status on the way.
///
/// One adapter call per page load at most: only the non-terminal ids inside
/// the requested window are batched into a single `query`, so the external
/// cost is independent of the store size.
pub struct HistoryService {
    scheduler: Arc<dyn JobScheduler + Send + Sync>,
    repository: Arc<dyn HistoryRepository + Send + Sync>,
}

impl HistoryService {
    pub fn new(
        scheduler: Arc<dyn JobScheduler + Send + Sync>,
        repository: Arc<dyn HistoryRepository + Send + Sync>,
    ) -> Self {
        Self {
            scheduler,
            repository,
        }
    }

    /// Return the `[start_index, end_index]` (inclusive, zero-based) window
    /// of the reverse-chronological history, filtered by status and by a
    /// case-sensitive substring over script name or display name.
    pub async fn query_history(
        &self,
        status: StatusFilter,
        start_index: usize,
        end_index: usize,
        filter: Option<&str>,
    ) -> Result<Vec<JobRecord>, HistoryError> {
        let ids = self.repository.ids_reverse_chronological().await?;
        let window = window(&ids, start_index, end_index);

        if status != StatusFilter::Completed {
            self.refresh(window).await?;
        }

        let mut jobs = Vec::new();
        for id in window {
            let Some(record) = self.repository.get(id).await? else {
                continue;
            };
            if !status.matches(record.status) {
                continue;
            }
            if let Some(filter) = filter.filter(|f| !f.is_empty()) {
                let matches = |field: &Option<String>| {
                    field.as_deref().is_some_and(|v| v.contains(filter))
                };
                if !matches(&record.script_name) && !matches(&record.name) {
                    continue;
                }
            }
            jobs.push(record);
        }
        Ok(jobs)
    }

    /// Re-query every non-terminal id in the window with one adapter call
    /// and merge the results back. Zero non-terminal ids means no external
    /// invocation at all.
    async fn refresh(&self, window: &[String]) -> Result<(), HistoryError> {
        let mut stale = Vec::new();
        for id in window {
            if let Some(record) = self.repository.get(id).await? {
                if !record.status.is_terminal() {
                    stale.push(id.clone());
                }
            }
        }
        if stale.is_empty() {
            return Ok(());
        }

        tracing::debug!(count = stale.len(), "refreshing non-terminal jobs");
        let updates = self.scheduler.query(&stale).await?;
        self.repository
            .merge_many(updates.into_iter().collect())
            .await?;
        Ok(())
    }

    /// Cancel the listed jobs on the backend. The records stay in the
    /// store; the next page load picks up the resulting state.
    pub async fn cancel(&self, job_ids: &[String]) -> Result<(), HistoryError> {
        self.scheduler.cancel(job_ids).await?;
        Ok(())
    }

    /// Remove records from the store. No backend call is made.
    pub async fn delete(&self, job_ids: &[String]) -> Result<(), HistoryError> {
        self.repository.delete(job_ids).await?;
        Ok(())
    }

    pub async fn size(&self) -> Result<usize, HistoryError> {
        Ok(self.repository.size().await?)
    }
}

fn window(ids: &[String], start_index: usize, end_index: usize) -> &[String] {
    if start_index >= ids.len() || end_index < start_index {
        return &[];
    }
    let end = (end_index + 1).min(ids.len());
    &ids[start_index..end]
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use domain::{
        JobRecord, JobStatus, JobUpdate, MockHistoryRepository, MockJobScheduler, SchedulerError,
        StatusFilter,
    };

    use super::*;

    fn record(id: &str, status: JobStatus) -> JobRecord {
        let mut r = JobRecord::new(id);
        r.status = status;
        r
    }

    fn repo_with(records: Vec<JobRecord>) -> MockHistoryRepository {
        let mut repo = MockHistoryRepository::new();
        let ids: Vec<String> = records.iter().rev().map(|r| r.id.clone()).collect();
        repo.expect_ids_reverse_chronological().returning(move || Ok(ids.clone()));
        repo.expect_get().returning(move |id| {
            Ok(records.iter().find(|r| r.id == id).cloned())
        });
        repo
    }

    #[tokio::test]
    async fn terminal_jobs_are_not_queried() {
        let records = vec![
            record("1", JobStatus::Completed),
            record("2", JobStatus::Running),
            record("3", JobStatus::Unknown),
        ];
        let mut repo = repo_with(records);
        repo.expect_merge_many().returning(|_| Ok(()));

        let mut scheduler = MockJobScheduler::new();
        // unknown is non-terminal, completed is excluded
        scheduler
            .expect_query()
            .withf(|ids| ids == ["3", "2"])
            .times(1)
            .returning(|_| Ok(HashMap::new()));

        let service = HistoryService::new(Arc::new(scheduler), Arc::new(repo));
        let jobs = service.query_history(StatusFilter::All, 0, 9, None).await.unwrap();
        assert_eq!(jobs.len(), 3);
    }

    #[tokio::test]
    async fn no_adapter_call_when_window_is_all_terminal() {
        let repo = repo_with(vec![record("1", JobStatus::Completed)]);
        let mut scheduler = MockJobScheduler::new();
        scheduler.expect_query().times(0);

        let service = HistoryService::new(Arc::new(scheduler), Arc::new(repo));
        let jobs = service.query_history(StatusFilter::All, 0, 9, None).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn completed_filter_skips_refresh_entirely() {
        let repo = repo_with(vec![
            record("1", JobStatus::Running),
            record("2", JobStatus::Completed),
        ]);
        let mut scheduler = MockJobScheduler::new();
        scheduler.expect_query().times(0);

        let service = HistoryService::new(Arc::new(scheduler), Arc::new(repo));
        let jobs = service
            .query_history(StatusFilter::Completed, 0, 9, None)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "2");
    }

    #[tokio::test]
    async fn query_failure_aborts_the_page() {
        let repo = repo_with(vec![record("1", JobStatus::Queued)]);
        let mut scheduler = MockJobScheduler::new();
        scheduler.expect_query().returning(|_| {
            Err(SchedulerError::Process {
                output: "sacct: fatal".to_owned(),
            })
        });

        let service = HistoryService::new(Arc::new(scheduler), Arc::new(repo));
        let err = service.query_history(StatusFilter::All, 0, 9, None).await.unwrap_err();
        assert!(matches!(err, HistoryError::Scheduler(_)));
    }

    #[tokio::test]
    async fn refreshed_status_reaches_the_returned_page() {
        // merge_many feeds back into get via shared state
        let state = Arc::new(std::sync::Mutex::new(vec![record("7", JobStatus::Queued)]));

        let mut repo = MockHistoryRepository::new();
        repo.expect_ids_reverse_chronological().returning(|| Ok(vec!["7".to_owned()]));
        {
            let state = state.clone();
            repo.expect_get().returning(move |id| {
                Ok(state.lock().unwrap().iter().find(|r| r.id == id).cloned())
            });
        }
        {
            let state = state.clone();
            repo.expect_merge_many().returning(move |updates| {
                let mut records = state.lock().unwrap();
                for (id, update) in updates {
                    if let Some(r) = records.iter_mut().find(|r| r.id == id) {
                        r.apply(&update);
                    }
                }
                Ok(())
            });
        }

        let mut scheduler = MockJobScheduler::new();
        scheduler.expect_query().times(1).returning(|_| {
            Ok(HashMap::from([(
                "7".to_owned(),
                JobUpdate {
                    status: Some(JobStatus::Running),
                    ..Default::default()
                },
            )]))
        });

        let service = HistoryService::new(Arc::new(scheduler), Arc::new(repo));
        let jobs = service.query_history(StatusFilter::All, 0, 0, None).await.unwrap();
        assert_eq!(jobs[0].status, JobStatus::Running);
    }

    #[tokio::test]
    async fn text_filter_matches_script_name_or_display_name() {
        let mut by_script = record("1", JobStatus::Completed);
        by_script.script_name = Some("run_lammps.sh".to_owned());
        let mut by_name = record("2", JobStatus::Completed);
        by_name.name = Some("lammps-bench".to_owned());
        let mut neither = record("3", JobStatus::Completed);
        neither.name = Some("gromacs".to_owned());

        let repo = repo_with(vec![by_script, by_name, neither]);
        let scheduler = MockJobScheduler::new();
        let service = HistoryService::new(Arc::new(scheduler), Arc::new(repo));

        let jobs = service
            .query_history(StatusFilter::Completed, 0, 9, Some("lammps"))
            .await
            .unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);

        // case-sensitive
        let jobs = service
            .query_history(StatusFilter::Completed, 0, 9, Some("LAMMPS"))
            .await
            .unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn pagination_walks_pages_without_repeats_or_gaps() {
        let records: Vec<JobRecord> =
            (0..7).map(|i| record(&i.to_string(), JobStatus::Completed)).collect();
        let repo = repo_with(records);
        let scheduler = MockJobScheduler::new();
        let service = HistoryService::new(Arc::new(scheduler), Arc::new(repo));

        let rows = 3;
        let mut seen = Vec::new();
        for page in 0..3 {
            let start = page * rows;
            let jobs = service
                .query_history(StatusFilter::All, start, start + rows - 1, None)
                .await
                .unwrap();
            if page < 2 {
                assert_eq!(jobs.len(), rows);
            } else {
                assert_eq!(jobs.len(), 1);
            }
            seen.extend(jobs.into_iter().map(|j| j.id));
        }
        assert_eq!(seen, vec!["6", "5", "4", "3", "2", "1", "0"]);
    }

    #[tokio::test]
    async fn out_of_range_window_is_empty() {
        let repo = repo_with(vec![record("1", JobStatus::Completed)]);
        let scheduler = MockJobScheduler::new();
        let service = HistoryService::new(Arc::new(scheduler), Arc::new(repo));
        let jobs = service.query_history(StatusFilter::All, 5, 9, None).await.unwrap();
        assert!(jobs.is_empty());
    }
}
