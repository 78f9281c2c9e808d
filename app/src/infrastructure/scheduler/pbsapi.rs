use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use domain::{JobScheduler, JobStatus, JobUpdate, SchedulerError};
use regex::Regex;
use serde::Deserialize;

use super::pbs_common::{self, IdPatterns};
use crate::infrastructure::command::RunCommand;

const ENDPOINT_ENV: &str = "PBS_API_ENDPOINT";
const TOKEN_ENV: &str = "PBS_API_TOKEN";

const JOB_LIST_QUERY: &str = r#"
query myJobList {
  jobs(orderBy: J_JOBID_ASC, filter: {withHistoryJobs:true}) {
    edges {
      node {
        jobId
        name
        queue {
          name
        }
        status {
          state
        }
      }
    }
  }
}
"#;

/// PBS with a GraphQL status API: submit and cancel still go through the
/// qsub/qdel CLI, but status comes from one HTTP query over the whole job
/// list (the server reports every job it knows, requested or not; the
/// merge layer drops ids that are not in the store).
pub struct PbsApi {
    runner: Arc<dyn RunCommand + Send + Sync>,
    patterns: IdPatterns,
    client: reqwest::Client,
}

impl PbsApi {
    pub fn new(runner: Arc<dyn RunCommand + Send + Sync>) -> Self {
        Self {
            runner,
            patterns: IdPatterns::any_server(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_job_list(&self) -> Result<JobListResponse, SchedulerError> {
        let endpoint = std::env::var(ENDPOINT_ENV)
            .map_err(|_| SchedulerError::Api(format!("{ENDPOINT_ENV} is not set")))?;
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| SchedulerError::Api(format!("{TOKEN_ENV} is not set")))?;

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(token)
            .json(&serde_json::json!({ "query": JOB_LIST_QUERY }))
            .send()
            .await
            .map_err(|e| SchedulerError::Api(e.to_string()))?
            .error_for_status()
            .map_err(|e| SchedulerError::Api(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| SchedulerError::Parse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl JobScheduler for PbsApi {
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
        _job_ids: &[String],
    ) -> Result<HashMap<String, JobUpdate>, SchedulerError> {
        let response = self.fetch_job_list().await?;
        collect_updates(response)
    }
}

fn collect_updates(
    response: JobListResponse,
) -> Result<HashMap<String, JobUpdate>, SchedulerError> {
    static ID_PREFIX: OnceLock<Regex> = OnceLock::new();
    let id_prefix = ID_PREFIX.get_or_init(|| Regex::new(r"^(\d+)\.").unwrap());
    let edges = response
        .data
        .and_then(|d| d.jobs)
        .map(|j| j.edges)
        .unwrap_or_default();

    let mut info = HashMap::new();
    for edge in edges {
        let node = edge.node;
        let id = id_prefix
            .captures(&node.job_id)
            .map(|c| c[1].to_owned())
            .ok_or_else(|| {
                SchedulerError::Parse(format!("cannot find job ID in \"{}\"", node.job_id))
            })?;
        info.insert(
            id,
            JobUpdate {
                status: node.status.and_then(|s| s.state).map(map_state),
                name: node.name,
                partition: node.queue.and_then(|q| q.name),
                ..Default::default()
            },
        );
    }
    Ok(info)
}

fn map_state(state: i64) -> JobStatus {
    match state {
        // Exiting, Done, Failed, Deleted, StagingFail
        9 | 10 | 11 | 12 | 4 => JobStatus::Completed,
        // Queued, Waiting, DependHeld, Held, StagingIn, Unlicensed, Moved
        0 | 1 | 2 | 3 | 5 | 14 | 13 => JobStatus::Queued,
        // StagingOut, Running, Suspended
        6 | 7 | 8 => JobStatus::Running,
        _ => JobStatus::Unknown,
    }
}

#[derive(Debug, Deserialize)]
struct JobListResponse {
    data: Option<JobListData>,
}

#[derive(Debug, Deserialize)]
struct JobListData {
    jobs: Option<JobConnection>,
}

#[derive(Debug, Deserialize)]
struct JobConnection {
    #[serde(default)]
    edges: Vec<JobEdge>,
}

#[derive(Debug, Deserialize)]
struct JobEdge {
    node: JobNode,
}

#[derive(Debug, Deserialize)]
struct JobNode {
    #[serde(rename = "jobId")]
    job_id: String,
    name: Option<String>,
    queue: Option<QueueNode>,
    status: Option<StatusNode>,
}

#[derive(Debug, Deserialize)]
struct QueueNode {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusNode {
    state: Option<i64>,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn response(body: &str) -> JobListResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn decodes_and_maps_the_job_list() {
        let body = indoc! {r#"
            {
              "data": {
                "jobs": {
                  "edges": [
                    {"node": {"jobId": "12.pbsserver", "name": "solver",
                              "queue": {"name": "workq"}, "status": {"state": 7}}},
                    {"node": {"jobId": "13.pbsserver", "name": "prep",
                              "queue": null, "status": {"state": 10}}},
                    {"node": {"jobId": "14.pbsserver", "name": "held",
                              "queue": {"name": "workq"}, "status": {"state": 3}}},
                    {"node": {"jobId": "15.pbsserver", "name": "odd",
                              "queue": {"name": "workq"}, "status": {"state": 99}}}
                  ]
                }
              }
            }
        "#};

        let info = collect_updates(response(body)).unwrap();
        assert_eq!(info["12"].status, Some(JobStatus::Running));
        assert_eq!(info["12"].partition.as_deref(), Some("workq"));
        assert_eq!(info["13"].status, Some(JobStatus::Completed));
        assert_eq!(info["13"].partition, None);
        assert_eq!(info["14"].status, Some(JobStatus::Queued));
        assert_eq!(info["15"].status, Some(JobStatus::Unknown));
    }

    #[test]
    fn missing_data_section_yields_an_empty_map() {
        let info = collect_updates(response(r#"{"data": null}"#)).unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn unparsable_job_id_fails_the_whole_query() {
        let body = r#"{"data":{"jobs":{"edges":[{"node":{"jobId":"weird",
            "name":null,"queue":null,"status":null}}]}}}"#;
        let err = collect_updates(response(body)).unwrap_err();
        assert!(matches!(err, SchedulerError::Parse(_)));
    }
}
