use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use domain::{JobScheduler, JobStatus, JobUpdate, SchedulerError};
use regex::Regex;

use crate::infrastructure::command::RunCommand;

pub struct Slurm {
    runner: Arc<dyn RunCommand + Send + Sync>,
}

impl Slurm {
    pub fn new(runner: Arc<dyn RunCommand + Send + Sync>) -> Self {
        Self { runner }
    }
}

#[async_trait::async_trait]
impl JobScheduler for Slurm {
    async fn submit(
        &self,
        script_path: &str,
        job_name: &str,
        extra_options: &[String],
    ) -> Result<Vec<String>, SchedulerError> {
        let mut args = Vec::new();
        if !job_name.is_empty() {
            args.push("-J".to_owned());
            args.push(job_name.to_owned());
        }
        args.extend(extra_options.iter().cloned());
        args.push(script_path.to_owned());

        let out = self.runner.run("sbatch", &args).await?;
        if !out.success {
            return Err(SchedulerError::process(&out.stdout, &out.stderr));
        }
        let job_id = parse_submit_id(&out.stdout)?;

        // An array submission only reveals its task ids through scontrol.
        let out = self
            .runner
            .run("scontrol", &["show".to_owned(), "job".to_owned(), job_id.clone()])
            .await?;
        if !out.success {
            return Err(SchedulerError::process(&out.stdout, &out.stderr));
        }
        match expand_array_tasks(&out.stdout) {
            Some(indices) => Ok(indices.into_iter().map(|i| format!("{job_id}_{i}")).collect()),
            None => Ok(vec![job_id]),
        }
    }

    async fn cancel(&self, job_ids: &[String]) -> Result<(), SchedulerError> {
        let out = self.runner.run("scancel", &[job_ids.join(",")]).await?;
        match out.success {
            true => Ok(()),
            false => Err(SchedulerError::process(&out.stdout, &out.stderr)),
        }
    }

    async fn query(
        &self,
        job_ids: &[String],
    ) -> Result<HashMap<String, JobUpdate>, SchedulerError> {
        let args = vec![
            "--format=JobID,JobName,Submit,Partition,State%20,Start,End".to_owned(),
            "-n".to_owned(),
            "-j".to_owned(),
            job_ids.join(","),
        ];
        let out = self.runner.run("sacct", &args).await?;
        if !out.success {
            return Err(SchedulerError::process(&out.stdout, &out.stderr));
        }
        Ok(parse_sacct(&out.stdout))
    }
}

fn parse_submit_id(stdout: &str) -> Result<String, SchedulerError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Submitted batch job (\d+)").unwrap())
        .captures(stdout)
        .map(|c| c[1].to_owned())
        .ok_or_else(|| SchedulerError::Parse("Job ID not found in output.".to_owned()))
}

/// Collect the sorted task index set from `scontrol show job` output, or
/// `None` for a plain (non-array) job. A range spec like `3-4,6` expands to
/// {3, 4, 6}; a trailing throttle (`0-15%4`) is ignored.
fn expand_array_tasks(stdout: &str) -> Option<Vec<u64>> {
    if !stdout.contains("ArrayTaskId") {
        return None;
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let mut indices: Vec<u64> = RE
        .get_or_init(|| Regex::new(r"ArrayTaskId=(\S+)").unwrap())
        .captures_iter(stdout)
        .flat_map(|c| expand_range_spec(&c[1]))
        .collect();
    indices.sort_unstable();
    indices.dedup();
    Some(indices)
}

fn expand_range_spec(spec: &str) -> Vec<u64> {
    let mut out = Vec::new();
    for piece in spec.split(',') {
        match piece.split_once('-') {
            Some((lo, hi)) => {
                if let (Some(lo), Some(hi)) = (leading_int(lo), leading_int(hi)) {
                    out.extend(lo..=hi);
                }
            }
            None => out.extend(leading_int(piece)),
        }
    }
    out
}

fn leading_int(s: &str) -> Option<u64> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// One update per sacct row. Rows for job steps (`.batch`, `.extern`) are
/// skipped. Short rows happen right after submission and on cancel lines;
/// whatever columns exist are kept, the rest stay unset.
fn parse_sacct(stdout: &str) -> HashMap<String, JobUpdate> {
    let mut info = HashMap::new();
    for line in stdout.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&id) = fields.first() else {
            continue;
        };
        if id.ends_with(".batch") || id.ends_with(".extern") {
            continue;
        }

        let update = if fields.len() >= 7 {
            JobUpdate {
                status: Some(map_state(fields[4])),
                name: Some(fields[1].to_owned()),
                submission_time: Some(fields[2].replace('T', " ")),
                partition: Some(fields[3].to_owned()),
                extra: vec![
                    ("Start Time".to_owned(), Some(fields[5].replace('T', " "))),
                    ("End Time".to_owned(), Some(fields[6].replace('T', " "))),
                ],
            }
        } else {
            JobUpdate {
                submission_time: fields.get(2).map(|f| f.replace('T', " ")),
                extra: vec![
                    ("Start Time".to_owned(), fields.get(5).map(|f| f.replace('T', " "))),
                    ("End Time".to_owned(), fields.get(6).map(|f| f.replace('T', " "))),
                ],
                ..Default::default()
            }
        };
        info.insert(id.to_owned(), update);
    }
    info
}

fn map_state(state: &str) -> JobStatus {
    match state {
        "BOOT_FAIL" | "CANCELLED" | "COMPLETED" | "DEADLINE" | "FAILED" | "NODE_FAIL"
        | "OUT_OF_MEMORY" | "REVOKED" | "SPECIAL_EXIT" | "TIMEOUT" => JobStatus::Completed,
        "CONFIGURING" | "REQUEUED" | "RESIZING" | "PENDING" | "PREEMPTED" | "SUSPENDED" => {
            JobStatus::Queued
        }
        "COMPLETING" | "RUNNING" | "STOPPED" => JobStatus::Running,
        _ => JobStatus::Unknown,
    }
}
