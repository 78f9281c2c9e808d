//! Pieces shared by the PBS-family backends (`pbs`, `pbspro`, `pbsapi`):
//! qsub submission with array detection, qstat-based subjob expansion, and
//! the plain-text qstat row parser.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::Datelike;
use domain::{JobStatus, JobUpdate, SchedulerError};
use regex::Regex;

use crate::infrastructure::command::RunCommand;

/// Id patterns differ between site-local PBS (`123.opbs`) and the API-backed
/// server (`123.<any fqdn>`).
pub struct IdPatterns {
    pub plain: Regex,
    pub array: Regex,
}

impl IdPatterns {
    pub fn opbs() -> Self {
        Self {
            plain: Regex::new(r"^(\d+)\.opbs\s*$").unwrap(),
            array: Regex::new(r"^(\d+)\[\]\.opbs\s*$").unwrap(),
        }
    }

    pub fn any_server() -> Self {
        Self {
            plain: Regex::new(r"^(\d+)\..+$").unwrap(),
            array: Regex::new(r"^(\d+)\[\]\..+$").unwrap(),
        }
    }
}

/// `qsub [-N name] [extra...] script`; an array marker id (`123[]`) is
/// expanded through `qstat -t` into the concrete `123[k]` subjob list.
pub async fn submit(
    runner: &Arc<dyn RunCommand + Send + Sync>,
    patterns: &IdPatterns,
    script_path: &str,
    job_name: &str,
    extra_options: &[String],
) -> Result<Vec<String>, SchedulerError> {
    let mut args = Vec::new();
    if !job_name.is_empty() {
        args.push("-N".to_owned());
        args.push(job_name.to_owned());
    }
    args.extend(extra_options.iter().cloned());
    args.push(script_path.to_owned());

    let out = runner.run("qsub", &args).await?;
    if !out.success {
        return Err(SchedulerError::process(&out.stdout, &out.stderr));
    }

    let stdout = out.stdout.trim();
    if let Some(captures) = patterns.plain.captures(stdout) {
        return Ok(vec![captures[1].to_owned()]);
    }
    if let Some(captures) = patterns.array.captures(stdout) {
        return expand_array(runner, &captures[1]).await;
    }
    Err(SchedulerError::Parse("Job ID not found in output.".to_owned()))
}

async fn expand_array(
    runner: &Arc<dyn RunCommand + Send + Sync>,
    parent: &str,
) -> Result<Vec<String>, SchedulerError> {
    let out = runner
        .run("qstat", &["-t".to_owned(), format!("{parent}[]")])
        .await?;
    if !out.success {
        return Err(SchedulerError::process(&out.stdout, &out.stderr));
    }

    static SUBJOB: OnceLock<Regex> = OnceLock::new();
    let subjob = SUBJOB.get_or_init(|| Regex::new(r"^\d+\[\d+\]$").unwrap());
    let ids: Vec<String> = out
        .stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|first| subjob.is_match(first))
        .map(str::to_owned)
        .collect();
    Ok(ids)
}

pub async fn cancel(
    runner: &Arc<dyn RunCommand + Send + Sync>,
    job_ids: &[String],
) -> Result<(), SchedulerError> {
    let out = runner.run("qdel", job_ids).await?;
    match out.success {
        true => Ok(()),
        false => Err(SchedulerError::process(&out.stdout, &out.stderr)),
    }
}

/// Two `qstat -v -t` passes: one for active jobs, one with the history flag
/// for the backend's lookback window. Active rows win on id collision.
pub async fn query(
    runner: &Arc<dyn RunCommand + Send + Sync>,
    history_days: u32,
    job_ids: &[String],
) -> Result<HashMap<String, JobUpdate>, SchedulerError> {
    let mut active_args = vec!["-v".to_owned(), "-t".to_owned()];
    active_args.extend(job_ids.iter().cloned());
    let active = runner.run("qstat", &active_args).await?;
    if !active.success {
        return Err(SchedulerError::process(&active.stdout, &active.stderr));
    }

    let mut history_args = vec![
        "-v".to_owned(),
        "-t".to_owned(),
        "-H".to_owned(),
        "--hday".to_owned(),
        history_days.to_string(),
    ];
    history_args.extend(job_ids.iter().cloned());
    let history = runner.run("qstat", &history_args).await?;
    if !history.success {
        return Err(SchedulerError::process(&history.stdout, &history.stderr));
    }

    Ok(parse_qstat(&active.stdout, &history.stdout))
}

fn parse_qstat(active: &str, history: &str) -> HashMap<String, JobUpdate> {
    let mut info = HashMap::new();
    for line in active.lines().chain(history.lines()) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some(&id) = fields.first() else {
            continue;
        };
        if !id.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        if info.contains_key(id) {
            continue; // active pass already reported this id
        }

        let field = |i: usize| fields.get(i).map(|f| f.to_string());
        let start_date = fields.get(5).map(|date| {
            let time = fields.get(6).copied().unwrap_or_default();
            format!("{}-{} {}", chrono::Local::now().year(), date.replace('/', "-"), time)
        });
        info.insert(
            id.to_owned(),
            JobUpdate {
                status: fields.get(2).map(|state| map_state(state)),
                name: field(1),
                submission_time: None,
                partition: field(4),
                extra: vec![
                    ("PROJECT".to_owned(), field(3)),
                    ("START_DATE".to_owned(), start_date),
                    ("ELAPSE".to_owned(), field(7)),
                    ("TOKEN".to_owned(), field(8)),
                    ("NODE".to_owned(), field(9)),
                    ("MIG".to_owned(), field(10)),
                ],
            },
        );
    }
    info
}

fn map_state(state: &str) -> JobStatus {
    match state {
        "FINISH" | "EXPIRED" => JobStatus::Completed,
        "QUEUED" | "HOLD" => JobStatus::Queued,
        "RUNNING" | "BEGUN" | "EXITING" => JobStatus::Running,
        _ => JobStatus::Unknown,
    }
}
