use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use domain::{JobScheduler, JobStatus, JobUpdate, SchedulerError};
use regex::Regex;

use crate::infrastructure::command::RunCommand;

/// Maximum `pjstat -H day=N` lookback. Jobs finished before that drop out
/// of every result set and keep whatever status the store last saw.
const HISTORY_DAYS: u32 = 365;

const QUERY_COLUMNS: &str = "--choose=jid,jnam,rscg,st,jmdl,ec,pc,sdt,elp,edt";

pub struct FujitsuTcs {
    runner: Arc<dyn RunCommand + Send + Sync>,
}

impl FujitsuTcs {
    pub fn new(runner: Arc<dyn RunCommand + Send + Sync>) -> Self {
        Self { runner }
    }
}

#[async_trait::async_trait]
impl JobScheduler for FujitsuTcs {
    async fn submit(
        &self,
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

        let out = self.runner.run("pjsub", &args).await?;
        if !out.success {
            return Err(SchedulerError::process(&out.stdout, &out.stderr));
        }
        static SUBMITTED: OnceLock<Regex> = OnceLock::new();
        let job_id = SUBMITTED
            .get_or_init(|| Regex::new(r"Job (\d+) submitted").unwrap())
            .captures(&out.stdout)
            .map(|c| c[1].to_owned())
            .ok_or_else(|| SchedulerError::Parse("Job ID not found in output.".to_owned()))?;

        // The job model code distinguishes a bulk (array) job from a
        // normal one; only pjstat can tell.
        let out = self
            .runner
            .run(
                "pjstat",
                &[
                    "-E".to_owned(),
                    "--data".to_owned(),
                    "--choose=jid,jmdl".to_owned(),
                    job_id.clone(),
                ],
            )
            .await?;
        if !out.success {
            return Err(SchedulerError::process(&out.stdout, &out.stderr));
        }
        parse_submitted_ids(&out.stdout, &job_id)
    }

    async fn cancel(&self, job_ids: &[String]) -> Result<(), SchedulerError> {
        let out = self.runner.run("pjdel", job_ids).await?;
        match out.success {
            true => Ok(()),
            // pjdel reports its reason on stderr alone
            false => Err(SchedulerError::Process {
                output: out.stderr.trim().to_owned(),
            }),
        }
    }

    async fn query(
        &self,
        job_ids: &[String],
    ) -> Result<HashMap<String, JobUpdate>, SchedulerError> {
        let mut args = vec![
            "-s".to_owned(),
            "-E".to_owned(),
            "--data".to_owned(),
            QUERY_COLUMNS.to_owned(),
        ];
        args.extend(job_ids.iter().cloned());
        let active = self.runner.run("pjstat", &args).await?;
        if !active.success {
            return Err(SchedulerError::process(&active.stdout, &active.stderr));
        }

        args.push("-H".to_owned());
        args.push(format!("day={HISTORY_DAYS}"));
        let history = self.runner.run("pjstat", &args).await?;
        if !history.success {
            return Err(SchedulerError::process(&history.stdout, &history.stderr));
        }

        parse_pjstat(&active.stdout, &history.stdout)
    }
}

/// `pjstat -E --data` output is CSV with a header row and an empty first
/// column. A bulk job lists the parent and every subjob; the last row's
/// model code tells which case this is.
fn parse_submitted_ids(stdout: &str, job_id: &str) -> Result<Vec<String>, SchedulerError> {
    let rows = read_csv(stdout)?;
    let bulk = rows
        .last()
        .and_then(|row| row.get(2))
        .map(|model| model == "BU")
        .unwrap_or(false);
    if bulk {
        return Ok(rows.iter().filter_map(|row| row.get(1)).map(str::to_owned).collect());
    }
    match rows.first().and_then(|row| row.get(1)) {
        Some(id) => Ok(vec![id.to_owned()]),
        None => Ok(vec![job_id.to_owned()]),
    }
}

fn parse_pjstat(
    active: &str,
    history: &str,
) -> Result<HashMap<String, JobUpdate>, SchedulerError> {
    let mut info = HashMap::new();
    // active rows first so they win on id collision
    for row in read_csv(active)?.into_iter().chain(read_csv(history)?) {
        let Some(id) = row.get(1) else {
            continue;
        };
        if info.contains_key(id) {
            continue;
        }

        let field = |i: usize| row.get(i).map(str::to_owned);
        info.insert(
            id.to_owned(),
            JobUpdate {
                status: field(4).map(|state| map_state(&state)),
                name: field(2),
                submission_time: None,
                partition: field(3),
                extra: vec![
                    ("Status Detail".to_owned(), field(4)),
                    ("Job Model".to_owned(), field(5).map(|m| job_model(&m).to_owned())),
                    ("Exit Code".to_owned(), field(6)),
                    ("PJM Code".to_owned(), field(7)),
                    ("Start Time".to_owned(), field(8)),
                    ("Elapse Time".to_owned(), field(9)),
                    ("End Time".to_owned(), field(10)),
                ],
            },
        );
    }
    Ok(info)
}

fn read_csv(stdout: &str) -> Result<Vec<csv::StringRecord>, SchedulerError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(stdout.as_bytes());
    reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SchedulerError::Parse(e.to_string()))
}

fn map_state(state: &str) -> JobStatus {
    match state {
        "RJT" | "EXT" | "CCL" | "ERR" => JobStatus::Completed,
        "ACC" | "QUE" | "RNA" | "SPP" | "SPD" | "RSM" | "HLD" => JobStatus::Queued,
        "RNP" | "RUN" | "RNE" | "RNO" => JobStatus::Running,
        _ => JobStatus::Unknown,
    }
}

fn job_model(code: &str) -> &'static str {
    match code {
        "NM" => "Normal Job",
        "ST" => "Step Job",
        "BU" => "Bulk Job",
        "MW" => "Master-Worker Job",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::infrastructure::command::{CommandOutput, MockRunCommand};

    use super::*;

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_owned(),
            stderr: String::new(),
            success: true,
        }
    }

    #[tokio::test]
    async fn submit_normal_job_returns_the_single_id() {
        let mut runner = MockRunCommand::new();
        runner
            .expect_run()
            .withf(|cmd, _| cmd == "pjsub")
            .returning(|_, _| Ok(ok("[INFO] PJM 0000 pjsub Job 34704010 submitted.\n")));
        runner
            .expect_run()
            .withf(|cmd, _| cmd == "pjstat")
            .returning(|_, _| Ok(ok("H,JOB_ID,MD\n,34704010,NM\n")));

        let tcs = FujitsuTcs::new(Arc::new(runner));
        let ids = tcs.submit("run.sh", "bench", &[]).await.unwrap();
        assert_eq!(ids, vec!["34704010"]);
    }

    #[tokio::test]
    async fn submit_bulk_job_returns_every_listed_id() {
        let pjstat = indoc! {"
            H,JOB_ID,MD
            ,34703955,BU
            ,34703955[1],BU
            ,34703955[2],BU
        "};
        let mut runner = MockRunCommand::new();
        runner
            .expect_run()
            .withf(|cmd, _| cmd == "pjsub")
            .returning(|_, _| Ok(ok("Job 34703955 submitted.\n")));
        runner
            .expect_run()
            .withf(|cmd, args| cmd == "pjstat" && args.contains(&"--choose=jid,jmdl".to_owned()))
            .returning(move |_, _| Ok(ok(pjstat)));

        let tcs = FujitsuTcs::new(Arc::new(runner));
        let ids = tcs.submit("sweep.sh", "", &[]).await.unwrap();
        assert_eq!(ids, vec!["34703955", "34703955[1]", "34703955[2]"]);
    }

    #[tokio::test]
    async fn cancel_failure_reports_stderr_only() {
        let mut runner = MockRunCommand::new();
        runner.expect_run().returning(|_, _| {
            Ok(CommandOutput {
                stdout: "noise".to_owned(),
                stderr: "[ERR.] PJM 0021 pjdel No such job found.".to_owned(),
                success: false,
            })
        });

        let tcs = FujitsuTcs::new(Arc::new(runner));
        let err = tcs.cancel(&["1".to_owned()]).await.unwrap_err();
        match err {
            SchedulerError::Process { output } => {
                assert_eq!(output, "[ERR.] PJM 0021 pjdel No such job found.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_merges_active_and_history_with_active_winning() {
        let active = indoc! {"
            H,JOB_ID,JOB_NAME,RSC_GRP,ST,MD,EC,PC,START_DATE,ELAPSE_TIM,END_DATE
            ,34716168,sweep,small,RUN,BU,-,-,10/11 10:23:03,00:01:00,-
        "};
        let history = indoc! {"
            H,JOB_ID,JOB_NAME,RSC_GRP,ST,MD,EC,PC,START_DATE,ELAPSE_TIM,END_DATE
            ,34716159,solo,small,EXT,NM,0,0,10/11 10:21:31,00:00:05,10/11 10:21:36
            ,34716168,sweep,small,EXT,BU,0,0,10/11 10:23:03,00:02:00,10/11 10:25:03
        "};
        let info = parse_pjstat(active, history).unwrap();

        assert_eq!(info["34716168"].status, Some(JobStatus::Running));
        assert_eq!(info["34716168"].extra_value("Job Model"), Some("Bulk Job"));
        assert_eq!(info["34716159"].status, Some(JobStatus::Completed));
        assert_eq!(info["34716159"].name.as_deref(), Some("solo"));
        assert_eq!(info["34716159"].extra_value("Exit Code"), Some("0"));
        assert_eq!(info["34716159"].partition.as_deref(), Some("small"));
    }

    #[tokio::test]
    async fn query_issues_the_history_pass_with_the_lookback() {
        let header = "H,JOB_ID,JOB_NAME,RSC_GRP,ST,MD,EC,PC,START_DATE,ELAPSE_TIM,END_DATE\n";
        let mut runner = MockRunCommand::new();
        runner
            .expect_run()
            .withf(|cmd, args| cmd == "pjstat" && !args.contains(&"-H".to_owned()))
            .times(1)
            .returning(move |_, _| Ok(ok(header)));
        runner
            .expect_run()
            .withf(|cmd, args| {
                cmd == "pjstat"
                    && args.contains(&"-H".to_owned())
                    && args.contains(&"day=365".to_owned())
            })
            .times(1)
            .returning(move |_, _| Ok(ok(header)));

        let tcs = FujitsuTcs::new(Arc::new(runner));
        let info = tcs.query(&["1".to_owned()]).await.unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn unknown_state_code_maps_to_unknown() {
        assert_eq!(map_state("???"), JobStatus::Unknown);
        assert_eq!(map_state("HLD"), JobStatus::Queued);
        assert_eq!(map_state("RNO"), JobStatus::Running);
    }
}
