mod composer;
mod config;
mod infrastructure;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use domain::StatusFilter;
use service::SubmitRequest;
use tracing_subscriber::EnvFilter;

use self::composer::Composer;
use self::config::ComposerConfig;

#[derive(Parser, Debug)]
#[command(name = "composer")]
#[command(version)]
#[command(about = "Submit, track and cancel batch scheduler jobs")]
struct Args {
    /// Configuration file (YAML)
    #[arg(long, default_value = "conf.yml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a job script and record it in the history
    Submit {
        /// Path of the script to submit; its content is copied under the
        /// script location before submission
        script: PathBuf,

        /// Job name shown by the scheduler (defaults to the script name)
        #[arg(long)]
        job_name: Option<String>,

        /// Directory the script is stored in (defaults to <data_dir>/scripts)
        #[arg(long)]
        location: Option<String>,

        /// Extra scheduler options, repeatable
        #[arg(long = "option")]
        options: Vec<String>,

        /// Form metadata recorded with the job, as key=value, repeatable
        #[arg(long = "field")]
        fields: Vec<String>,
    },

    /// Cancel jobs on the scheduler (records stay in the history)
    Cancel { job_ids: Vec<String> },

    /// Remove jobs from the history (no scheduler call)
    Delete { job_ids: Vec<String> },

    /// Show a page of the job history with refreshed status
    History {
        #[arg(long, value_enum, default_value_t = StatusArg::All)]
        status: StatusArg,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Rows per page (defaults to the configured history_rows)
        #[arg(long)]
        rows: Option<usize>,

        /// Case-sensitive substring over script name or job name
        #[arg(long)]
        filter: Option<String>,
    },

    /// Print the number of recorded jobs
    Size,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum StatusArg {
    All,
    Queued,
    Running,
    Completed,
}

impl From<StatusArg> for StatusFilter {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::All => StatusFilter::All,
            StatusArg::Queued => StatusFilter::Queued,
            StatusArg::Running => StatusFilter::Running,
            StatusArg::Completed => StatusFilter::Completed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = ComposerConfig::load(&args.config)
        .with_context(|| format!("cannot load {}", args.config))?;
    let composer = Composer::new(&config).await?;

    match args.command {
        Commands::Submit {
            script,
            job_name,
            location,
            options,
            fields,
        } => {
            let script_name = script
                .file_name()
                .context("script path has no file name")?
                .to_string_lossy()
                .into_owned();
            let content = tokio::fs::read_to_string(&script)
                .await
                .with_context(|| format!("cannot read {}", script.display()))?;
            let request = SubmitRequest {
                script_location: location
                    .unwrap_or_else(|| format!("{}/scripts", config.data_dir)),
                script_name: script_name.clone(),
                script_content: content,
                job_name: job_name.unwrap_or(script_name),
                extra_options: options,
                form_fields: fields
                    .iter()
                    .map(|f| match f.split_once('=') {
                        Some((k, v)) => (k.to_owned(), v.to_owned()),
                        None => (f.clone(), String::new()),
                    })
                    .collect(),
            };
            let ids = composer.submit_job(request).await?;
            println!("{}", ids.join(", "));
        }
        Commands::Cancel { job_ids } => {
            composer.cancel_jobs(&job_ids).await?;
        }
        Commands::Delete { job_ids } => {
            composer.delete_jobs(&job_ids).await?;
        }
        Commands::History {
            status,
            page,
            rows,
            filter,
        } => {
            let rows = rows.unwrap_or(config.history_rows).max(1);
            let page = page.max(1);
            let start_index = (page - 1) * rows;
            let end_index = start_index + rows - 1;
            let jobs = composer
                .query_history(status.into(), start_index, end_index, filter.as_deref())
                .await?;
            for job in jobs {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    job.id,
                    job.status.display(),
                    job.name.as_deref().unwrap_or("-"),
                    job.submission_time.as_deref().unwrap_or("-"),
                    job.partition.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Size => {
            println!("{}", composer.history_size().await?);
        }
    }
    Ok(())
}
