use thiserror::Error;

/// Failure modes of a scheduler adapter. Every adapter operation returns an
/// explicit `Result`; nothing panics across the contract boundary.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The external command exited non-zero. `output` carries what the
    /// backend wrote, per that backend's convention (usually combined
    /// stdout and stderr).
    #[error("scheduler command failed: {output}")]
    Process { output: String },

    /// Backend output did not match the expected pattern (no job id,
    /// malformed row, malformed response body).
    #[error("{0}")]
    Parse(String),

    /// The HTTP/GraphQL backend could not be reached or refused the
    /// request (missing endpoint/token, transport failure, non-2xx).
    #[error("scheduler API error: {0}")]
    Api(String),

    /// The command could not be spawned at all.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    pub fn process(stdout: &str, stderr: &str) -> Self {
        Self::Process {
            output: [stdout.trim(), stderr.trim()]
                .iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}
