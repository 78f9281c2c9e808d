use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Captured result of one external command. A non-zero exit is data, not an
/// error; callers inspect `success` themselves.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Runs one external command with captured output. Mocked in adapter tests
/// to drive canned scheduler output through the real parse paths.
#[mockall::automock]
#[async_trait::async_trait]
pub trait RunCommand {
    async fn run(&self, command: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Builds adapter command lines as a structured argument list: optional SSH
/// wrapper tokens, then the resolved executable, then the backend's own
/// flags. Nothing is ever interpolated into a shell string, so
/// user-supplied job names cannot smuggle shell syntax.
pub struct CommandRunner {
    bin_dir: Option<PathBuf>,
    bin_overrides: HashMap<String, String>,
    ssh_wrapper: Vec<String>,
}

impl CommandRunner {
    pub fn new(
        bin_dir: Option<&str>,
        bin_overrides: HashMap<String, String>,
        ssh_wrapper: Option<&str>,
    ) -> Self {
        Self {
            bin_dir: bin_dir.map(PathBuf::from),
            bin_overrides,
            ssh_wrapper: ssh_wrapper
                .map(|w| w.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default(),
        }
    }

    /// Override wins, then `bin_dir/command` when that path exists, then the
    /// bare name resolved via the ambient search path.
    fn resolve(&self, command: &str) -> String {
        if let Some(path) = self.bin_overrides.get(command) {
            return path.clone();
        }
        if let Some(dir) = &self.bin_dir {
            let candidate = dir.join(command);
            if Path::new(&candidate).exists() {
                return candidate.to_string_lossy().into_owned();
            }
        }
        command.to_owned()
    }
}

#[async_trait::async_trait]
impl RunCommand for CommandRunner {
    async fn run(&self, command: &str, args: &[String]) -> io::Result<CommandOutput> {
        let resolved = self.resolve(command);
        let mut invocation = match self.ssh_wrapper.split_first() {
            Some((ssh, rest)) => {
                let mut cmd = Command::new(ssh);
                cmd.args(rest).arg(&resolved);
                cmd
            }
            None => Command::new(&resolved),
        };
        tracing::debug!(command = %resolved, ?args, "running scheduler command");
        let out = invocation.args(args).output().await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            success: out.status.success(),
        })
    }
}
