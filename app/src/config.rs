use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no such scheduler \"{0}\"; expected one of slurm, pbs, pbspro, pbsapi, fujitsu_tcs")]
    UnknownScheduler(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComposerConfig {
    /// Backend name; resolved through the scheduler registry at startup.
    pub scheduler: String,

    #[serde(default = "ComposerConfig::default_data_dir")]
    pub data_dir: String,

    /// Directory the scheduler binaries live in, when not on PATH.
    #[serde(default)]
    pub bin: Option<String>,

    /// Per-command absolute path overrides, e.g. `sbatch: /opt/slurm/bin/sbatch`.
    #[serde(default)]
    pub bin_overrides: HashMap<String, String>,

    /// Prefix tokens when the scheduler lives behind SSH, e.g. `ssh -p 22 login1`.
    #[serde(default)]
    pub ssh_wrapper: Option<String>,

    #[serde(default = "ComposerConfig::default_history_rows")]
    pub history_rows: usize,
}

impl ComposerConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("COMPOSER"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// One history file per backend, so switching schedulers never mixes
    /// job ids from different systems.
    pub fn history_db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(format!("{}.db", self.scheduler))
    }

    fn default_data_dir() -> String {
        match std::env::var("HOME") {
            Ok(home) => format!("{home}/composer"),
            Err(_) => "composer".to_owned(),
        }
    }

    fn default_history_rows() -> usize {
        10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_everything_but_the_scheduler() {
        let config: ComposerConfig =
            serde_json::from_str(r#"{"scheduler": "slurm"}"#).unwrap();
        assert_eq!(config.history_rows, 10);
        assert!(config.bin.is_none());
        assert!(config.bin_overrides.is_empty());
        assert!(config.history_db_path().ends_with("slurm.db"));
    }
}
