mod fujitsu_tcs;
mod pbs;
mod pbs_common;
mod pbsapi;
mod pbspro;
mod slurm;

use std::sync::Arc;

use domain::JobScheduler;

use crate::infrastructure::command::RunCommand;

#[rustfmt::skip]
pub use self::{
    fujitsu_tcs::FujitsuTcs,
    pbs::Pbs,
    pbsapi::PbsApi,
    pbspro::PbsPro,
    slurm::Slurm,
};

/// Resolve the configured backend name, once at startup. An unknown name is
/// a fatal configuration error; no request is handled afterwards.
pub fn create(
    name: &str,
    runner: Arc<dyn RunCommand + Send + Sync>,
) -> Result<Arc<dyn JobScheduler + Send + Sync>, crate::config::ConfigError> {
    Ok(match name {
        "slurm" => Arc::new(Slurm::new(runner)),
        "pbs" => Arc::new(Pbs::new(runner)),
        "pbspro" => Arc::new(PbsPro::new(runner)),
        "pbsapi" => Arc::new(PbsApi::new(runner)),
        "fujitsu_tcs" => Arc::new(FujitsuTcs::new(runner)),
        other => return Err(crate::config::ConfigError::UnknownScheduler(other.to_owned())),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::infrastructure::command::CommandRunner;

    use super::*;

    #[test]
    fn every_configured_backend_resolves() {
        let runner: Arc<dyn RunCommand + Send + Sync> =
            Arc::new(CommandRunner::new(None, HashMap::new(), None));
        for name in ["slurm", "pbs", "pbspro", "pbsapi", "fujitsu_tcs"] {
            assert!(create(name, runner.clone()).is_ok(), "{name} should resolve");
        }
    }

    #[test]
    fn unknown_backend_is_a_fatal_config_error() {
        let runner: Arc<dyn RunCommand + Send + Sync> =
            Arc::new(CommandRunner::new(None, HashMap::new(), None));
        let err = match create("lsf", runner) {
            Err(err) => err,
            Ok(_) => panic!("lsf should not resolve"),
        };
        assert!(err.to_string().contains("lsf"));
    }
}
