pub mod approve;
pub mod audit;
pub mod config;
pub mod heartbeat;
pub mod init;
pub mod item;
pub mod run;
pub mod status;
pub mod unit;
pub mod watchdog;

use lookout_core::CoreError;
use lookout_supervisor::SupervisorError;

/// Non-zero exits with a meaning beyond "something failed". `main` downcasts
/// for these; every other error exits 1.
#[derive(Debug)]
pub enum CliExit {
    /// Some of the requested units could not be acted on.
    Partial { failed: usize, total: usize },
    /// The configuration did not pass validation.
    ConfigInvalid(String),
}

impl CliExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliExit::Partial { .. } => 1,
            CliExit::ConfigInvalid(_) => 2,
        }
    }
}

impl std::fmt::Display for CliExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliExit::Partial { failed, total } => {
                write!(f, "failed for {failed} of {total} units")
            }
            CliExit::ConfigInvalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for CliExit {}

/// Core errors that mean the config itself cannot be used get exit 2;
/// everything else passes through as a plain failure.
pub fn config_error(err: CoreError) -> anyhow::Error {
    match err {
        CoreError::Config(msg) => CliExit::ConfigInvalid(msg).into(),
        CoreError::Yaml(e) => CliExit::ConfigInvalid(e.to_string()).into(),
        other => anyhow::anyhow!("{other}"),
    }
}

/// Same mapping for errors surfacing through the supervisor at startup.
pub fn startup_error(err: SupervisorError) -> anyhow::Error {
    match err {
        SupervisorError::Core(core) => config_error(core),
        other => anyhow::anyhow!("{other}"),
    }
}
