use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] lookout_core::CoreError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Orchestrator is already running (PID {0})")]
    AlreadyRunning(u32),
}
