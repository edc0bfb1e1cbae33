use thiserror::Error;

use crate::task::transitions::TransitionError;
use crate::task::TaskId;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("agent kind '{0}' is already registered")]
    DuplicateAgent(String),
    #[error("agent kind '{0}' is not registered")]
    AgentUnavailable(String),
    #[error("invalid descriptor for '{kind}': {reason}")]
    InvalidDescriptor { kind: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("cannot determine home directory")]
    NoHomeDir,
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("coordinator is shut down")]
    ShutDown,
    #[error("no security gate configured")]
    MissingSecurityGate,
    #[error("invalid task transition: {0}")]
    Transition(#[from] TransitionError),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
