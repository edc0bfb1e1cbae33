use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub planner: PlannerConfig,
}

impl AppConfig {
    /// Reject configurations the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordinator.validate()?;

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.kind.trim().is_empty() {
                return Err(ConfigError::Invalid("agent kind must not be empty".into()));
            }
            if !seen.insert(agent.kind.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "agent kind '{}' is declared twice",
                    agent.kind
                )));
            }
            if agent.max_concurrent_steps == 0 {
                return Err(ConfigError::Invalid(format!(
                    "agent '{}': max_concurrent_steps must be positive",
                    agent.kind
                )));
            }
            if agent.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "agent '{}': timeout_ms must be positive",
                    agent.kind
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "conductor_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound on tasks executing at the same time.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    #[serde(default = "default_confirmation_window_ms")]
    pub confirmation_window_ms: u64,

    /// How long a completed or failed task stays queryable.
    #[serde(default = "default_retention_window_ms")]
    pub retention_window_ms: u64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Whole-task deadline. Unset means tasks are bounded only by their
    /// per-step timeouts.
    #[serde(default)]
    pub task_timeout_ms: Option<u64>,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Per-task estimate used before any task has finished.
    #[serde(default = "default_task_estimate_ms")]
    pub default_task_estimate_ms: u64,
}

fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_confirmation_window_ms() -> u64 {
    30_000
}

fn default_retention_window_ms() -> u64 {
    300_000
}

fn default_sweep_interval_ms() -> u64 {
    30_000
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_task_estimate_ms() -> u64 {
    1_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            confirmation_window_ms: default_confirmation_window_ms(),
            retention_window_ms: default_retention_window_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            task_timeout_ms: None,
            event_channel_capacity: default_event_channel_capacity(),
            default_task_estimate_ms: default_task_estimate_ms(),
        }
    }
}

impl CoordinatorConfig {
    /// Largest accepted `max_concurrent_tasks`: the semaphore's permit limit,
    /// capped so shutdown can still reclaim every slot in one `acquire_many`.
    pub const MAX_CONCURRENT_TASKS: usize = {
        let permits = tokio::sync::Semaphore::MAX_PERMITS;
        if permits < u32::MAX as usize {
            permits
        } else {
            u32::MAX as usize
        }
    };

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.max_concurrent_tasks must be positive".into(),
            ));
        }
        if self.max_concurrent_tasks > Self::MAX_CONCURRENT_TASKS {
            return Err(ConfigError::Invalid(format!(
                "coordinator.max_concurrent_tasks must be at most {}",
                Self::MAX_CONCURRENT_TASKS
            )));
        }
        if self.confirmation_window_ms == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.confirmation_window_ms must be positive".into(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.sweep_interval_ms must be positive".into(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "coordinator.event_channel_capacity must be positive".into(),
            ));
        }
        if self.task_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "coordinator.task_timeout_ms must be positive when set".into(),
            ));
        }
        Ok(())
    }

    pub fn confirmation_window(&self) -> Duration {
        Duration::from_millis(self.confirmation_window_ms)
    }

    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.retention_window_ms.min(i64::MAX as u64) as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }
}

/// One `[[agents]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub kind: String,

    /// Which built-in implementation backs this kind.
    #[serde(default = "default_agent_driver")]
    pub driver: String,

    #[serde(default = "default_max_concurrent_steps")]
    pub max_concurrent_steps: usize,

    #[serde(default = "default_agent_timeout_ms")]
    pub timeout_ms: u64,

    /// Every action of this agent needs confirmation.
    #[serde(default)]
    pub sensitive: bool,

    /// Only these actions need confirmation.
    #[serde(default)]
    pub sensitive_actions: Vec<String>,

    /// Driver specific settings.
    #[serde(default)]
    pub options: Map<String, Value>,
}

fn default_agent_driver() -> String {
    "echo".to_string()
}

fn default_max_concurrent_steps() -> usize {
    1
}

fn default_agent_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Regexes that reject a request outright.
    #[serde(default)]
    pub blocked_patterns: Vec<String>,

    /// Regexes that admit a request but require every step to be confirmed.
    #[serde(default)]
    pub confirm_patterns: Vec<String>,

    /// Grant every confirmation without asking. Meant for unattended runs.
    #[serde(default)]
    pub auto_approve: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub rules: Vec<PlannerRule>,

    #[serde(default)]
    pub fallback: Option<FallbackStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerRule {
    pub keywords: Vec<String>,
    pub agent: String,
    pub action: String,

    #[serde(default)]
    pub critical: bool,

    #[serde(default)]
    pub priority: Option<u8>,

    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Step used when no rule matches; the raw input is passed as `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackStep {
    pub agent: String,
    pub action: String,
}
