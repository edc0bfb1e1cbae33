use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::error::RegistryError;

use super::traits::Parameters;

type SensitivityFn = dyn Fn(&str, &Parameters) -> bool + Send + Sync;

/// Whether invoking an agent needs explicit confirmation first.
#[derive(Clone, Default)]
pub enum Sensitivity {
    #[default]
    Never,
    Always,
    /// Only the listed actions.
    Actions(BTreeSet<String>),
    /// Decided per step from its action and parameters.
    Custom(Arc<SensitivityFn>),
}

impl Sensitivity {
    pub fn actions<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Actions(actions.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&str, &Parameters) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    pub fn requires_confirmation(&self, action: &str, parameters: &Parameters) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Actions(actions) => actions.contains(action),
            Self::Custom(predicate) => predicate(action, parameters),
        }
    }
}

impl fmt::Debug for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::Always => f.write_str("Always"),
            Self::Actions(actions) => f.debug_tuple("Actions").field(actions).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Registration record for one agent kind.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub kind: String,
    pub max_concurrent_steps: usize,
    pub timeout: Duration,
    pub sensitivity: Sensitivity,
}

impl AgentDescriptor {
    pub fn new(kind: impl Into<String>, max_concurrent_steps: usize, timeout: Duration) -> Self {
        Self {
            kind: kind.into(),
            max_concurrent_steps,
            timeout,
            sensitivity: Sensitivity::Never,
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn sensitive(self) -> Self {
        self.with_sensitivity(Sensitivity::Always)
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        let sensitivity = if cfg.sensitive {
            Sensitivity::Always
        } else if !cfg.sensitive_actions.is_empty() {
            Sensitivity::actions(cfg.sensitive_actions.iter().cloned())
        } else {
            Sensitivity::Never
        };

        Self::new(
            cfg.kind.clone(),
            cfg.max_concurrent_steps,
            Duration::from_millis(cfg.timeout_ms),
        )
        .with_sensitivity(sensitivity)
    }

    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidDescriptor {
            kind: self.kind.clone(),
            reason: reason.to_string(),
        };
        if self.kind.trim().is_empty() {
            return Err(invalid("kind must not be empty"));
        }
        if self.max_concurrent_steps == 0 {
            return Err(invalid("max_concurrent_steps must be positive"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be positive"));
        }
        Ok(())
    }
}
