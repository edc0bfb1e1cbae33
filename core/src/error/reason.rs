use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable numeric codes for failure reasons, surfaced to callers and used for
/// process exit mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    AgentUnavailable = 10,
    AgentBusy = 11,
    AgentTimeout = 12,
    AgentFailed = 13,
    ConfirmationDenied = 20,
    ConfirmationTimeout = 21,
    SecurityRejected = 22,
    Unauthorized = 23,
    TaskTimeout = 30,
    Cancelled = 31,
    PlanningFailed = 40,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Why a step, a task or a submission did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("agent '{0}' is not registered")]
    AgentUnavailable(String),

    #[error("agent '{kind}' is at capacity ({capacity} concurrent steps)")]
    AgentBusy { kind: String, capacity: usize },

    #[error("agent '{kind}' timed out after {timeout_ms}ms")]
    AgentTimeout { kind: String, timeout_ms: u64 },

    #[error("agent failed: {0}")]
    AgentFailed(String),

    #[error("agent refused the operation: {0}")]
    Unauthorized(String),

    #[error("confirmation denied for '{action}'")]
    ConfirmationDenied { action: String },

    #[error("confirmation for '{action}' not granted within {window_ms}ms")]
    ConfirmationTimeout { action: String, window_ms: u64 },

    #[error("request rejected by security gate: {0}")]
    SecurityRejected(String),

    #[error("task exceeded its {timeout_ms}ms deadline")]
    TaskTimeout { timeout_ms: u64 },

    #[error("task cancelled")]
    Cancelled,

    #[error("coordinator is shutting down")]
    ShuttingDown,

    #[error("planning failed: {0}")]
    PlanningFailed(String),

    #[error("planner produced no steps")]
    EmptyPlan,
}

impl FailureReason {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::AgentUnavailable(_) => ErrorCode::AgentUnavailable,
            Self::AgentBusy { .. } => ErrorCode::AgentBusy,
            Self::AgentTimeout { .. } => ErrorCode::AgentTimeout,
            Self::AgentFailed(_) => ErrorCode::AgentFailed,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::ConfirmationDenied { .. } => ErrorCode::ConfirmationDenied,
            Self::ConfirmationTimeout { .. } => ErrorCode::ConfirmationTimeout,
            Self::SecurityRejected(_) => ErrorCode::SecurityRejected,
            Self::TaskTimeout { .. } => ErrorCode::TaskTimeout,
            Self::Cancelled | Self::ShuttingDown => ErrorCode::Cancelled,
            Self::PlanningFailed(_) | Self::EmptyPlan => ErrorCode::PlanningFailed,
        }
    }

    /// Authorization-class failures. These abort the task even when the
    /// failing step is not critical.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationDenied { .. }
                | Self::ConfirmationTimeout { .. }
                | Self::SecurityRejected(_)
                | Self::Unauthorized(_)
        )
    }

    /// Whether a step failing with this reason ends the whole task.
    pub fn aborts_task(&self, critical: bool) -> bool {
        critical
            || self.is_security()
            || matches!(
                self,
                Self::AgentUnavailable(_)
                    | Self::TaskTimeout { .. }
                    | Self::Cancelled
                    | Self::ShuttingDown
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_failures_always_abort() {
        let denied = FailureReason::ConfirmationDenied {
            action: "unlock".into(),
        };
        assert!(denied.is_security());
        assert!(denied.aborts_task(false));

        let refused = FailureReason::Unauthorized("badge expired".into());
        assert!(refused.aborts_task(false));
    }

    #[test]
    fn test_resource_failures_abort_only_when_critical() {
        let busy = FailureReason::AgentBusy {
            kind: "speech".into(),
            capacity: 1,
        };
        assert!(!busy.is_security());
        assert!(!busy.aborts_task(false));
        assert!(busy.aborts_task(true));

        let timeout = FailureReason::AgentTimeout {
            kind: "vision".into(),
            timeout_ms: 50,
        };
        assert!(!timeout.aborts_task(false));
    }

    #[test]
    fn test_unregistered_agent_is_fatal() {
        assert!(FailureReason::AgentUnavailable("lidar".into()).aborts_task(false));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(FailureReason::Cancelled.error_code().as_u16(), 31);
        assert_eq!(
            FailureReason::SecurityRejected("x".into()).error_code(),
            ErrorCode::SecurityRejected
        );
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(FailureReason::AgentTimeout {
            kind: "speech".into(),
            timeout_ms: 100,
        })
        .unwrap();
        assert_eq!(json["kind"], "agent_timeout");
        assert_eq!(json["detail"]["timeout_ms"], 100);
    }
}
