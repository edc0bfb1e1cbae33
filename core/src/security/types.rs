use std::fmt;

use serde::{Deserialize, Serialize};

/// Assessed risk of a request, lowest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Pre-admission assessment of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityVerdict {
    pub threat_level: ThreatLevel,
    pub authorized: bool,
    /// Every step of the resulting task must be confirmed before it runs.
    pub requires_confirmation: bool,
    pub reason: Option<String>,
}

impl SecurityVerdict {
    pub fn allow() -> Self {
        Self {
            threat_level: ThreatLevel::None,
            authorized: true,
            requires_confirmation: false,
            reason: None,
        }
    }

    pub fn deny(threat_level: ThreatLevel, reason: impl Into<String>) -> Self {
        Self {
            threat_level,
            authorized: false,
            requires_confirmation: false,
            reason: Some(reason.into()),
        }
    }

    pub fn confirm(threat_level: ThreatLevel, reason: impl Into<String>) -> Self {
        Self {
            threat_level,
            authorized: true,
            requires_confirmation: true,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationDecision {
    Granted,
    Denied,
}

impl ConfirmationDecision {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}
