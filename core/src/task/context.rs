use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::security::ThreatLevel;

const CONFIRMED_PREFIX: &str = "confirmed:";
const ALLOW_PARTIAL_FAILURE: &str = "allow_partial_failure";
const REQUIRE_CONFIRMATION: &str = "require_confirmation";
const THREAT_LEVEL: &str = "threat_level";

/// Key-value bag threaded through a task's steps.
///
/// Besides caller data it carries a few reserved keys: confirmation markers
/// (`confirmed:<agent>:<action>`), the partial-failure switch and the threat
/// level recorded at admission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskContext(BTreeMap<String, Value>);

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_confirmed(&self, agent_kind: &str, action: &str) -> bool {
        self.0
            .get(&confirmation_key(agent_kind, action))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn mark_confirmed(&mut self, agent_kind: &str, action: &str) {
        self.0
            .insert(confirmation_key(agent_kind, action), Value::Bool(true));
    }

    /// Non-fatal step failures let the task continue unless this is false.
    pub fn allow_partial_failure(&self) -> bool {
        self.0
            .get(ALLOW_PARTIAL_FAILURE)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn set_allow_partial_failure(&mut self, allow: bool) {
        self.0
            .insert(ALLOW_PARTIAL_FAILURE.to_string(), Value::Bool(allow));
    }

    /// Every step of the task is treated as sensitive.
    pub fn requires_confirmation(&self) -> bool {
        self.0
            .get(REQUIRE_CONFIRMATION)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_requires_confirmation(&mut self, required: bool) {
        self.0
            .insert(REQUIRE_CONFIRMATION.to_string(), Value::Bool(required));
    }

    pub fn threat_level(&self) -> Option<ThreatLevel> {
        self.0
            .get(THREAT_LEVEL)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_threat_level(&mut self, level: ThreatLevel) {
        if let Ok(v) = serde_json::to_value(level) {
            self.0.insert(THREAT_LEVEL.to_string(), v);
        }
    }
}

fn confirmation_key(agent_kind: &str, action: &str) -> String {
    format!("{CONFIRMED_PREFIX}{agent_kind}:{action}")
}
