use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use conductor_core::agent::{Agent, AgentError, Parameters};
use conductor_core::task::TaskContext;
use serde_json::{json, Map, Value};

use super::required_str;

/// In-memory device states, standing in for a home-automation bridge.
///
/// Actions: `get`, `set` (`device`, `state`), `toggle`, `lock`, `unlock`
/// and `list`.
pub struct DeviceAgent {
    name: String,
    states: Mutex<BTreeMap<String, Value>>,
}

impl DeviceAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_states(self, states: &Map<String, Value>) -> Self {
        self.lock()
            .extend(states.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set(&self, device: &str, state: Value) -> Value {
        let previous = self.lock().insert(device.to_string(), state.clone());
        json!({
            "device": device,
            "state": state,
            "previous": previous,
        })
    }
}

#[async_trait]
impl Agent for DeviceAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        _context: &TaskContext,
    ) -> Result<Value, AgentError> {
        match action {
            "list" => Ok(Value::Object(
                self.lock()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )),
            "get" => {
                let device = required_str(parameters, "device")?;
                let state = self.lock().get(device).cloned().unwrap_or(Value::Null);
                Ok(json!({ "device": device, "state": state }))
            }
            "set" => {
                let device = required_str(parameters, "device")?;
                let state = parameters
                    .get("state")
                    .cloned()
                    .ok_or_else(|| AgentError::InvalidInput("missing parameter 'state'".into()))?;
                Ok(self.set(device, state))
            }
            "toggle" => {
                let device = required_str(parameters, "device")?;
                let on = self.lock().get(device).and_then(Value::as_bool).unwrap_or(false);
                Ok(self.set(device, Value::Bool(!on)))
            }
            "lock" => Ok(self.set(required_str(parameters, "device")?, json!("locked"))),
            "unlock" => Ok(self.set(required_str(parameters, "device")?, json!("unlocked"))),
            other => Err(AgentError::InvalidInput(format!(
                "unknown device action '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str) -> Parameters {
        let mut p = Parameters::new();
        p.insert("device".into(), json!(name));
        p
    }

    #[tokio::test]
    async fn test_toggle_and_lock() {
        let mut initial = Map::new();
        initial.insert("porch_light".into(), json!(true));
        let agent = DeviceAgent::new("device").with_states(&initial);
        let ctx = TaskContext::new();

        let out = agent.execute("toggle", &device("porch_light"), &ctx).await.unwrap();
        assert_eq!(out["state"], false);
        assert_eq!(out["previous"], true);

        agent.execute("unlock", &device("front_door"), &ctx).await.unwrap();
        let out = agent.execute("get", &device("front_door"), &ctx).await.unwrap();
        assert_eq!(out["state"], "unlocked");

        let all = agent.execute("list", &Parameters::new(), &ctx).await.unwrap();
        assert_eq!(all.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let agent = DeviceAgent::new("device");
        let ctx = TaskContext::new();
        assert!(matches!(
            agent.execute("set", &device("fan"), &ctx).await,
            Err(AgentError::InvalidInput(_))
        ));
        assert!(matches!(
            agent.execute("get", &Parameters::new(), &ctx).await,
            Err(AgentError::InvalidInput(_))
        ));
    }
}
