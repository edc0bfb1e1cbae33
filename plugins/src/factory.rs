use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use conductor_core::agent::{Agent, AgentDescriptor, AgentRegistry};
use conductor_core::config::{AgentConfig, AppConfig, PlannerConfig, SecurityConfig};
use conductor_core::coordinator::Coordinator;
use conductor_core::planner::Planner;
use conductor_core::security::SecurityGate;

use crate::agents::{ConversationAgent, DelayAgent, DeviceAgent, EchoAgent};
use crate::planner::KeywordPlanner;
use crate::security::{ApprovalChannel, Approver, RuleSecurityGate};

const DEFAULT_DELAY_MS: u64 = 100;

fn option_str<'a>(options: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

pub fn build_agent(cfg: &AgentConfig) -> Result<Arc<dyn Agent>> {
    let agent: Arc<dyn Agent> = match cfg.driver.as_str() {
        "echo" => Arc::new(EchoAgent::new(&cfg.kind)),
        "delay" => {
            let delay_ms = match cfg.options.get("delay_ms") {
                None => DEFAULT_DELAY_MS,
                Some(v) => v.as_u64().with_context(|| {
                    format!("agent '{}': options.delay_ms must be an integer", cfg.kind)
                })?,
            };
            Arc::new(DelayAgent::new(&cfg.kind, Duration::from_millis(delay_ms)))
        }
        "conversation" => {
            let agent = ConversationAgent::new(&cfg.kind);
            match option_str(&cfg.options, "title") {
                Some(title) => Arc::new(agent.with_title(title)),
                None => Arc::new(agent),
            }
        }
        "device" => {
            let agent = DeviceAgent::new(&cfg.kind);
            match cfg.options.get("devices") {
                None => Arc::new(agent),
                Some(Value::Object(devices)) => Arc::new(agent.with_states(devices)),
                Some(_) => bail!("agent '{}': options.devices must be a table", cfg.kind),
            }
        }
        other => bail!("agent '{}': unknown driver '{}'", cfg.kind, other),
    };
    Ok(agent)
}

pub fn build_registry(cfg: &AppConfig) -> Result<AgentRegistry> {
    let mut registry = AgentRegistry::new();
    for agent in &cfg.agents {
        let handle = build_agent(agent)?;
        registry
            .register(AgentDescriptor::from_config(agent), handle)
            .with_context(|| format!("registering agent '{}'", agent.kind))?;
    }
    Ok(registry)
}

/// Without an approval channel, sensitive steps are denied unless the config
/// opts into auto-approval.
pub fn build_security_gate(
    cfg: &SecurityConfig,
    approvals: Option<ApprovalChannel>,
) -> Result<Arc<dyn SecurityGate>> {
    let approver = match approvals {
        Some(channel) => Approver::Channel(channel),
        None => Approver::DenyAll,
    };
    let gate = RuleSecurityGate::from_config(cfg, approver)
        .context("invalid security pattern")?;
    Ok(Arc::new(gate))
}

pub fn build_planner(cfg: &PlannerConfig) -> Result<Arc<dyn Planner>> {
    let planner = KeywordPlanner::from_config(cfg).context("invalid planner keyword")?;
    Ok(Arc::new(planner))
}

pub fn build_coordinator(
    cfg: &AppConfig,
    approvals: Option<ApprovalChannel>,
) -> Result<Coordinator> {
    cfg.validate()?;
    let coordinator = Coordinator::builder(cfg.coordinator.clone())
        .registry(build_registry(cfg)?)
        .security_gate(build_security_gate(&cfg.security, approvals)?)
        .planner(build_planner(&cfg.planner)?)
        .build()?;
    tracing::debug!(
        agents = coordinator.registry().len(),
        max_concurrent_tasks = cfg.coordinator.max_concurrent_tasks,
        "coordinator built"
    );
    Ok(coordinator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::task::{TaskContext, TaskStatus};

    const CONFIG: &str = r#"
        [coordinator]
        max_concurrent_tasks = 2

        [[agents]]
        kind = "conversation"
        driver = "conversation"
        options = { title = "Captain" }

        [[agents]]
        kind = "device"
        driver = "device"
        max_concurrent_steps = 2
        sensitive_actions = ["unlock"]
        options = { devices = { front_door = "locked" } }

        [security]
        blocked_patterns = ["self[- ]destruct"]

        [[planner.rules]]
        keywords = ["hello"]
        agent = "conversation"
        action = "respond"
    "#;

    fn config() -> AppConfig {
        toml::from_str(CONFIG).unwrap()
    }

    #[test]
    fn test_unknown_driver_is_rejected() {
        let agent: AgentConfig = toml::from_str("kind = \"x\"\ndriver = \"lidar\"").unwrap();
        let err = build_agent(&agent).err().unwrap();
        assert!(err.to_string().contains("unknown driver 'lidar'"));
    }

    #[test]
    fn test_bad_delay_option() {
        let agent: AgentConfig =
            toml::from_str("kind = \"slow\"\ndriver = \"delay\"\noptions = { delay_ms = \"soon\" }")
                .unwrap();
        assert!(build_agent(&agent).is_err());
    }

    #[test]
    fn test_registry_from_config() {
        let registry = build_registry(&config()).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("device").is_ok());
    }

    #[tokio::test]
    async fn test_coordinator_end_to_end() {
        let coordinator = build_coordinator(&config(), None).unwrap();
        coordinator.start();

        let receipt = coordinator.submit("hello there", TaskContext::new()).await;
        let id = receipt.task_id.clone().unwrap();
        let result = coordinator.wait_for(&id).await.unwrap();
        assert_eq!(result.terminal_status(), TaskStatus::Completed);
        assert_eq!(result.response["text"], "Greetings, Captain.");

        let blocked = coordinator
            .submit("initiate self-destruct", TaskContext::new())
            .await;
        assert!(!blocked.is_accepted());

        coordinator.shutdown().await;
    }
}
