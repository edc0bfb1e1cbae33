#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::agent::{Agent, AgentDescriptor, AgentError, AgentRegistry, Parameters};
use conductor_core::config::CoordinatorConfig;
use conductor_core::security::{
    ConfirmationDecision, ConfirmationRequest, SecurityGate, SecurityVerdict,
};
use conductor_core::task::{Step, TaskContext};
use conductor_core::{Coordinator, Plan, PlanError, Planner, Priority};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

/// Deterministic agent: records every call, tracks its own concurrency and
/// can be told to sleep, block, fail or panic.
pub struct ScriptedAgent {
    name: String,
    delay: Option<Duration>,
    failure: Option<AgentError>,
    panics: bool,
    hold: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: None,
            failure: None,
            panics: false,
            hold: None,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, error: AgentError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Each invocation waits for one permit on `hold` before returning.
    pub fn held_by(mut self, hold: Arc<Semaphore>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        _context: &TaskContext,
    ) -> Result<Value, AgentError> {
        self.calls.lock().unwrap().push(action.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(hold) = &self.hold {
            if let Ok(permit) = hold.acquire().await {
                permit.forget();
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics {
            panic!("{} blew up on '{action}'", self.name);
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(json!({
                "agent": self.name,
                "action": action,
                "parameters": parameters,
            })),
        }
    }
}

/// Security gate with a fixed verdict and a fixed confirmation answer.
/// `None` as the answer means the approver never responds.
pub struct ScriptedGate {
    verdict: SecurityVerdict,
    answer: Option<ConfirmationDecision>,
    requests: Mutex<Vec<ConfirmationRequest>>,
}

impl ScriptedGate {
    pub fn granting() -> Self {
        Self::new(SecurityVerdict::allow(), Some(ConfirmationDecision::Granted))
    }

    pub fn denying() -> Self {
        Self::new(SecurityVerdict::allow(), Some(ConfirmationDecision::Denied))
    }

    pub fn silent() -> Self {
        Self::new(SecurityVerdict::allow(), None)
    }

    pub fn new(verdict: SecurityVerdict, answer: Option<ConfirmationDecision>) -> Self {
        Self {
            verdict,
            answer,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecurityGate for ScriptedGate {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn analyze_request(&self, _input: &str, _context: &TaskContext) -> SecurityVerdict {
        self.verdict.clone()
    }

    async fn request_confirmation(
        &self,
        request: &ConfirmationRequest,
        _step: &Step,
    ) -> ConfirmationDecision {
        self.requests.lock().unwrap().push(request.clone());
        match self.answer {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }
}

/// One `speech.say` step per word of the input; nothing for empty input.
pub struct WordPlanner;

#[async_trait]
impl Planner for WordPlanner {
    fn name(&self) -> &str {
        "words"
    }

    async fn plan(&self, input: &str, _context: &TaskContext) -> Result<Plan, PlanError> {
        if input.contains("explode") {
            return Err(PlanError::Failed("cannot plan".into()));
        }
        Ok(input.split_whitespace().fold(Plan::new(Priority::USER), |plan, word| {
            plan.step(Step::new("speech", "say").with_param("text", word))
        }))
    }
}

pub fn config(max_concurrent_tasks: usize) -> CoordinatorConfig {
    CoordinatorConfig {
        max_concurrent_tasks,
        confirmation_window_ms: 1_000,
        ..Default::default()
    }
}

pub fn descriptor(kind: &str, capacity: usize, timeout_ms: u64) -> AgentDescriptor {
    AgentDescriptor::new(kind, capacity, Duration::from_millis(timeout_ms))
}

/// Builds a coordinator from `(descriptor, agent)` pairs.
pub fn coordinator(
    config: CoordinatorConfig,
    gate: Arc<ScriptedGate>,
    agents: Vec<(AgentDescriptor, Arc<ScriptedAgent>)>,
) -> Coordinator {
    let mut registry = AgentRegistry::new();
    for (descriptor, agent) in agents {
        registry.register(descriptor, agent).unwrap();
    }
    Coordinator::builder(config)
        .registry(registry)
        .security_gate(gate)
        .planner(Arc::new(WordPlanner))
        .build()
        .unwrap()
}

/// Poll `check` until it holds, yielding to the runtime between attempts.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..10_000 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never held");
}
