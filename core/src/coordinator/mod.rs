//! 任务协调器
//!
//! [`Coordinator`] is the submission and query surface. Admitted tasks wait
//! in the [`TaskStore`]'s priority queue until the dispatch loop hands them
//! to the step executor under the global concurrency budget.

pub mod aggregator;
mod dispatcher;
mod executor;
mod status;
mod sweeper;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, watch, Notify, Semaphore};
use tokio::task::JoinHandle;

use crate::agent::{Agent, AgentDescriptor, AgentRegistry};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, FailureReason, RegistryError};
use crate::events::{CoordinatorEvent, EventBus};
use crate::planner::{PlanError, Planner};
use crate::security::{ConfirmationLedger, ConfirmationRequest, SecurityGate, SecurityVerdict};
use crate::task::{
    Admission, CancelOutcome, NewTask, Task, TaskContext, TaskId, TaskResult, TaskStore,
};

pub use status::CoordinatorStatus;

/// Per-task abort signal; `Some` once the task should stop.
pub(crate) type AbortSignal = watch::Receiver<Option<FailureReason>>;

pub(crate) struct Inner {
    pub(crate) config: CoordinatorConfig,
    pub(crate) registry: Arc<AgentRegistry>,
    pub(crate) gate: Arc<dyn SecurityGate>,
    pub(crate) planner: Option<Arc<dyn Planner>>,
    pub(crate) store: TaskStore,
    pub(crate) confirmations: Arc<ConfirmationLedger>,
    pub(crate) events: EventBus,
    /// Signalled whenever work may be dispatchable: a task was queued or a
    /// global slot was released.
    pub(crate) work: Notify,
    pub(crate) slots: Arc<Semaphore>,
    aborts: Mutex<HashMap<TaskId, watch::Sender<Option<FailureReason>>>>,
    pub(crate) shutdown: watch::Sender<bool>,
    started: AtomicBool,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn aborts(&self) -> MutexGuard<'_, HashMap<TaskId, watch::Sender<Option<FailureReason>>>> {
        match self.aborts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn background(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.background.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Abort signal for a dispatched task. A task without a registered signal
    /// gets one that never fires.
    pub(crate) fn abort_signal(&self, id: &TaskId) -> AbortSignal {
        match self.aborts().get(id) {
            Some(tx) => tx.subscribe(),
            None => watch::channel(None).1,
        }
    }

    pub(crate) fn release_abort(&self, id: &TaskId) {
        self.aborts().remove(id);
    }

    fn signal_abort(&self, id: &TaskId, reason: FailureReason) -> bool {
        match self.aborts().get(id) {
            Some(tx) => tx.send_if_modified(|current| {
                if current.is_some() {
                    return false;
                }
                *current = Some(reason);
                true
            }),
            None => false,
        }
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitStatus {
    Accepted,
    Rejected { reason: FailureReason },
}

/// Acknowledgement returned by [`Coordinator::submit`]. Ordinary failures
/// are reported here, never as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub task_id: Option<TaskId>,
    #[serde(flatten)]
    pub status: SubmitStatus,
    pub estimated_time_ms: Option<u64>,
}

impl SubmitReceipt {
    fn rejected(reason: FailureReason) -> Self {
        Self {
            task_id: None,
            status: SubmitStatus::Rejected { reason },
            estimated_time_ms: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.status, SubmitStatus::Accepted)
    }

    pub fn rejection(&self) -> Option<&FailureReason> {
        match &self.status {
            SubmitStatus::Rejected { reason } => Some(reason),
            SubmitStatus::Accepted => None,
        }
    }
}

/// Cheap handle to a running coordinator.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn builder(config: CoordinatorConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    /// Spawn the dispatch loop and the retention sweeper. Calling it again is
    /// a no-op. Tasks submitted before `start` wait in the queue.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(
            target: "conductor.flow",
            stage = "coordinator.start",
            global_limit = self.inner.config.max_concurrent_tasks,
            agents = self.inner.registry.len(),
        );
        let dispatcher = tokio::spawn(dispatcher::run(self.inner.clone()));
        let sweeper = tokio::spawn(sweeper::run(self.inner.clone()));
        self.inner.background().extend([dispatcher, sweeper]);
    }

    /// Analyze, plan and enqueue a free-form request.
    pub async fn submit(&self, input: &str, context: TaskContext) -> SubmitReceipt {
        if self.inner.is_shut_down() {
            return self.reject(FailureReason::ShuttingDown).await;
        }
        let verdict = self.inner.gate.analyze_request(input, &context).await;
        if !verdict.authorized {
            return self.reject(rejection_reason(&verdict)).await;
        }

        let Some(planner) = self.inner.planner.clone() else {
            return self
                .reject(FailureReason::PlanningFailed(
                    PlanError::NotConfigured.to_string(),
                ))
                .await;
        };
        let plan = match planner.plan(input, &context).await {
            Ok(plan) => plan,
            Err(e) => return self.reject(FailureReason::PlanningFailed(e.to_string())).await,
        };
        if plan.is_empty() {
            return self.reject(FailureReason::EmptyPlan).await;
        }
        tracing::debug!(
            planner = planner.name(),
            steps = plan.steps.len(),
            priority = %plan.priority,
            "request planned"
        );

        let spec = NewTask {
            priority: plan.priority,
            plan: plan.steps,
            context,
            input: Some(input.to_string()),
        };
        self.admit(spec, verdict).await
    }

    /// Enqueue a caller-built plan. The planner is skipped; the security
    /// check is not.
    pub async fn submit_task(&self, spec: NewTask) -> SubmitReceipt {
        if self.inner.is_shut_down() {
            return self.reject(FailureReason::ShuttingDown).await;
        }
        let input = spec.input.clone().unwrap_or_else(|| describe_plan(&spec));
        let verdict = self.inner.gate.analyze_request(&input, &spec.context).await;
        if !verdict.authorized {
            return self.reject(rejection_reason(&verdict)).await;
        }
        if spec.plan.is_empty() {
            return self.reject(FailureReason::EmptyPlan).await;
        }
        self.admit(spec, verdict).await
    }

    async fn admit(&self, mut spec: NewTask, verdict: SecurityVerdict) -> SubmitReceipt {
        if verdict.requires_confirmation {
            spec.context.set_requires_confirmation(true);
        }
        spec.context.set_threat_level(verdict.threat_level);

        let task = Task::new(spec);
        let task_id = task.id.clone();
        let priority = task.priority;
        let steps = task.plan.len();

        self.inner
            .aborts()
            .insert(task_id.clone(), watch::channel(None).0);
        let admission = self.inner.store.enqueue(task).await;

        tracing::info!(
            target: "conductor.flow",
            stage = "task.queued",
            task_id = %task_id,
            priority = %priority,
            steps,
            ahead = admission.ahead,
            threat_level = %verdict.threat_level,
        );
        self.inner
            .events
            .task_queued(&task_id, priority, admission.ahead);
        self.inner.work.notify_one();

        SubmitReceipt {
            task_id: Some(task_id),
            status: SubmitStatus::Accepted,
            estimated_time_ms: Some(self.estimate(admission)),
        }
    }

    async fn reject(&self, reason: FailureReason) -> SubmitReceipt {
        self.inner.store.record_rejection().await;
        tracing::warn!(
            target: "conductor.flow",
            stage = "task.rejected",
            error.kind = ?reason.error_code(),
            reason = %reason,
        );
        SubmitReceipt::rejected(reason)
    }

    /// Rough time until the task finishes: one average task per wave of
    /// `global_limit` tasks ahead of it, plus its own.
    fn estimate(&self, admission: Admission) -> u64 {
        let per_task = admission
            .average_task_ms
            .unwrap_or(self.inner.config.default_task_estimate_ms);
        let waves = admission.ahead / self.inner.config.max_concurrent_tasks + 1;
        per_task.saturating_mul(waves as u64)
    }

    /// Cancel a task. Returns `false` when it had already finished or its
    /// executor is already winding down.
    pub async fn cancel(&self, id: &TaskId) -> Result<bool, CoordinatorError> {
        match self.inner.store.cancel(id).await? {
            CancelOutcome::Dequeued(task) => {
                self.inner.release_abort(id);
                tracing::info!(target: "conductor.flow", stage = "task.cancelled", task_id = %id, queued = true);
                if let Some(result) = task.result {
                    self.inner.events.task_finished(id, result);
                }
                Ok(true)
            }
            CancelOutcome::Executing => {
                let signalled = self.inner.signal_abort(id, FailureReason::Cancelled);
                if signalled {
                    tracing::info!(target: "conductor.flow", stage = "task.cancelled", task_id = %id, queued = false);
                }
                Ok(signalled)
            }
            CancelOutcome::AlreadyTerminal => Ok(false),
        }
    }

    pub async fn get_status(&self) -> CoordinatorStatus {
        let counts = self.inner.store.counts().await;
        CoordinatorStatus {
            active_tasks: counts.executing,
            queued_tasks: counts.queued,
            retained_tasks: counts.retained,
            global_limit: self.inner.config.max_concurrent_tasks,
            per_agent_load: self.inner.registry.loads(),
            pending_confirmations: self.inner.confirmations.pending_count(),
            average_task_ms: counts.metrics.average_task_ms(),
            metrics: counts.metrics,
        }
    }

    pub async fn task(&self, id: &TaskId) -> Option<Task> {
        self.inner.store.get(id).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve once the task reaches a terminal state.
    pub async fn wait_for(&self, id: &TaskId) -> Result<TaskResult, CoordinatorError> {
        let mut events = self.inner.events.subscribe();
        loop {
            match self.inner.store.get(id).await {
                Some(Task {
                    result: Some(result),
                    ..
                }) => return Ok(result),
                Some(_) => {}
                None => return Err(CoordinatorError::TaskNotFound(id.clone())),
            }
            loop {
                match events.recv().await {
                    Ok(event) if event.is_terminal() && event.task_id() == Some(id) => {
                        if let Some(result) = event.result() {
                            return Ok(result.clone());
                        }
                    }
                    Ok(_) => {}
                    // Missed events; re-read the store.
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(CoordinatorError::ShutDown)
                    }
                }
            }
        }
    }

    pub fn pending_confirmations(&self) -> Vec<ConfirmationRequest> {
        self.inner.confirmations.pending()
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Retention pass as if the clock read `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        sweeper::sweep(&self.inner, now).await
    }

    /// Stop dispatching and sweeping, abort executing tasks and wait for them
    /// to wind down. Queued tasks stay queued.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        tracing::info!(target: "conductor.flow", stage = "coordinator.shutdown");

        // Queued tasks never start after this point, so signalling every
        // registered task only affects the executing ones.
        let tasks: Vec<TaskId> = self.inner.aborts().keys().cloned().collect();
        for id in &tasks {
            self.inner.signal_abort(id, FailureReason::ShuttingDown);
        }

        let handles: Vec<_> = self.inner.background().drain(..).collect();
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "background loop ended abnormally");
            }
        }

        // Every global slot back means no task is still executing.
        let limit = u32::try_from(self.inner.config.max_concurrent_tasks).unwrap_or(u32::MAX);
        if let Ok(permits) = self.inner.slots.acquire_many(limit).await {
            drop(permits);
        }
        self.inner.slots.close();
    }
}

fn rejection_reason(verdict: &SecurityVerdict) -> FailureReason {
    FailureReason::SecurityRejected(
        verdict
            .reason
            .clone()
            .unwrap_or_else(|| format!("threat level {}", verdict.threat_level)),
    )
}

fn describe_plan(spec: &NewTask) -> String {
    spec.plan
        .iter()
        .map(|s| format!("{}.{}", s.agent_kind, s.action))
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    registry: AgentRegistry,
    gate: Option<Arc<dyn SecurityGate>>,
    planner: Option<Arc<dyn Planner>>,
}

impl CoordinatorBuilder {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            registry: AgentRegistry::new(),
            gate: None,
            planner: None,
        }
    }

    pub fn registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn agent(
        mut self,
        descriptor: AgentDescriptor,
        handle: Arc<dyn Agent>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(descriptor, handle)?;
        Ok(self)
    }

    pub fn security_gate(mut self, gate: Arc<dyn SecurityGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn build(self) -> Result<Coordinator, CoordinatorError> {
        self.config.validate()?;
        let gate = self.gate.ok_or(CoordinatorError::MissingSecurityGate)?;
        let (shutdown, _) = watch::channel(false);

        let inner = Inner {
            registry: Arc::new(self.registry),
            gate,
            planner: self.planner,
            store: TaskStore::new(),
            confirmations: Arc::new(ConfirmationLedger::new()),
            events: EventBus::new(self.config.event_channel_capacity),
            work: Notify::new(),
            slots: Arc::new(Semaphore::new(self.config.max_concurrent_tasks)),
            aborts: Mutex::new(HashMap::new()),
            shutdown,
            started: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
            config: self.config,
        };
        Ok(Coordinator {
            inner: Arc::new(inner),
        })
    }
}
