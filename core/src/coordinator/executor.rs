//! 步骤执行器
//!
//! Runs one admitted task: steps strictly in plan order, each step resolved,
//! capacity-checked, confirmed when sensitive and invoked under the agent's
//! timeout. The whole run races the task's abort signal and optional deadline.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;

use crate::agent::{AgentDescriptor, AgentError};
use crate::error::FailureReason;
use crate::security::{ConfirmationDecision, ConfirmationStatus};
use crate::task::{Step, StepOutcome, Task, TaskContext, TaskId};

use super::aggregator;
use super::{AbortSignal, Inner};

pub(crate) async fn execute_task(
    inner: Arc<Inner>,
    task: Task,
    mut abort: AbortSignal,
    permit: OwnedSemaphorePermit,
) {
    let started = Instant::now();
    let task_id = task.id.clone();
    tracing::info!(
        target: "conductor.flow",
        stage = "task.start",
        task_id = %task_id,
        priority = %task.priority,
        steps = task.plan.len(),
    );

    let deadline = inner.config.task_timeout();
    let mut run = TaskRun {
        inner: &inner,
        task_id: &task_id,
        plan: &task.plan,
        context: task.context.clone(),
        outcomes: Vec::with_capacity(task.plan.len()),
    };

    let stopped = {
        // A panic outside the agent call (gate, store) still ends the task
        // through the normal tail below.
        let steps = AssertUnwindSafe(run.run_steps())
            .catch_unwind()
            .map(|finished| {
                finished.unwrap_or_else(|panic| {
                    Some(FailureReason::AgentFailed(format!(
                        "step execution panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                })
            });
        tokio::pin!(steps);
        tokio::select! {
            biased;
            reason = aborted(&mut abort) => Some(reason),
            _ = deadline_elapsed(deadline) => Some(FailureReason::TaskTimeout {
                timeout_ms: deadline.map(duration_ms).unwrap_or_default(),
            }),
            reason = &mut steps => reason,
        }
    };

    let elapsed_ms = duration_ms(started.elapsed());
    let result = aggregator::aggregate(run.outcomes, stopped, elapsed_ms);
    match inner.store.finish(&task_id, result.clone()).await {
        Ok(task) => {
            tracing::info!(
                target: "conductor.flow",
                stage = "task.finish",
                task_id = %task_id,
                status = ?task.status,
                classification = ?result.classification,
                elapsed_ms,
            );
            inner.events.task_finished(&task_id, result);
        }
        Err(e) => {
            tracing::warn!(task_id = %task_id, error = %e, "task finished twice");
        }
    }

    inner.release_abort(&task_id);
    drop(permit);
    inner.work.notify_one();
}

struct TaskRun<'a> {
    inner: &'a Inner,
    task_id: &'a TaskId,
    plan: &'a [Step],
    context: TaskContext,
    outcomes: Vec<StepOutcome>,
}

impl TaskRun<'_> {
    /// Walk the plan. Returns the reason the plan was cut short, if it was.
    async fn run_steps(&mut self) -> Option<FailureReason> {
        let plan = self.plan;
        for (index, step) in plan.iter().enumerate() {
            let started = Instant::now();
            let outcome = match self.run_step(index, step).await {
                Ok(value) => {
                    StepOutcome::succeeded(index, step, value, duration_ms(started.elapsed()))
                }
                Err(reason) => {
                    tracing::warn!(
                        task_id = %self.task_id,
                        step = index,
                        agent = %step.agent_kind,
                        action = %step.action,
                        error.kind = ?reason.error_code(),
                        reason = %reason,
                        "step failed"
                    );
                    StepOutcome::failed(index, step, reason, duration_ms(started.elapsed()))
                }
            };

            let abort = outcome
                .error
                .as_ref()
                .filter(|reason| {
                    reason.aborts_task(step.critical) || !self.context.allow_partial_failure()
                })
                .cloned();

            if let Err(e) = self
                .inner
                .store
                .record_step(self.task_id, outcome.clone(), &self.context)
                .await
            {
                tracing::warn!(task_id = %self.task_id, error = %e, "failed to record step");
            }
            self.outcomes.push(outcome);
            self.inner
                .events
                .task_progress(self.task_id, self.outcomes.len(), plan.len());

            if let Some(reason) = abort {
                tracing::info!(
                    target: "conductor.flow",
                    stage = "task.abort",
                    task_id = %self.task_id,
                    step = index,
                    critical = step.critical,
                    reason = %reason,
                );
                return Some(reason);
            }
        }
        None
    }

    async fn run_step(&mut self, index: usize, step: &Step) -> Result<Value, FailureReason> {
        let agent = self
            .inner
            .registry
            .resolve(&step.agent_kind)
            .map_err(|_| FailureReason::AgentUnavailable(step.agent_kind.clone()))?;
        let descriptor = agent.descriptor();

        if !agent.has_capacity() {
            return Err(busy(descriptor));
        }

        if self.needs_confirmation(descriptor, step) {
            self.confirm(index, step).await?;
        }

        // Capacity may have been taken while waiting for confirmation.
        let Some(_slot) = agent.try_acquire() else {
            return Err(busy(descriptor));
        };

        tracing::debug!(
            task_id = %self.task_id,
            step = index,
            agent = %step.agent_kind,
            action = %step.action,
            "invoking agent"
        );
        let invocation = AssertUnwindSafe(agent.handle().execute(
            &step.action,
            &step.parameters,
            &self.context,
        ))
        .catch_unwind();
        match tokio::time::timeout(descriptor.timeout, invocation).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(AgentError::Unauthorized(message)))) => {
                Err(FailureReason::Unauthorized(message))
            }
            Ok(Ok(Err(e))) => Err(FailureReason::AgentFailed(e.to_string())),
            Ok(Err(panic)) => Err(FailureReason::AgentFailed(format!(
                "agent '{}' panicked: {}",
                descriptor.kind,
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(FailureReason::AgentTimeout {
                kind: descriptor.kind.clone(),
                timeout_ms: duration_ms(descriptor.timeout),
            }),
        }
    }

    fn needs_confirmation(&self, descriptor: &AgentDescriptor, step: &Step) -> bool {
        let sensitive = self.context.requires_confirmation()
            || descriptor
                .sensitivity
                .requires_confirmation(&step.action, &step.parameters);
        sensitive && !self.context.is_confirmed(&step.agent_kind, &step.action)
    }

    async fn confirm(&mut self, index: usize, step: &Step) -> Result<(), FailureReason> {
        let window = self.inner.config.confirmation_window();
        let ticket = self
            .inner
            .confirmations
            .open(self.task_id, index, step, window);
        self.inner.events.confirmation_requested(ticket.request());
        tracing::info!(
            target: "conductor.flow",
            stage = "confirmation.requested",
            task_id = %self.task_id,
            step = index,
            request_id = %ticket.request().id,
            action = %step.action,
        );

        let decision = tokio::time::timeout(
            window,
            self.inner.gate.request_confirmation(ticket.request(), step),
        )
        .await;

        let (status, outcome) = match decision {
            Ok(ConfirmationDecision::Granted) => (ConfirmationStatus::Granted, Ok(())),
            Ok(ConfirmationDecision::Denied) => (
                ConfirmationStatus::Denied,
                Err(FailureReason::ConfirmationDenied {
                    action: step.action.clone(),
                }),
            ),
            Err(_) => (
                ConfirmationStatus::Expired,
                Err(FailureReason::ConfirmationTimeout {
                    action: step.action.clone(),
                    window_ms: duration_ms(window),
                }),
            ),
        };

        let request = ticket.resolve(status);
        tracing::info!(
            target: "conductor.flow",
            stage = "confirmation.resolved",
            task_id = %self.task_id,
            request_id = %request.id,
            status = ?status,
        );
        self.inner.events.confirmation_resolved(request);

        if outcome.is_ok() {
            self.context.mark_confirmed(&step.agent_kind, &step.action);
        }
        outcome
    }
}

fn busy(descriptor: &AgentDescriptor) -> FailureReason {
    FailureReason::AgentBusy {
        kind: descriptor.kind.clone(),
        capacity: descriptor.max_concurrent_steps,
    }
}

/// Resolves with the abort reason once one is signalled. Never resolves if
/// the signal is dropped without firing.
async fn aborted(signal: &mut AbortSignal) -> FailureReason {
    loop {
        let current = signal.borrow_and_update().clone();
        if let Some(reason) = current {
            return reason;
        }
        if signal.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

async fn deadline_elapsed(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
