//! Multi-agent task coordination engine.
//!
//! A request is decomposed into an ordered plan of [`task::Step`]s, queued by
//! priority, admitted under a global concurrency budget, and executed step by
//! step against capability-specific [`agent::Agent`]s. Sensitive steps pass
//! through the [`security::SecurityGate`] confirmation protocol, partial
//! results are folded into a single [`task::TaskResult`], and terminal tasks
//! are evicted after a retention window.
//!
//! ```text
//! submit(input) ──► SecurityGate::analyze_request ──► Planner::plan
//!                                                        │
//!                         TaskStore (priority queue) ◄───┘
//!                                │  dispatch loop (Notify + Semaphore)
//!                                ▼
//!                         step executor ──► AgentRegistry ──► Agent::execute
//!                                │
//!                                ▼
//!                         aggregator ──► CoordinatorEvent::{TaskCompleted, TaskFailed}
//! ```

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod planner;
pub mod security;
pub mod task;

pub use agent::{Agent, AgentDescriptor, AgentError, AgentRegistry, Sensitivity};
pub use config::AppConfig;
pub use coordinator::{
    Coordinator, CoordinatorBuilder, CoordinatorStatus, SubmitReceipt, SubmitStatus,
};
pub use error::{CoordinatorError, FailureReason};
pub use events::CoordinatorEvent;
pub use planner::{Plan, PlanError, Planner};
pub use security::{ConfirmationDecision, SecurityGate, SecurityVerdict, ThreatLevel};
pub use task::{
    Classification, NewTask, Priority, Step, StepOutcome, Task, TaskContext, TaskId, TaskResult,
    TaskStatus,
};
