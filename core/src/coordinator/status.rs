use std::collections::BTreeMap;

use serde::Serialize;

use crate::agent::AgentLoad;
use crate::task::PerformanceMetrics;

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorStatus {
    pub active_tasks: usize,
    pub queued_tasks: usize,
    /// Terminal tasks still held for the retention window.
    pub retained_tasks: usize,
    pub global_limit: usize,
    pub per_agent_load: BTreeMap<String, AgentLoad>,
    pub pending_confirmations: usize,
    pub metrics: PerformanceMetrics,
    pub average_task_ms: Option<u64>,
}
