//! 确认请求登记
//!
//! Tracks confirmation requests while they are outstanding. A request is
//! opened as a [`ConfirmationTicket`]; resolving the ticket consumes it, and
//! dropping an unresolved ticket (task cancelled, deadline hit) retires the
//! request as expired.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{Step, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Granted,
    Denied,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub id: String,
    pub task_id: TaskId,
    pub step_index: usize,
    pub agent_kind: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ConfirmationStatus,
}

#[derive(Debug, Default)]
pub struct ConfirmationLedger {
    pending: Mutex<HashMap<String, ConfirmationRequest>>,
}

impl ConfirmationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConfirmationRequest>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn open(
        self: &Arc<Self>,
        task_id: &TaskId,
        step_index: usize,
        step: &Step,
        window: Duration,
    ) -> ConfirmationTicket {
        let created_at = Utc::now();
        let window = chrono::Duration::milliseconds(window.as_millis().min(i64::MAX as u128) as i64);
        let request = ConfirmationRequest {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.clone(),
            step_index,
            agent_kind: step.agent_kind.clone(),
            action: step.action.clone(),
            created_at,
            expires_at: created_at.checked_add_signed(window).unwrap_or(created_at),
            status: ConfirmationStatus::Pending,
        };
        self.lock().insert(request.id.clone(), request.clone());
        ConfirmationTicket {
            ledger: self.clone(),
            request,
            resolved: false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Outstanding requests, oldest first.
    pub fn pending(&self) -> Vec<ConfirmationRequest> {
        let mut requests: Vec<_> = self.lock().values().cloned().collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }
}

/// An outstanding confirmation request.
pub struct ConfirmationTicket {
    ledger: Arc<ConfirmationLedger>,
    request: ConfirmationRequest,
    resolved: bool,
}

impl ConfirmationTicket {
    pub fn request(&self) -> &ConfirmationRequest {
        &self.request
    }

    /// Retire the request with its final status and return the final record.
    pub fn resolve(mut self, status: ConfirmationStatus) -> ConfirmationRequest {
        self.resolved = true;
        self.ledger.lock().remove(&self.request.id);
        let mut request = self.request.clone();
        request.status = status;
        request
    }
}

impl Drop for ConfirmationTicket {
    fn drop(&mut self) {
        if !self.resolved {
            self.ledger.lock().remove(&self.request.id);
            tracing::debug!(
                request_id = %self.request.id,
                task_id = %self.request.task_id,
                "confirmation request abandoned"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> Step {
        Step::new("device", "unlock_door")
    }

    #[test]
    fn test_resolve_consumes_request() {
        let ledger = Arc::new(ConfirmationLedger::new());
        let task_id = TaskId::new();
        let ticket = ledger.open(&task_id, 0, &step(), Duration::from_secs(30));

        assert_eq!(ledger.pending_count(), 1);
        let pending = ledger.pending();
        assert_eq!(pending[0].status, ConfirmationStatus::Pending);
        assert_eq!(pending[0].action, "unlock_door");
        assert_eq!(
            pending[0].expires_at - pending[0].created_at,
            chrono::Duration::seconds(30)
        );

        let done = ticket.resolve(ConfirmationStatus::Granted);
        assert_eq!(done.status, ConfirmationStatus::Granted);
        assert_eq!(done.task_id, task_id);
        assert_eq!(ledger.pending_count(), 0);
    }

    #[test]
    fn test_dropped_ticket_leaves_ledger() {
        let ledger = Arc::new(ConfirmationLedger::new());
        let first = ledger.open(&TaskId::new(), 0, &step(), Duration::from_secs(5));
        let second = ledger.open(&TaskId::new(), 1, &step(), Duration::from_secs(5));
        assert_eq!(ledger.pending_count(), 2);

        drop(first);
        assert_eq!(ledger.pending_count(), 1);
        assert_eq!(ledger.pending()[0].id, second.request().id);
    }
}
