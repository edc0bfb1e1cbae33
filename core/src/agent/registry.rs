use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::RegistryError;

use super::descriptor::AgentDescriptor;
use super::traits::Agent;

struct Registration {
    descriptor: AgentDescriptor,
    handle: Arc<dyn Agent>,
    active: AtomicUsize,
}

/// In-flight and maximum step counts for one agent kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentLoad {
    pub active: usize,
    pub capacity: usize,
}

/// Registered agents keyed by kind.
///
/// Registration takes `&mut self`, so the set of agents is fixed before the
/// registry is shared with a running coordinator.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<Registration>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: AgentDescriptor,
        handle: Arc<dyn Agent>,
    ) -> Result<(), RegistryError> {
        descriptor.validate()?;
        if self.agents.contains_key(&descriptor.kind) {
            return Err(RegistryError::DuplicateAgent(descriptor.kind));
        }
        tracing::debug!(
            agent = %descriptor.kind,
            capacity = descriptor.max_concurrent_steps,
            timeout_ms = descriptor.timeout.as_millis() as u64,
            "agent registered"
        );
        self.agents.insert(
            descriptor.kind.clone(),
            Arc::new(Registration {
                descriptor,
                handle,
                active: AtomicUsize::new(0),
            }),
        );
        Ok(())
    }

    pub fn resolve(&self, kind: &str) -> Result<ResolvedAgent, RegistryError> {
        self.agents
            .get(kind)
            .cloned()
            .map(|registration| ResolvedAgent { registration })
            .ok_or_else(|| RegistryError::AgentUnavailable(kind.to_string()))
    }

    /// Steps currently in flight for `kind`; zero for unknown kinds.
    pub fn active_count(&self, kind: &str) -> usize {
        self.agents
            .get(kind)
            .map(|r| r.active.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn loads(&self) -> BTreeMap<String, AgentLoad> {
        self.agents
            .iter()
            .map(|(kind, r)| {
                (
                    kind.clone(),
                    AgentLoad {
                        active: r.active.load(Ordering::Acquire),
                        capacity: r.descriptor.max_concurrent_steps,
                    },
                )
            })
            .collect()
    }
}

/// A resolved registration: descriptor, handle and capacity accounting.
#[derive(Clone)]
pub struct ResolvedAgent {
    registration: Arc<Registration>,
}

impl ResolvedAgent {
    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.registration.descriptor
    }

    pub fn handle(&self) -> &Arc<dyn Agent> {
        &self.registration.handle
    }

    pub fn has_capacity(&self) -> bool {
        self.registration.active.load(Ordering::Acquire)
            < self.registration.descriptor.max_concurrent_steps
    }

    /// Claim one invocation slot, or `None` when the agent is at capacity.
    /// The slot is released when the returned guard is dropped.
    pub fn try_acquire(&self) -> Option<ActiveSlot> {
        let max = self.registration.descriptor.max_concurrent_steps;
        let active = &self.registration.active;
        let mut current = active.load(Ordering::Acquire);
        loop {
            if current >= max {
                return None;
            }
            match active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(ActiveSlot {
                        registration: self.registration.clone(),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// One in-flight invocation. Decrements the agent's active count exactly
/// once, on every exit path.
pub struct ActiveSlot {
    registration: Arc<Registration>,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.registration.active.fetch_sub(1, Ordering::AcqRel);
    }
}
