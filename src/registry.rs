//! Out-of-band dependencies between resources that do not follow the compartment tree.
//!
//! A subnet can only be deleted once every VNIC placed on it is gone. Those VNICs belong to
//! instances that may live in any compartment, so the scanner records them here and the
//! cleanup engine consults the registry before deleting the subnet.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::resource::{LifecycleState, ResourceKind};

/// Non-owning handle to a resource elsewhere in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub kind: ResourceKind,
    pub id: String,
    pub name: String,
    pub preserved: bool,
}

#[derive(Debug, Default)]
pub struct DependencyRegistry {
    dependents: Mutex<HashMap<String, Vec<DependencyRef>>>,
    states: Mutex<HashMap<String, LifecycleState>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `dependency` has to go before `resource_id` can be deleted.
    pub fn register(&self, resource_id: &str, dependency: DependencyRef) {
        let mut dependents = self.dependents.lock();
        let entry = dependents.entry(resource_id.to_string()).or_default();
        if entry.iter().any(|existing| existing.id == dependency.id) {
            return;
        }
        tracing::debug!(
            resource_id,
            dependency_kind = %dependency.kind,
            dependency_id = %dependency.id,
            "dependency registered"
        );
        entry.push(dependency);
    }

    pub fn dependents(&self, resource_id: &str) -> Vec<DependencyRef> {
        self.dependents
            .lock()
            .get(resource_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Remembers the latest known state of a resource. Regressions are ignored.
    pub fn record_state(&self, id: &str, state: LifecycleState) {
        let mut states = self.states.lock();
        match states.get(id) {
            Some(current) if current.is_terminal() => {}
            Some(LifecycleState::Terminating) if state == LifecycleState::Active => {}
            _ => {
                states.insert(id.to_string(), state);
            }
        }
    }

    pub fn state_of(&self, id: &str) -> Option<LifecycleState> {
        self.states.lock().get(id).copied()
    }

    pub fn is_terminal(&self, id: &str) -> bool {
        self.state_of(id).is_some_and(LifecycleState::is_terminal)
    }
}
