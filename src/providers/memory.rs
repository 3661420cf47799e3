//! In-memory tenancy backed by a JSON snapshot.
//!
//! Serves `--fixture` dry runs and the test suite. Every call is recorded so callers can assert
//! on what would have been sent to a real provider, and deletes can be scripted to fail.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{CloudProvider, ListScope, ProviderError, Vnic};
use crate::resource::{LifecycleState, ResourceDescriptor, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    SubscribedRegions,
    List {
        kind: ResourceKind,
        compartment_id: String,
        parent_id: Option<String>,
    },
    GetVnic {
        id: String,
    },
    GetState {
        kind: ResourceKind,
        id: String,
    },
    Delete {
        kind: ResourceKind,
        id: String,
    },
    ClearRouteRules {
        id: String,
    },
}

impl ProviderCall {
    /// Calls that change something on the provider side.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ProviderCall::Delete { .. } | ProviderCall::ClearRouteRules { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureResource {
    pub kind: ResourceKind,
    /// Unset means the resource shows up in every region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub descriptor: ResourceDescriptor,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Fixture {
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<FixtureResource>,
    #[serde(default)]
    pub vnics: Vec<Vnic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteFailure {
    /// Refused as in use, the way default security lists and route tables are.
    InUse,
    /// Fails the next `n` deletes, then succeeds.
    Times(u32),
}

#[derive(Debug, Default)]
struct Inner {
    regions: Vec<String>,
    resources: Vec<FixtureResource>,
    vnics: HashMap<String, Vnic>,
    calls: Vec<ProviderCall>,
    delete_failures: HashMap<String, DeleteFailure>,
    list_failures: HashSet<(ResourceKind, String)>,
}

impl Inner {
    fn resource_mut(&mut self, kind: ResourceKind, id: &str) -> Option<&mut FixtureResource> {
        self.resources
            .iter_mut()
            .find(|r| r.kind == kind && r.descriptor.id == id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryProvider {
    inner: Mutex<Inner>,
}

impl MemoryProvider {
    pub fn new(regions: &[&str]) -> Self {
        let provider = Self::default();
        provider.inner.lock().regions = regions.iter().map(|r| r.to_string()).collect();
        provider
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let provider = Self::default();
        {
            let mut inner = provider.inner.lock();
            inner.regions = fixture.regions;
            inner.resources = fixture.resources;
            inner.vnics = fixture
                .vnics
                .into_iter()
                .map(|vnic| (vnic.id.clone(), vnic))
                .collect();
        }
        provider
    }

    pub fn from_fixture_file(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Fixture(format!("{}: {}", path.display(), e)))?;
        let fixture: Fixture = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Fixture(format!("{}: {}", path.display(), e)))?;

        tracing::info!(
            path = %path.display(),
            resources = fixture.resources.len(),
            "fixture loaded"
        );
        Ok(Self::from_fixture(fixture))
    }

    pub fn insert(&self, kind: ResourceKind, parent_id: Option<&str>, descriptor: ResourceDescriptor) {
        self.inner.lock().resources.push(FixtureResource {
            kind,
            region: None,
            parent_id: parent_id.map(str::to_string),
            descriptor,
        });
    }

    pub fn insert_in_region(&self, region: &str, kind: ResourceKind, descriptor: ResourceDescriptor) {
        self.inner.lock().resources.push(FixtureResource {
            kind,
            region: Some(region.to_string()),
            parent_id: None,
            descriptor,
        });
    }

    pub fn insert_vnic(&self, vnic: Vnic) {
        self.inner.lock().vnics.insert(vnic.id.clone(), vnic);
    }

    pub fn fail_delete(&self, id: &str, failure: DeleteFailure) {
        self.inner
            .lock()
            .delete_failures
            .insert(id.to_string(), failure);
    }

    pub fn fail_list(&self, kind: ResourceKind, compartment_id: &str) {
        self.inner
            .lock()
            .list_failures
            .insert((kind, compartment_id.to_string()));
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.inner.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(ProviderCall::is_mutation)
            .collect()
    }

    /// Ids passed to `delete`, in call order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Delete { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn state_of(&self, id: &str) -> Option<LifecycleState> {
        self.inner
            .lock()
            .resources
            .iter()
            .find(|r| r.descriptor.id == id)
            .map(|r| LifecycleState::from_provider(&r.descriptor.lifecycle_state))
    }

    fn record(&self, call: ProviderCall) {
        self.inner.lock().calls.push(call);
    }
}

#[async_trait]
impl CloudProvider for MemoryProvider {
    fn name(&self) -> &str {
        "fixture"
    }

    async fn subscribed_regions(&self, _home_region: &str) -> Result<Vec<String>, ProviderError> {
        self.record(ProviderCall::SubscribedRegions);
        Ok(self.inner.lock().regions.clone())
    }

    async fn list(
        &self,
        region: &str,
        kind: ResourceKind,
        scope: &ListScope,
    ) -> Result<Vec<ResourceDescriptor>, ProviderError> {
        self.record(ProviderCall::List {
            kind,
            compartment_id: scope.compartment_id.clone(),
            parent_id: scope.parent_id.clone(),
        });

        let inner = self.inner.lock();
        if inner
            .list_failures
            .contains(&(kind, scope.compartment_id.clone()))
        {
            return Err(ProviderError::Fixture(format!(
                "scripted list failure for {} in {}",
                kind, scope.compartment_id
            )));
        }

        Ok(inner
            .resources
            .iter()
            .filter(|r| r.kind == kind)
            .filter(|r| r.region.as_deref().is_none_or(|r| r == region))
            .filter(|r| r.descriptor.compartment_id == scope.compartment_id)
            .filter(|r| scope.parent_id.is_none() || r.parent_id == scope.parent_id)
            .map(|r| r.descriptor.clone())
            .collect())
    }

    async fn get_vnic(&self, _region: &str, vnic_id: &str) -> Result<Vnic, ProviderError> {
        self.record(ProviderCall::GetVnic {
            id: vnic_id.to_string(),
        });
        self.inner
            .lock()
            .vnics
            .get(vnic_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                kind: ResourceKind::Vnic,
                id: vnic_id.to_string(),
            })
    }

    async fn get_state(
        &self,
        _region: &str,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<LifecycleState>, ProviderError> {
        self.record(ProviderCall::GetState {
            kind,
            id: id.to_string(),
        });
        let mut inner = self.inner.lock();
        Ok(inner
            .resource_mut(kind, id)
            .map(|r| LifecycleState::from_provider(&r.descriptor.lifecycle_state)))
    }

    async fn delete(
        &self,
        _region: &str,
        kind: ResourceKind,
        id: &str,
    ) -> Result<(), ProviderError> {
        self.record(ProviderCall::Delete {
            kind,
            id: id.to_string(),
        });

        let mut inner = self.inner.lock();
        match inner.delete_failures.get(id).copied() {
            Some(DeleteFailure::InUse) => {
                return Err(ProviderError::InUse {
                    message: format!("{} '{}' cannot be deleted", kind, id),
                });
            }
            Some(DeleteFailure::Times(remaining)) if remaining > 0 => {
                inner
                    .delete_failures
                    .insert(id.to_string(), DeleteFailure::Times(remaining - 1));
                return Err(ProviderError::Fixture(format!(
                    "scripted delete failure for {} '{}'",
                    kind, id
                )));
            }
            _ => {}
        }

        let resource = inner
            .resource_mut(kind, id)
            .ok_or_else(|| ProviderError::NotFound {
                kind,
                id: id.to_string(),
            })?;
        resource.descriptor.lifecycle_state = kind.gone_state().as_str().to_string();
        Ok(())
    }

    async fn clear_route_rules(
        &self,
        _region: &str,
        route_table_id: &str,
    ) -> Result<(), ProviderError> {
        self.record(ProviderCall::ClearRouteRules {
            id: route_table_id.to_string(),
        });
        let mut inner = self.inner.lock();
        match inner.resource_mut(ResourceKind::RouteTable, route_table_id) {
            Some(_) => Ok(()),
            None => Err(ProviderError::NotFound {
                kind: ResourceKind::RouteTable,
                id: route_table_id.to_string(),
            }),
        }
    }
}
