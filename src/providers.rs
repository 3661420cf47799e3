pub mod memory;
pub mod oci;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProfileConfig;
use crate::resource::{LifecycleState, ResourceDescriptor, ResourceKind};
use crate::wait::{PollError, WaitConfig, poll_until};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },
    /// The provider refused because the resource is still referenced or is a default object.
    #[error("resource in use: {message}")]
    InUse { message: String },
    #[error("timed out after {waited:?} waiting for '{id}'")]
    Timeout { id: String, waited: Duration },
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        kind: ResourceKind,
        operation: &'static str,
    },
    #[error("fixture error: {0}")]
    Fixture(String),
    #[error("oci error: {0}")]
    Oci(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    pub fn is_in_use(&self) -> bool {
        matches!(self, ProviderError::InUse { .. })
    }
}

/// Where a listing call looks: a compartment, optionally narrowed to one parent resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListScope {
    pub compartment_id: String,
    /// VCN for network sub-resources, instance for VNIC attachments, DB system for DB homes.
    pub parent_id: Option<String>,
}

impl ListScope {
    pub fn compartment(compartment_id: &str) -> Self {
        Self {
            compartment_id: compartment_id.to_string(),
            parent_id: None,
        }
    }

    pub fn nested(compartment_id: &str, parent_id: &str) -> Self {
        Self {
            compartment_id: compartment_id.to_string(),
            parent_id: Some(parent_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vnic {
    pub id: String,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub is_primary: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reached(LifecycleState),
    NotFound,
}

/// The cloud API seen by discovery and cleanup. Every call names its region explicitly.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn subscribed_regions(&self, home_region: &str) -> Result<Vec<String>, ProviderError>;

    /// Lists every resource of `kind` in `scope`, across all pages.
    async fn list(
        &self,
        region: &str,
        kind: ResourceKind,
        scope: &ListScope,
    ) -> Result<Vec<ResourceDescriptor>, ProviderError>;

    async fn get_vnic(&self, region: &str, vnic_id: &str) -> Result<Vnic, ProviderError>;

    /// Current state of a resource, `None` once the provider no longer knows it.
    async fn get_state(
        &self,
        region: &str,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<LifecycleState>, ProviderError>;

    async fn delete(&self, region: &str, kind: ResourceKind, id: &str)
    -> Result<(), ProviderError>;

    async fn clear_route_rules(&self, region: &str, route_table_id: &str)
    -> Result<(), ProviderError>;

    async fn wait_for_state(
        &self,
        region: &str,
        kind: ResourceKind,
        id: &str,
        targets: &[LifecycleState],
        wait: WaitConfig,
    ) -> Result<WaitOutcome, ProviderError> {
        let result = poll_until(wait, id, || async move {
            Ok::<_, ProviderError>(match self.get_state(region, kind, id).await? {
                None => Some(WaitOutcome::NotFound),
                Some(state) if targets.contains(&state) => Some(WaitOutcome::Reached(state)),
                Some(_) => None,
            })
        })
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(PollError::Check(err)) if err.is_not_found() => Ok(WaitOutcome::NotFound),
            Err(PollError::Check(err)) => Err(err),
            Err(PollError::TimedOut { waited, .. }) => Err(ProviderError::Timeout {
                id: id.to_string(),
                waited,
            }),
        }
    }
}

pub fn get_provider(
    profile: &ProfileConfig,
    fixture: Option<&Path>,
) -> Result<Arc<dyn CloudProvider>, ProviderError> {
    if let Some(path) = fixture {
        return Ok(Arc::new(memory::MemoryProvider::from_fixture_file(path)?));
    }

    match profile.provider.as_str() {
        "oci" => Ok(Arc::new(oci::OciProvider::new(profile)?)),
        "fixture" => Err(ProviderError::Fixture(
            "fixture provider requires --fixture <path>".to_string(),
        )),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(provider: &str) -> ProfileConfig {
        ProfileConfig {
            tenancy: "ocid1.tenancy.oc1..root".to_string(),
            provider: provider.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_provider_oci() {
        let provider = get_provider(&profile("oci"), None).unwrap();
        assert_eq!(provider.name(), "oci");
    }

    #[test]
    fn test_get_provider_unknown() {
        let result = get_provider(&profile("aws"), None);
        match result {
            Err(ProviderError::UnknownProvider(name)) => assert_eq!(name, "aws"),
            _ => panic!("expected UnknownProvider error"),
        }
    }

    #[test]
    fn test_get_provider_fixture_without_path() {
        let result = get_provider(&profile("fixture"), None);
        assert!(matches!(result, Err(ProviderError::Fixture(_))));
    }

    #[test]
    fn test_error_predicates() {
        let not_found = ProviderError::NotFound {
            kind: ResourceKind::Instance,
            id: "i1".to_string(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_in_use());
        assert_eq!(not_found.to_string(), "instance 'i1' not found");

        let in_use = ProviderError::InUse {
            message: "default route table".to_string(),
        };
        assert!(in_use.is_in_use());
    }

    #[test]
    fn test_vnic_deserialization() {
        let vnic: Vnic = serde_json::from_str(
            r#"{"id": "vnic1", "subnetId": "subnet1", "isPrimary": true, "privateIp": "10.0.0.2"}"#,
        )
        .unwrap();
        assert_eq!(vnic.subnet_id.as_deref(), Some("subnet1"));
        assert_eq!(vnic.is_primary, Some(true));
    }
}
