use std::sync::Arc;

use crate::config::Settings;
use crate::preserve::PreservationRule;
use crate::providers::{CloudProvider, ListScope};
use crate::registry::DependencyRegistry;
use crate::resource::{ResourceDescriptor, ResourceKind};

/// Everything one region worker needs, passed explicitly down the builder, scanner and engine.
pub struct ScanSession {
    pub region: String,
    pub tenancy_id: String,
    pub provider: Arc<dyn CloudProvider>,
    pub settings: Arc<Settings>,
    pub registry: DependencyRegistry,
}

impl ScanSession {
    pub fn new(region: &str, provider: Arc<dyn CloudProvider>, settings: Arc<Settings>) -> Self {
        Self {
            region: region.to_string(),
            tenancy_id: settings.profile.tenancy.clone(),
            provider,
            settings,
            registry: DependencyRegistry::new(),
        }
    }

    pub fn rule(&self) -> &PreservationRule {
        &self.settings.preservation
    }

    /// Lists resources, treating a failed call as an empty result.
    ///
    /// Discovery never aborts: the failure is logged and siblings carry on.
    pub async fn list_or_empty(
        &self,
        kind: ResourceKind,
        scope: &ListScope,
    ) -> Vec<ResourceDescriptor> {
        match self.provider.list(&self.region, kind, scope).await {
            Ok(descriptors) => descriptors,
            Err(err) => {
                tracing::warn!(
                    region = %self.region,
                    %kind,
                    compartment_id = %scope.compartment_id,
                    parent_id = ?scope.parent_id,
                    error = %err,
                    "listing failed, treating as empty"
                );
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSession")
            .field("region", &self.region)
            .field("tenancy_id", &self.tenancy_id)
            .field("provider", &self.provider.name())
            .finish()
    }
}
