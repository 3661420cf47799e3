mod client;
mod error;
mod types;

pub use client::{OCI_ENDPOINT_TEMPLATE, OciClient};
pub use error::OciError;
pub use types::{DEFAULT_PAGE_SIZE, Endpoint, RegionSubscription, Service};

use async_trait::async_trait;

use super::{CloudProvider, ListScope, ProviderError, Vnic};
use crate::config::ProfileConfig;
use crate::resource::{LifecycleState, ResourceDescriptor, ResourceKind};

pub struct OciProvider {
    client: OciClient,
    tenancy: String,
    home_region: Option<String>,
}

impl OciProvider {
    pub fn new(profile: &ProfileConfig) -> Result<Self, ProviderError> {
        let client = OciClient::with_base_url(
            profile.auth_token.clone(),
            profile.endpoint_template.clone(),
        )?;

        Ok(Self::with_client(
            client,
            profile.tenancy.clone(),
            profile.home_region.clone(),
        ))
    }

    pub fn with_client(client: OciClient, tenancy: String, home_region: Option<String>) -> Self {
        Self {
            client,
            tenancy,
            home_region,
        }
    }

    // NOTE: IAM writes (compartments) are only accepted in the home region
    fn region_for<'a>(&'a self, kind: ResourceKind, region: &'a str) -> &'a str {
        match (kind, &self.home_region) {
            (ResourceKind::Compartment, Some(home)) => home.as_str(),
            _ => region,
        }
    }
}

#[async_trait]
impl CloudProvider for OciProvider {
    fn name(&self) -> &str {
        "oci"
    }

    async fn subscribed_regions(&self, home_region: &str) -> Result<Vec<String>, ProviderError> {
        if home_region.is_empty() {
            return Err(ProviderError::Oci(
                "profile.home_region is required to discover subscribed regions".to_string(),
            ));
        }
        let subscriptions = self
            .client
            .region_subscriptions(home_region, &self.tenancy)
            .await?;

        let regions: Vec<String> = subscriptions
            .into_iter()
            .filter(RegionSubscription::is_ready)
            .map(|s| s.region_name)
            .collect();

        tracing::info!(count = regions.len(), "subscribed regions discovered");
        Ok(regions)
    }

    async fn list(
        &self,
        region: &str,
        kind: ResourceKind,
        scope: &ListScope,
    ) -> Result<Vec<ResourceDescriptor>, ProviderError> {
        Ok(self.client.list_resources(region, kind, scope).await?)
    }

    async fn get_vnic(&self, region: &str, vnic_id: &str) -> Result<Vnic, ProviderError> {
        Ok(self.client.get_vnic(region, vnic_id).await?)
    }

    async fn get_state(
        &self,
        region: &str,
        kind: ResourceKind,
        id: &str,
    ) -> Result<Option<LifecycleState>, ProviderError> {
        let region = self.region_for(kind, region);
        let descriptor = self.client.get_resource(region, kind, id).await?;
        Ok(descriptor.map(|d| LifecycleState::from_provider(&d.lifecycle_state)))
    }

    async fn delete(
        &self,
        region: &str,
        kind: ResourceKind,
        id: &str,
    ) -> Result<(), ProviderError> {
        let region = self.region_for(kind, region);
        Ok(self.client.delete_resource(region, kind, id).await?)
    }

    async fn clear_route_rules(
        &self,
        region: &str,
        route_table_id: &str,
    ) -> Result<(), ProviderError> {
        Ok(self.client.clear_route_rules(region, route_table_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(home_region: Option<&str>) -> OciProvider {
        OciProvider::with_client(
            OciClient::new(None).unwrap(),
            "ocid1.tenancy.oc1..root".to_string(),
            home_region.map(str::to_string),
        )
    }

    #[test]
    fn test_compartment_calls_go_to_home_region() {
        let provider = provider(Some("eu-frankfurt-1"));
        assert_eq!(
            provider.region_for(ResourceKind::Compartment, "us-ashburn-1"),
            "eu-frankfurt-1"
        );
        assert_eq!(
            provider.region_for(ResourceKind::Vcn, "us-ashburn-1"),
            "us-ashburn-1"
        );
    }

    #[test]
    fn test_without_home_region_calls_stay_regional() {
        let provider = provider(None);
        assert_eq!(
            provider.region_for(ResourceKind::Compartment, "us-ashburn-1"),
            "us-ashburn-1"
        );
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(provider(None).name(), "oci");
    }
}
