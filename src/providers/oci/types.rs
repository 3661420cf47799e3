use serde::Deserialize;

use crate::resource::ResourceKind;

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// OCI service an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Identity,
    Core,
    LoadBalancer,
    Database,
}

impl Service {
    pub fn host(self) -> &'static str {
        match self {
            Service::Identity => "identity",
            Service::Core | Service::LoadBalancer => "iaas",
            Service::Database => "database",
        }
    }

    pub fn api_version(self) -> &'static str {
        match self {
            Service::LoadBalancer => "20170115",
            _ => "20160918",
        }
    }
}

/// How one resource kind maps onto the REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub service: Service,
    pub collection: &'static str,
    /// Query parameter naming the parent resource for nested listings.
    pub parent_param: Option<&'static str>,
    pub list_query: &'static [(&'static str, &'static str)],
    pub delete_query: &'static [(&'static str, &'static str)],
}

impl Endpoint {
    const fn new(service: Service, collection: &'static str) -> Self {
        Self {
            service,
            collection,
            parent_param: None,
            list_query: &[],
            delete_query: &[],
        }
    }

    const fn parent(mut self, param: &'static str) -> Self {
        self.parent_param = Some(param);
        self
    }

    pub fn for_kind(kind: ResourceKind) -> Self {
        use ResourceKind::*;

        match kind {
            Compartment => Endpoint {
                // NOTE: immediate children only, the builder walks the hierarchy itself
                list_query: &[("compartmentIdInSubtree", "false")],
                ..Endpoint::new(Service::Identity, "compartments")
            },
            Instance => Endpoint {
                delete_query: &[("preserveBootVolume", "false")],
                ..Endpoint::new(Service::Core, "instances")
            },
            Vnic => Endpoint::new(Service::Core, "vnics"),
            VnicAttachment => Endpoint::new(Service::Core, "vnicAttachments").parent("instanceId"),
            Vcn => Endpoint::new(Service::Core, "vcns"),
            Subnet => Endpoint::new(Service::Core, "subnets").parent("vcnId"),
            InternetGateway => Endpoint::new(Service::Core, "internetGateways").parent("vcnId"),
            NatGateway => Endpoint::new(Service::Core, "natGateways").parent("vcnId"),
            ServiceGateway => Endpoint::new(Service::Core, "serviceGateways").parent("vcnId"),
            LocalPeeringGateway => {
                Endpoint::new(Service::Core, "localPeeringGateways").parent("vcnId")
            }
            SecurityList => Endpoint::new(Service::Core, "securityLists").parent("vcnId"),
            RouteTable => Endpoint::new(Service::Core, "routeTables").parent("vcnId"),
            Drg => Endpoint::new(Service::Core, "drgs"),
            DrgAttachment => Endpoint::new(Service::Core, "drgAttachments"),
            Cpe => Endpoint::new(Service::Core, "cpes"),
            RemotePeeringConnection => Endpoint::new(Service::Core, "remotePeeringConnections"),
            IpSecConnection => Endpoint::new(Service::Core, "ipsecConnections"),
            BlockVolume => Endpoint::new(Service::Core, "volumes"),
            LoadBalancer => Endpoint::new(Service::LoadBalancer, "loadBalancers"),
            DbSystem => Endpoint::new(Service::Database, "dbSystems"),
            DbHome => Endpoint::new(Service::Database, "dbHomes").parent("dbSystemId"),
            DbBackup => Endpoint::new(Service::Database, "backups"),
            AutonomousDatabase => Endpoint::new(Service::Database, "autonomousDatabases"),
        }
    }
}

/// Error body returned by every OCI service.
#[derive(Debug, Default, Deserialize)]
pub struct OciErrorBody {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSubscription {
    pub region_name: String,
    #[serde(default)]
    pub region_key: Option<String>,
    pub status: String,
    #[serde(default)]
    pub is_home_region: bool,
}

impl RegionSubscription {
    pub fn is_ready(&self) -> bool {
        self.status.eq_ignore_ascii_case("READY")
    }
}
