use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Every resource kind the scanner discovers and the cleanup engine knows how to tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Compartment,
    Instance,
    Vnic,
    VnicAttachment,
    Vcn,
    Subnet,
    InternetGateway,
    NatGateway,
    Drg,
    DrgAttachment,
    Cpe,
    RemotePeeringConnection,
    IpSecConnection,
    ServiceGateway,
    LocalPeeringGateway,
    SecurityList,
    RouteTable,
    BlockVolume,
    LoadBalancer,
    DbSystem,
    DbHome,
    DbBackup,
    AutonomousDatabase,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Compartment => "compartment",
            ResourceKind::Instance => "instance",
            ResourceKind::Vnic => "vnic",
            ResourceKind::VnicAttachment => "vnic_attachment",
            ResourceKind::Vcn => "vcn",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "internet_gateway",
            ResourceKind::NatGateway => "nat_gateway",
            ResourceKind::Drg => "drg",
            ResourceKind::DrgAttachment => "drg_attachment",
            ResourceKind::Cpe => "cpe",
            ResourceKind::RemotePeeringConnection => "remote_peering_connection",
            ResourceKind::IpSecConnection => "ip_sec_connection",
            ResourceKind::ServiceGateway => "service_gateway",
            ResourceKind::LocalPeeringGateway => "local_peering_gateway",
            ResourceKind::SecurityList => "security_list",
            ResourceKind::RouteTable => "route_table",
            ResourceKind::BlockVolume => "block_volume",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::DbSystem => "db_system",
            ResourceKind::DbHome => "db_home",
            ResourceKind::DbBackup => "db_backup",
            ResourceKind::AutonomousDatabase => "autonomous_database",
        }
    }

    /// State the provider reports once a resource of this kind is gone.
    pub fn gone_state(self) -> LifecycleState {
        match self {
            ResourceKind::Compartment | ResourceKind::LoadBalancer | ResourceKind::DbBackup => {
                LifecycleState::Deleted
            }
            ResourceKind::VnicAttachment => LifecycleState::Detached,
            _ => LifecycleState::Terminated,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider lifecycle state collapsed to what discovery and cleanup care about.
///
/// States only move forward: `Active -> Terminating -> Terminated | Deleted | Detached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Active,
    Terminating,
    Terminated,
    Deleted,
    Detached,
}

impl LifecycleState {
    pub const TERMINAL: [LifecycleState; 3] = [
        LifecycleState::Terminated,
        LifecycleState::Deleted,
        LifecycleState::Detached,
    ];

    pub fn from_provider(state: &str) -> Self {
        match state.to_ascii_uppercase().as_str() {
            "TERMINATING" | "DELETING" | "DETACHING" => LifecycleState::Terminating,
            "TERMINATED" => LifecycleState::Terminated,
            "DELETED" => LifecycleState::Deleted,
            "DETACHED" => LifecycleState::Detached,
            _ => LifecycleState::Active,
        }
    }

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Discovery skips anything that is already on its way out.
    pub fn is_inactive(self) -> bool {
        self != LifecycleState::Active
    }

    fn rank(self) -> u8 {
        match self {
            LifecycleState::Active => 0,
            LifecycleState::Terminating => 1,
            LifecycleState::Terminated | LifecycleState::Deleted | LifecycleState::Detached => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Terminating => "TERMINATING",
            LifecycleState::Terminated => "TERMINATED",
            LifecycleState::Deleted => "DELETED",
            LifecycleState::Detached => "DETACHED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type FreeformTags = BTreeMap<String, String>;
pub type DefinedTags = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// A resource as the provider reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub id: String,
    // NOTE: compartments carry `name`, everything else `displayName`
    #[serde(default, alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub lifecycle_state: String,
    #[serde(default)]
    pub compartment_id: String,
    #[serde(default)]
    pub freeform_tags: FreeformTags,
    #[serde(default)]
    pub defined_tags: DefinedTags,
    #[serde(flatten)]
    pub links: ResourceLinks,
}

impl ResourceDescriptor {
    pub fn new(id: &str, name: &str, compartment_id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: name.to_string(),
            lifecycle_state: LifecycleState::Active.as_str().to_string(),
            compartment_id: compartment_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: &str) -> Self {
        self.lifecycle_state = state.to_string();
        self
    }

    pub fn with_freeform_tag(mut self, key: &str, value: &str) -> Self {
        self.freeform_tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_defined_tag(mut self, namespace: &str, key: &str, value: &str) -> Self {
        self.defined_tags
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), serde_json::Value::String(value.to_string()));
        self
    }

    pub fn with_links(mut self, links: ResourceLinks) -> Self {
        self.links = links;
        self
    }
}

/// Cross references between resources that discovery and cleanup follow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnic_id: Option<String>,
    /// Set on VCNs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_route_table_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_security_list_id: Option<String>,
}

/// A discovered resource and the resources nested under it, bucketed by kind.
///
/// A node owns its children for the lifetime of a scan and cleanup pass. Lookups from
/// elsewhere (see [`crate::registry::DependencyRegistry`]) go through the resource id.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub id: String,
    pub name: String,
    pub kind: ResourceKind,
    pub compartment_id: String,
    pub freeform_tags: FreeformTags,
    pub defined_tags: DefinedTags,
    pub links: ResourceLinks,
    state: LifecycleState,
    children: BTreeMap<ResourceKind, Vec<ResourceNode>>,
}

impl ResourceNode {
    pub fn from_descriptor(kind: ResourceKind, descriptor: ResourceDescriptor) -> Self {
        Self {
            state: LifecycleState::from_provider(&descriptor.lifecycle_state),
            id: descriptor.id,
            name: descriptor.display_name,
            kind,
            compartment_id: descriptor.compartment_id,
            freeform_tags: descriptor.freeform_tags,
            defined_tags: descriptor.defined_tags,
            links: descriptor.links,
            children: BTreeMap::new(),
        }
    }

    /// Synthetic root compartment standing for the tenancy itself.
    pub fn tenancy(tenancy_id: &str, name: &str) -> Self {
        Self::from_descriptor(
            ResourceKind::Compartment,
            ResourceDescriptor::new(tenancy_id, name, tenancy_id),
        )
    }

    // NOTE: the tenancy is the only compartment that owns itself
    pub fn is_tenancy(&self) -> bool {
        self.kind == ResourceKind::Compartment && self.id == self.compartment_id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_inactive()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves the node to `state` unless that would go backwards. Returns whether it moved.
    pub fn advance_state(&mut self, state: LifecycleState) -> bool {
        if state == self.state || state.rank() < self.state.rank() {
            return false;
        }
        self.state = state;
        true
    }

    pub fn append(&mut self, child: ResourceNode) {
        self.children.entry(child.kind).or_default().push(child);
    }

    pub fn children(&self, kind: ResourceKind) -> &[ResourceNode] {
        self.children.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children_mut(&mut self, kind: ResourceKind) -> &mut [ResourceNode] {
        match self.children.get_mut(&kind) {
            Some(children) => children.as_mut_slice(),
            None => &mut [],
        }
    }

    pub fn iter_children(&self) -> impl Iterator<Item = &ResourceNode> {
        self.children.values().flatten()
    }

    pub fn has_children(&self) -> bool {
        self.children.values().any(|bucket| !bucket.is_empty())
    }

    pub fn find(&self, id: &str) -> Option<&ResourceNode> {
        if self.id == id {
            return Some(self);
        }
        self.iter_children().find_map(|child| child.find(id))
    }

    /// Number of nodes in this subtree, this one included.
    pub fn subtree_size(&self) -> usize {
        1 + self
            .iter_children()
            .map(ResourceNode::subtree_size)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(kind: ResourceKind, id: &str) -> ResourceNode {
        ResourceNode::from_descriptor(kind, ResourceDescriptor::new(id, id, "comp1"))
    }

    #[test]
    fn test_lifecycle_state_parsing() {
        assert_eq!(LifecycleState::from_provider("RUNNING"), LifecycleState::Active);
        assert_eq!(LifecycleState::from_provider("AVAILABLE"), LifecycleState::Active);
        assert_eq!(LifecycleState::from_provider("PROVISIONING"), LifecycleState::Active);
        assert_eq!(LifecycleState::from_provider("DELETING"), LifecycleState::Terminating);
        assert_eq!(LifecycleState::from_provider("detaching"), LifecycleState::Terminating);
        assert_eq!(LifecycleState::from_provider("TERMINATED"), LifecycleState::Terminated);
        assert_eq!(LifecycleState::from_provider("DELETED"), LifecycleState::Deleted);
        assert_eq!(LifecycleState::from_provider("DETACHED"), LifecycleState::Detached);
    }

    #[test]
    fn test_inactive_and_terminal_sets() {
        assert!(!LifecycleState::Active.is_inactive());
        assert!(LifecycleState::Terminating.is_inactive());
        assert!(!LifecycleState::Terminating.is_terminal());
        for state in LifecycleState::TERMINAL {
            assert!(state.is_terminal());
            assert!(state.is_inactive());
        }
    }

    #[test]
    fn test_advance_state_is_forward_only() {
        let mut instance = node(ResourceKind::Instance, "i1");
        assert!(instance.advance_state(LifecycleState::Terminating));
        assert!(instance.advance_state(LifecycleState::Terminated));
        assert!(!instance.advance_state(LifecycleState::Active));
        assert!(!instance.advance_state(LifecycleState::Terminating));
        assert_eq!(instance.state(), LifecycleState::Terminated);
    }

    #[test]
    fn test_children_keep_insertion_order_per_kind() {
        let mut vcn = node(ResourceKind::Vcn, "vcn1");
        vcn.append(node(ResourceKind::Subnet, "s2"));
        vcn.append(node(ResourceKind::RouteTable, "rt1"));
        vcn.append(node(ResourceKind::Subnet, "s1"));

        let subnets: Vec<&str> = vcn
            .children(ResourceKind::Subnet)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(subnets, vec!["s2", "s1"]);
        assert_eq!(vcn.children(ResourceKind::RouteTable).len(), 1);
        assert!(vcn.children(ResourceKind::NatGateway).is_empty());
        assert!(vcn.children_mut(ResourceKind::NatGateway).is_empty());
        assert_eq!(vcn.subtree_size(), 4);
    }

    #[test]
    fn test_find_descends_into_nested_buckets() {
        let mut root = ResourceNode::tenancy("tenancy1", "tenancy");
        let mut dev = node(ResourceKind::Compartment, "dev");
        let mut vcn = node(ResourceKind::Vcn, "vcn1");
        vcn.append(node(ResourceKind::Subnet, "subnet1"));
        dev.append(vcn);
        root.append(dev);

        assert_eq!(root.find("subnet1").map(|n| n.kind), Some(ResourceKind::Subnet));
        assert!(root.find("missing").is_none());
    }

    #[test]
    fn test_tenancy_root_detection() {
        let root = ResourceNode::tenancy("ocid1.tenancy.oc1..aaa", "acme");
        assert!(root.is_tenancy());
        assert!(!node(ResourceKind::Compartment, "dev").is_tenancy());
    }

    #[test]
    fn test_descriptor_deserialization_camel_case() {
        let json = r#"{
            "id": "ocid1.vcn.oc1..vcn",
            "displayName": "prod-vcn",
            "lifecycleState": "AVAILABLE",
            "compartmentId": "ocid1.compartment.oc1..dev",
            "freeformTags": {"keep": "true"},
            "definedTags": {"Ops": {"owner": "team-a"}},
            "defaultRouteTableId": "ocid1.routetable.oc1..rt",
            "cidrBlock": "10.0.0.0/16"
        }"#;

        let descriptor: ResourceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.display_name, "prod-vcn");
        assert_eq!(descriptor.freeform_tags["keep"], "true");
        assert_eq!(descriptor.defined_tags["Ops"]["owner"], "team-a");
        assert_eq!(
            descriptor.links.default_route_table_id.as_deref(),
            Some("ocid1.routetable.oc1..rt")
        );
    }

    #[test]
    fn test_compartment_descriptor_uses_name_alias() {
        let json = r#"{
            "id": "ocid1.compartment.oc1..dev",
            "name": "Dev",
            "lifecycleState": "ACTIVE",
            "compartmentId": "ocid1.tenancy.oc1..root"
        }"#;

        let descriptor: ResourceDescriptor = serde_json::from_str(json).unwrap();
        let node = ResourceNode::from_descriptor(ResourceKind::Compartment, descriptor);
        assert_eq!(node.name, "Dev");
        assert!(node.is_active());
    }

    #[test]
    fn test_gone_state_per_kind() {
        assert_eq!(ResourceKind::Compartment.gone_state(), LifecycleState::Deleted);
        assert_eq!(ResourceKind::VnicAttachment.gone_state(), LifecycleState::Detached);
        assert_eq!(ResourceKind::Instance.gone_state(), LifecycleState::Terminated);
    }
}
