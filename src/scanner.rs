//! Resource discovery inside each compartment of a built tree.
//!
//! Scanning walks every compartment, but only lists resources in those inside the compartment
//! name filter. Once a compartment is in scope, so is everything below it.

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::providers::ListScope;
use crate::registry::DependencyRef;
use crate::resource::{ResourceKind, ResourceNode};
use crate::session::ScanSession;

/// Sub-resources listed per VCN, attached to the VCN node.
pub const VCN_RESOURCES: [ResourceKind; 7] = [
    ResourceKind::Subnet,
    ResourceKind::InternetGateway,
    ResourceKind::NatGateway,
    ResourceKind::SecurityList,
    ResourceKind::RouteTable,
    ResourceKind::LocalPeeringGateway,
    ResourceKind::ServiceGateway,
];

const CONNECTIVITY_RESOURCES: [ResourceKind; 5] = [
    ResourceKind::Drg,
    ResourceKind::DrgAttachment,
    ResourceKind::Cpe,
    ResourceKind::RemotePeeringConnection,
    ResourceKind::IpSecConnection,
];

/// Whether a compartment falls inside the name filter, given its parent's answer.
pub fn in_filter_scope(session: &ScanSession, parent_in_scope: bool, name: &str) -> bool {
    let filter = &session.settings.scan.compartments;
    parent_in_scope || filter.is_empty() || filter.contains(name)
}

/// Scans every compartment of `root` and returns how many resources were attached.
pub async fn scan_tree(session: &ScanSession, root: &mut ResourceNode) -> usize {
    let root_in_scope = in_filter_scope(session, false, &root.name);
    let discovered = scan_compartment(session, root, root_in_scope).await;
    info!(region = %session.region, discovered, "resource discovery finished");
    discovered
}

fn scan_compartment<'a>(
    session: &'a ScanSession,
    compartment: &'a mut ResourceNode,
    in_scope: bool,
) -> BoxFuture<'a, usize> {
    async move {
        let mut discovered = 0;
        if in_scope {
            discovered += scan_resources(session, compartment).await;
        } else {
            debug!(name = %compartment.name, "outside compartment filter, resources not listed");
        }

        for child in compartment.children_mut(ResourceKind::Compartment) {
            let child_in_scope = in_filter_scope(session, in_scope, &child.name);
            discovered += scan_compartment(session, child, child_in_scope).await;
        }
        discovered
    }
    .boxed()
}

/// Lists every resource kind native to a compartment and attaches the results to it.
pub async fn scan_resources(session: &ScanSession, compartment: &mut ResourceNode) -> usize {
    let scope = ListScope::compartment(&compartment.id);
    let before = compartment.subtree_size();

    for mut vcn in discover(session, ResourceKind::Vcn, &scope).await {
        let vcn_filter = &session.settings.scan.vcns;
        if !vcn_filter.is_empty() && !vcn_filter.contains(&vcn.name) {
            debug!(name = %vcn.name, "outside vcn filter");
            continue;
        }
        let nested = ListScope::nested(&compartment.id, &vcn.id);
        for kind in VCN_RESOURCES {
            for child in discover(session, kind, &nested).await {
                vcn.append(child);
            }
        }
        compartment.append(vcn);
    }

    for kind in CONNECTIVITY_RESOURCES
        .into_iter()
        .chain([ResourceKind::BlockVolume])
    {
        for node in discover(session, kind, &scope).await {
            compartment.append(node);
        }
    }

    for mut instance in discover(session, ResourceKind::Instance, &scope).await {
        let nested = ListScope::nested(&compartment.id, &instance.id);
        for attachment in discover(session, ResourceKind::VnicAttachment, &nested).await {
            register_vnic_dependency(session, &instance, &attachment).await;
            instance.append(attachment);
        }
        compartment.append(instance);
    }

    for node in discover(session, ResourceKind::LoadBalancer, &scope).await {
        compartment.append(node);
    }

    for mut system in discover(session, ResourceKind::DbSystem, &scope).await {
        let nested = ListScope::nested(&compartment.id, &system.id);
        for home in discover(session, ResourceKind::DbHome, &nested).await {
            system.append(home);
        }
        compartment.append(system);
    }

    for kind in [ResourceKind::DbBackup, ResourceKind::AutonomousDatabase] {
        for node in discover(session, kind, &scope).await {
            compartment.append(node);
        }
    }

    compartment.subtree_size() - before
}

/// Lists one kind and keeps the active, non-skipped results.
async fn discover(session: &ScanSession, kind: ResourceKind, scope: &ListScope) -> Vec<ResourceNode> {
    let skip_preserved = session.settings.scan.skip_scan_preserved_resources;

    session
        .list_or_empty(kind, scope)
        .await
        .into_iter()
        .map(|descriptor| ResourceNode::from_descriptor(kind, descriptor))
        .filter(|node| {
            if !node.is_active() {
                debug!(%kind, id = %node.id, state = %node.state(), "skipping inactive resource");
                return false;
            }
            if skip_preserved && session.rule().matches_tags(node) {
                info!(%kind, id = %node.id, name = %node.name, "preserved, not scanned");
                return false;
            }
            info!(
                region = %session.region,
                %kind,
                id = %node.id,
                name = %node.name,
                "discovered"
            );
            true
        })
        .collect()
}

/// Records which resource has to go before the attachment's subnet can be deleted.
///
/// A primary VNIC cannot be detached on its own, so the instance itself becomes the subnet's
/// dependent. Secondary VNICs are released by deleting their attachment.
async fn register_vnic_dependency(
    session: &ScanSession,
    instance: &ResourceNode,
    attachment: &ResourceNode,
) {
    let mut subnet_id = attachment.links.subnet_id.clone();
    let mut primary = false;

    if let Some(vnic_id) = attachment.links.vnic_id.as_deref() {
        match session.provider.get_vnic(&session.region, vnic_id).await {
            Ok(vnic) => {
                primary = vnic.is_primary.unwrap_or(false);
                if subnet_id.is_none() {
                    subnet_id = vnic.subnet_id;
                }
            }
            Err(err) => {
                warn!(
                    attachment_id = %attachment.id,
                    vnic_id,
                    error = %err,
                    "vnic lookup failed, registering the attachment as dependent"
                );
            }
        }
    }

    let Some(subnet_id) = subnet_id else {
        debug!(attachment_id = %attachment.id, "attachment has no subnet yet");
        return;
    };

    let dependent = if primary { instance } else { attachment };
    session.registry.register(
        &subnet_id,
        DependencyRef {
            kind: dependent.kind,
            id: dependent.id.clone(),
            name: dependent.name.clone(),
            preserved: session.rule().matches(dependent),
        },
    );
}
