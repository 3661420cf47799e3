//! Compartment hierarchy discovery.

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::providers::ListScope;
use crate::resource::{ResourceKind, ResourceNode};
use crate::session::ScanSession;

/// Builds the compartment tree of the session's region, rooted at the tenancy.
///
/// Inactive compartments are dropped, and so are preserved ones: by name always, by tags only
/// when `skip_scan_preserved_resources` is set. Nothing below a dropped compartment is visited.
pub async fn build_compartment_tree(session: &ScanSession) -> ResourceNode {
    let mut root = ResourceNode::tenancy(
        &session.tenancy_id,
        &session.settings.profile.tenancy_name,
    );
    populate(session, &mut root).await;

    info!(
        region = %session.region,
        compartments = count_compartments(&root),
        "compartment tree built"
    );
    root
}

fn populate<'a>(session: &'a ScanSession, parent: &'a mut ResourceNode) -> BoxFuture<'a, ()> {
    async move {
        // NOTE: immediate children only, each level is filtered before descending
        let listed = session
            .list_or_empty(ResourceKind::Compartment, &ListScope::compartment(&parent.id))
            .await;

        for descriptor in listed {
            let mut child = ResourceNode::from_descriptor(ResourceKind::Compartment, descriptor);
            if !child.is_active() {
                debug!(name = %child.name, state = %child.state(), "skipping inactive compartment");
                continue;
            }
            if session.rule().matches_name(&child) {
                info!(name = %child.name, id = %child.id, "compartment preserved by name, not scanned");
                continue;
            }
            if session.settings.scan.skip_scan_preserved_resources
                && session.rule().matches_tags(&child)
            {
                info!(name = %child.name, id = %child.id, "compartment preserved by tags, not scanned");
                continue;
            }

            populate(session, &mut child).await;
            parent.append(child);
        }
    }
    .boxed()
}

pub fn count_compartments(node: &ResourceNode) -> usize {
    node.children(ResourceKind::Compartment)
        .iter()
        .map(|child| 1 + count_compartments(child))
        .sum()
}
