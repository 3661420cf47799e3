//! Ordered, failure-tolerant teardown of a discovered tree.
//!
//! Every node goes through the same checks before anything is sent to the provider:
//! already terminal, then preserved, then the kind-specific routine. Failures are logged and
//! reported as [`Outcome::Failed`]; they never stop the rest of the tree from being processed.

use std::collections::{HashMap, HashSet};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::providers::{ProviderError, WaitOutcome};
use crate::registry::DependencyRef;
use crate::resource::{LifecycleState, ResourceKind, ResourceNode};
use crate::scanner::in_filter_scope;
use crate::session::ScanSession;
use crate::wait::WaitConfig;

/// Order in which a compartment's direct resources are torn down.
pub const COMPARTMENT_ORDER: [ResourceKind; 12] = [
    ResourceKind::Instance,
    ResourceKind::LoadBalancer,
    ResourceKind::DbSystem,
    ResourceKind::DrgAttachment,
    ResourceKind::Vcn,
    ResourceKind::IpSecConnection,
    ResourceKind::Cpe,
    ResourceKind::RemotePeeringConnection,
    ResourceKind::Drg,
    ResourceKind::DbBackup,
    ResourceKind::BlockVolume,
    ResourceKind::AutonomousDatabase,
];

/// Order in which a VCN's sub-resources are torn down before the VCN itself.
pub const VCN_ORDER: [ResourceKind; 7] = [
    ResourceKind::Subnet,
    ResourceKind::SecurityList,
    ResourceKind::RouteTable,
    ResourceKind::InternetGateway,
    ResourceKind::LocalPeeringGateway,
    ResourceKind::NatGateway,
    ResourceKind::ServiceGateway,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Terminated,
    AlreadyTerminal,
    /// The provider refused a default object and the refusal was accepted.
    Compensated,
    Simulated,
    /// Kept on purpose: tenancy root, out of scope, structure or top-level preservation.
    Retained,
    Preserved,
    Failed,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        !matches!(self, Outcome::Preserved | Outcome::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Terminated => "terminated",
            Outcome::AlreadyTerminal => "already terminal",
            Outcome::Compensated => "compensated",
            Outcome::Simulated => "simulated",
            Outcome::Retained => "retained",
            Outcome::Preserved => "preserved",
            Outcome::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of a compartment a pass is allowed to touch.
///
/// Compartments are global while their resources are regional, so a multi-region run cleans
/// resources everywhere first and deletes compartment objects from a single region afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CleanupStage {
    #[default]
    Full,
    ResourcesOnly,
    CompartmentsOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    pub simulate: bool,
    pub force: bool,
    pub preserve_top_level_compartment: bool,
    pub preserve_compartment_structure: bool,
    pub wait: WaitConfig,
    pub stage: CleanupStage,
}

impl CleanupOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            simulate: settings.cleanup.simulate,
            force: settings.cleanup.force,
            preserve_top_level_compartment: settings.preserve_top_level_compartment,
            preserve_compartment_structure: settings.preserve_compartment_structure,
            wait: settings.cleanup.wait_config(),
            stage: CleanupStage::Full,
        }
    }

    pub fn with_stage(mut self, stage: CleanupStage) -> Self {
        self.stage = stage;
        self
    }
}

/// Final outcome per resource id of one region's pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub region: String,
    pub discovered: usize,
    outcomes: HashMap<String, (ResourceKind, Outcome)>,
}

impl CleanupReport {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            ..Default::default()
        }
    }

    /// Later outcomes replace earlier ones, except that a re-visit finding the resource already
    /// gone keeps whatever the first visit did.
    pub fn record(&mut self, kind: ResourceKind, id: &str, outcome: Outcome) {
        if outcome == Outcome::AlreadyTerminal && self.outcomes.contains_key(id) {
            return;
        }
        self.outcomes.insert(id.to_string(), (kind, outcome));
    }

    pub fn outcome_of(&self, id: &str) -> Option<Outcome> {
        self.outcomes.get(id).map(|(_, outcome)| *outcome)
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.values().filter(|(_, o)| *o == outcome).count()
    }

    /// Ids that ended up failed, with their kind.
    pub fn failures(&self) -> Vec<(ResourceKind, &str)> {
        let mut failures: Vec<_> = self
            .outcomes
            .iter()
            .filter(|(_, (_, outcome))| *outcome == Outcome::Failed)
            .map(|(id, (kind, _))| (*kind, id.as_str()))
            .collect();
        failures.sort();
        failures
    }

    pub fn is_clean(&self) -> bool {
        self.count(Outcome::Failed) == 0
    }
}

/// Where a compartment sits relative to the name filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    in_scope: bool,
    /// First in-scope compartment on its path, the tenancy itself excluded.
    top_level: bool,
}

#[derive(Debug, Default)]
struct Blockers {
    failed: usize,
    kept: usize,
}

impl Blockers {
    fn note(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Failed => self.failed += 1,
            Outcome::Preserved | Outcome::Retained => self.kept += 1,
            _ => {}
        }
    }

    /// Outcome for a parent whose children did not all go away, if any.
    fn verdict(&self, node: &ResourceNode) -> Option<Outcome> {
        if self.failed > 0 {
            warn!(
                kind = %node.kind,
                id = %node.id,
                name = %node.name,
                failed = self.failed,
                "not deleted, some of its contents failed"
            );
            return Some(Outcome::Failed);
        }
        if self.kept > 0 {
            info!(
                kind = %node.kind,
                id = %node.id,
                name = %node.name,
                kept = self.kept,
                "kept, it still holds preserved resources"
            );
            return Some(Outcome::Retained);
        }
        None
    }

    fn any(&self) -> bool {
        self.failed > 0 || self.kept > 0
    }
}

pub struct CleanupEngine<'s> {
    session: &'s ScanSession,
    options: CleanupOptions,
    report: Mutex<CleanupReport>,
    /// Default route tables and security lists of the VCNs visited so far.
    default_objects: Mutex<HashSet<String>>,
}

impl<'s> CleanupEngine<'s> {
    pub fn new(session: &'s ScanSession, options: CleanupOptions) -> Self {
        Self {
            session,
            options,
            report: Mutex::new(CleanupReport::new(&session.region)),
            default_objects: Mutex::new(HashSet::new()),
        }
    }

    /// Continues from the report of an earlier pass over the same tree.
    pub fn with_report(self, report: CleanupReport) -> Self {
        *self.report.lock() = report;
        self
    }

    pub fn report(&self) -> CleanupReport {
        self.report.lock().clone()
    }

    pub fn into_report(self) -> CleanupReport {
        self.report.into_inner()
    }

    /// Tears down everything under `root`, usually the tenancy, and returns the root's outcome.
    pub async fn cleanup_tree(&self, root: &mut ResourceNode) -> Outcome {
        info!(
            region = %self.session.region,
            simulate = self.options.simulate,
            force = self.options.force,
            stage = ?self.options.stage,
            "cleanup started"
        );
        let outcome = self.terminate(root).await;

        let report = self.report.lock();
        info!(
            region = %self.session.region,
            terminated = report.count(Outcome::Terminated),
            simulated = report.count(Outcome::Simulated),
            failed = report.count(Outcome::Failed),
            "cleanup finished"
        );
        outcome
    }

    /// Terminates one node and everything it contains.
    ///
    /// A compartment passed here directly is treated as the root of the scan.
    pub fn terminate<'n>(&'n self, node: &'n mut ResourceNode) -> BoxFuture<'n, Outcome> {
        self.run(node, None)
    }

    fn run<'n>(
        &'n self,
        node: &'n mut ResourceNode,
        placement: Option<Placement>,
    ) -> BoxFuture<'n, Outcome> {
        async move {
            let outcome = self.dispatch(node, placement).await;
            self.report.lock().record(node.kind, &node.id, outcome);
            outcome
        }
        .boxed()
    }

    async fn dispatch(&self, node: &mut ResourceNode, placement: Option<Placement>) -> Outcome {
        if self.already_terminal(node) {
            debug!(kind = %node.kind, id = %node.id, "already terminal");
            return Outcome::AlreadyTerminal;
        }

        if node.kind == ResourceKind::Compartment {
            let placement = placement.unwrap_or_else(|| self.root_placement(node));
            return self.terminate_compartment(node, placement).await;
        }

        if self.session.rule().matches(node) {
            info!(kind = %node.kind, id = %node.id, name = %node.name, "preserved, not terminated");
            return Outcome::Preserved;
        }

        match node.kind {
            ResourceKind::Vcn => self.terminate_vcn(node).await,
            ResourceKind::Subnet => self.terminate_subnet(node).await,
            ResourceKind::Instance => self.terminate_instance(node).await,
            ResourceKind::DbSystem => self.terminate_db_system(node).await,
            ResourceKind::RouteTable | ResourceKind::SecurityList => {
                self.terminate_default_capable(node).await
            }
            _ => self.terminate_leaf(node).await,
        }
    }

    fn root_placement(&self, node: &ResourceNode) -> Placement {
        let in_scope = in_filter_scope(self.session, false, &node.name);
        Placement {
            in_scope,
            top_level: in_scope && !node.is_tenancy(),
        }
    }

    fn child_placement(&self, parent: Placement, parent_is_tenancy: bool, name: &str) -> Placement {
        let in_scope = in_filter_scope(self.session, parent.in_scope, name);
        Placement {
            in_scope,
            top_level: in_scope && (!parent.in_scope || parent_is_tenancy),
        }
    }

    async fn terminate_compartment(&self, node: &mut ResourceNode, placement: Placement) -> Outcome {
        let rule = self.session.rule();
        let forced = self.options.force && placement.top_level;
        let preserved = rule.matches_name(node) || (rule.matches_tags(node) && !forced);
        let is_tenancy = node.is_tenancy();
        let mut blockers = Blockers::default();

        for child in node.children_mut(ResourceKind::Compartment) {
            let child_placement = self.child_placement(placement, is_tenancy, &child.name);
            blockers.note(self.run(child, Some(child_placement)).await);
        }

        if preserved {
            info!(id = %node.id, name = %node.name, "compartment preserved, its resources are kept");
            return Outcome::Preserved;
        }

        if self.options.stage == CleanupStage::CompartmentsOnly {
            for child in node
                .iter_children()
                .filter(|child| child.kind != ResourceKind::Compartment)
            {
                blockers.note(self.settled_outcome(child));
            }
        } else {
            for kind in COMPARTMENT_ORDER {
                if kind == ResourceKind::DbSystem {
                    self.terminate_db_systems(node, &mut blockers).await;
                    continue;
                }
                for child in node.children_mut(kind) {
                    blockers.note(self.run(child, None).await);
                }
            }
        }

        if blockers.failed > 0 {
            return blockers.verdict(node).unwrap_or(Outcome::Failed);
        }
        if let Some(reason) = self.retain_reason(node, placement) {
            info!(id = %node.id, name = %node.name, reason, "compartment kept");
            return Outcome::Retained;
        }
        if let Some(outcome) = blockers.verdict(node) {
            return outcome;
        }

        self.terminate_leaf(node).await
    }

    fn retain_reason(&self, node: &ResourceNode, placement: Placement) -> Option<&'static str> {
        if node.is_tenancy() {
            return Some("tenancy root");
        }
        if !placement.in_scope {
            return Some("outside compartment filter");
        }
        if self.options.preserve_compartment_structure {
            return Some("compartment structure preserved");
        }
        if placement.top_level && self.options.preserve_top_level_compartment {
            return Some("top-level compartment preserved");
        }
        if placement.top_level && !self.options.force {
            return Some("top-level compartment requires force");
        }
        if self.options.stage == CleanupStage::ResourcesOnly {
            return Some("compartment deletion deferred");
        }
        None
    }

    /// What an earlier pass left of a resource, for passes that only delete compartments.
    fn settled_outcome(&self, node: &ResourceNode) -> Outcome {
        if node.is_terminal() || self.session.registry.is_terminal(&node.id) {
            return Outcome::AlreadyTerminal;
        }
        self.report
            .lock()
            .outcome_of(&node.id)
            .unwrap_or(Outcome::Failed)
    }

    // NOTE: a single retry over the systems that failed, primary/standby pairs fail transiently
    async fn terminate_db_systems(&self, compartment: &mut ResourceNode, blockers: &mut Blockers) {
        let compartment_id = compartment.id.clone();
        let systems = compartment.children_mut(ResourceKind::DbSystem);
        let mut failed = Vec::new();

        for (index, system) in systems.iter_mut().enumerate() {
            match self.run(system, None).await {
                Outcome::Failed => failed.push(index),
                outcome => blockers.note(outcome),
            }
        }

        if failed.is_empty() {
            return;
        }
        warn!(
            compartment_id = %compartment_id,
            count = failed.len(),
            "retrying failed db systems once"
        );
        for index in failed {
            blockers.note(self.run(&mut systems[index], None).await);
        }
    }

    async fn terminate_db_system(&self, system: &mut ResourceNode) -> Outcome {
        let mut blockers = Blockers::default();
        for home in system.children_mut(ResourceKind::DbHome) {
            blockers.note(self.run(home, None).await);
        }
        if let Some(outcome) = blockers.verdict(system) {
            return outcome;
        }
        self.terminate_leaf(system).await
    }

    async fn terminate_vcn(&self, vcn: &mut ResourceNode) -> Outcome {
        self.default_objects.lock().extend(
            [
                &vcn.links.default_route_table_id,
                &vcn.links.default_security_list_id,
            ]
            .into_iter()
            .flatten()
            .cloned(),
        );

        let mut blockers = Blockers::default();
        for kind in VCN_ORDER {
            for child in vcn.children_mut(kind) {
                blockers.note(self.run(child, None).await);
            }
            // NOTE: a surviving subnet still routes through the rest of the VCN
            if kind == ResourceKind::Subnet && blockers.any() {
                info!(
                    id = %vcn.id,
                    name = %vcn.name,
                    "subnet kept, rest of the vcn left in place"
                );
                break;
            }
        }
        if let Some(outcome) = blockers.verdict(vcn) {
            return outcome;
        }
        self.terminate_leaf(vcn).await
    }

    /// Removes everything registered against the subnet before the subnet itself.
    async fn terminate_subnet(&self, subnet: &mut ResourceNode) -> Outcome {
        for dependency in self.session.registry.dependents(&subnet.id) {
            if self.session.registry.is_terminal(&dependency.id) {
                continue;
            }
            let outcome = self.terminate_dependency(&subnet.id, &dependency).await;
            self.report
                .lock()
                .record(dependency.kind, &dependency.id, outcome);

            if !outcome.is_success() {
                warn!(
                    subnet_id = %subnet.id,
                    dependency_kind = %dependency.kind,
                    dependency_id = %dependency.id,
                    "subnet kept, a resource placed on it was not terminated"
                );
                return Outcome::Failed;
            }
        }
        self.terminate_leaf(subnet).await
    }

    async fn terminate_dependency(&self, subnet_id: &str, dependency: &DependencyRef) -> Outcome {
        if dependency.preserved {
            info!(
                kind = %dependency.kind,
                id = %dependency.id,
                name = %dependency.name,
                "preserved, not terminated"
            );
            return Outcome::Preserved;
        }

        debug!(subnet_id, dependency_id = %dependency.id, "terminating subnet dependency first");
        match self
            .destroy(dependency.kind, &dependency.id, &dependency.name)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.log_failure(dependency.kind, &dependency.id, &dependency.name, &err);
                Outcome::Failed
            }
        }
    }

    async fn terminate_instance(&self, instance: &mut ResourceNode) -> Outcome {
        let outcome = self.terminate_leaf(instance).await;
        if instance.is_terminal() {
            self.detach_attachments(instance);
        }
        outcome
    }

    /// Route tables and security lists: the VCN's default ones cannot be deleted on their own.
    ///
    /// Any other in-use refusal is a plain failure.
    async fn terminate_default_capable(&self, node: &mut ResourceNode) -> Outcome {
        match self.destroy(node.kind, &node.id, &node.name).await {
            Err(refusal) if refusal.is_in_use() && self.is_default_object(&node.id) => {
                self.compensate(node, &refusal).await
            }
            result => self.settle(node, result),
        }
    }

    fn is_default_object(&self, id: &str) -> bool {
        self.default_objects.lock().contains(id)
    }

    async fn compensate(&self, node: &ResourceNode, refusal: &ProviderError) -> Outcome {
        if node.kind != ResourceKind::RouteTable {
            info!(id = %node.id, name = %node.name, reason = %refusal, "default security list left to its vcn");
            return Outcome::Compensated;
        }

        match self
            .session
            .provider
            .clear_route_rules(&self.session.region, &node.id)
            .await
        {
            Ok(()) => {
                info!(id = %node.id, name = %node.name, "default route table emptied");
                Outcome::Compensated
            }
            Err(err) => {
                self.log_failure(node.kind, &node.id, &node.name, &err);
                Outcome::Failed
            }
        }
    }

    async fn terminate_leaf(&self, node: &mut ResourceNode) -> Outcome {
        let result = self.destroy(node.kind, &node.id, &node.name).await;
        self.settle(node, result)
    }

    /// Issues the delete and waits until the resource is gone.
    ///
    /// This is the only place a destructive call is made, so simulation stops here.
    async fn destroy(
        &self,
        kind: ResourceKind,
        id: &str,
        name: &str,
    ) -> Result<Outcome, ProviderError> {
        let region = self.session.region.as_str();
        if self.options.simulate {
            info!(region, %kind, id, name, "simulate: would terminate");
            return Ok(Outcome::Simulated);
        }

        info!(region, %kind, id, name, "terminating");
        if let Err(err) = self.session.provider.delete(region, kind, id).await {
            if !err.is_not_found() {
                return Err(err);
            }
            info!(region, %kind, id, name, "already gone");
            self.session.registry.record_state(id, kind.gone_state());
            return Ok(Outcome::AlreadyTerminal);
        }
        self.session
            .registry
            .record_state(id, LifecycleState::Terminating);

        let state = match self
            .session
            .provider
            .wait_for_state(region, kind, id, &LifecycleState::TERMINAL, self.options.wait)
            .await?
        {
            WaitOutcome::Reached(state) => state,
            WaitOutcome::NotFound => kind.gone_state(),
        };
        self.session.registry.record_state(id, state);

        info!(region, %kind, id, name, %state, "terminated");
        Ok(Outcome::Terminated)
    }

    fn settle(&self, node: &mut ResourceNode, result: Result<Outcome, ProviderError>) -> Outcome {
        self.sync_state(node);
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.log_failure(node.kind, &node.id, &node.name, &err);
                Outcome::Failed
            }
        }
    }

    fn sync_state(&self, node: &mut ResourceNode) {
        if let Some(state) = self.session.registry.state_of(&node.id) {
            node.advance_state(state);
        }
    }

    fn already_terminal(&self, node: &mut ResourceNode) -> bool {
        self.sync_state(node);
        if !node.is_terminal() {
            return false;
        }
        if node.kind == ResourceKind::Instance {
            self.detach_attachments(node);
        }
        true
    }

    fn detach_attachments(&self, instance: &mut ResourceNode) {
        for attachment in instance.children_mut(ResourceKind::VnicAttachment) {
            attachment.advance_state(LifecycleState::Detached);
            self.session
                .registry
                .record_state(&attachment.id, LifecycleState::Detached);
        }
    }

    fn log_failure(&self, kind: ResourceKind, id: &str, name: &str, err: &ProviderError) {
        error!(
            region = %self.session.region,
            %kind,
            id,
            name,
            error = %err,
            "termination failed"
        );
    }
}
