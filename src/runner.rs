//! Runs discovery and cleanup for every region in parallel.
//!
//! Regions share nothing, so each gets its own [`ScanSession`] on a tokio task. Compartments are
//! global though: a destructive run first cleans resources in every region, then deletes the
//! compartment objects once, from the home region.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cleanup::{CleanupEngine, CleanupOptions, CleanupReport, CleanupStage};
use crate::config::Settings;
use crate::error::ReaperError;
use crate::providers::CloudProvider;
use crate::resource::ResourceNode;
use crate::scanner::scan_tree;
use crate::session::ScanSession;
use crate::tree::build_compartment_tree;

/// Everything one region produced.
#[derive(Debug)]
pub struct RegionRun {
    pub session: ScanSession,
    pub tree: ResourceNode,
    pub report: CleanupReport,
}

/// Configured regions, or every subscribed region when none are configured.
pub async fn resolve_regions(
    provider: &dyn CloudProvider,
    settings: &Settings,
) -> Result<Vec<String>, ReaperError> {
    if !settings.scan.regions.is_empty() {
        return Ok(settings.scan.regions.clone());
    }

    let home_region = settings.profile.home_region.as_deref().unwrap_or_default();
    let regions = provider.subscribed_regions(home_region).await?;
    if regions.is_empty() {
        warn!("no subscribed regions found");
    }
    Ok(regions)
}

pub async fn run(
    provider: Arc<dyn CloudProvider>,
    settings: Arc<Settings>,
) -> Result<Vec<RegionRun>, ReaperError> {
    let regions = resolve_regions(provider.as_ref(), &settings).await?;
    info!(
        operation = settings.operation().as_str(),
        regions = ?regions,
        simulate = settings.cleanup.simulate,
        "run started"
    );

    let mut workers = JoinSet::new();
    for region in &regions {
        workers.spawn(region_pass(
            region.clone(),
            provider.clone(),
            settings.clone(),
        ));
    }

    let mut runs = Vec::with_capacity(regions.len());
    while let Some(result) = workers.join_next().await {
        runs.push(result?);
    }
    runs.sort_by_key(|run| {
        regions
            .iter()
            .position(|region| *region == run.session.region)
            .unwrap_or(usize::MAX)
    });

    if settings.operation().is_destructive() {
        if let Some(index) = compartment_region(&runs, &settings) {
            delete_compartments(&mut runs[index], &settings).await;
        }
    }

    Ok(runs)
}

async fn region_pass(
    region: String,
    provider: Arc<dyn CloudProvider>,
    settings: Arc<Settings>,
) -> RegionRun {
    let session = ScanSession::new(&region, provider, settings.clone());
    info!(region = %region, "discovery started");

    let mut tree = build_compartment_tree(&session).await;
    let discovered = scan_tree(&session, &mut tree).await;

    let mut report = CleanupReport::new(&region);
    if settings.operation().is_destructive() {
        let options =
            CleanupOptions::from_settings(&settings).with_stage(CleanupStage::ResourcesOnly);
        let engine = CleanupEngine::new(&session, options);
        engine.cleanup_tree(&mut tree).await;
        report = engine.into_report();
    }
    report.discovered = discovered;

    RegionRun {
        session,
        tree,
        report,
    }
}

/// The home region if it was scanned, otherwise the first region.
fn compartment_region(runs: &[RegionRun], settings: &Settings) -> Option<usize> {
    if runs.is_empty() {
        return None;
    }
    let home = settings.profile.home_region.as_deref();
    Some(
        runs.iter()
            .position(|run| Some(run.session.region.as_str()) == home)
            .unwrap_or(0),
    )
}

async fn delete_compartments(run: &mut RegionRun, settings: &Settings) {
    info!(region = %run.session.region, "deleting compartments");

    let options = CleanupOptions::from_settings(settings).with_stage(CleanupStage::CompartmentsOnly);
    let engine =
        CleanupEngine::new(&run.session, options).with_report(std::mem::take(&mut run.report));
    engine.cleanup_tree(&mut run.tree).await;
    run.report = engine.into_report();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Operation;
    use crate::providers::memory::MemoryProvider;
    use crate::resource::{ResourceDescriptor, ResourceKind};

    fn settings(operation: Operation) -> Settings {
        let mut settings = Settings::for_tenancy("root");
        settings.profile.home_region = Some("r2".to_string());
        settings.cleanup.operation = operation;
        settings.cleanup.force = true;
        settings
    }

    #[tokio::test]
    async fn test_resolve_configured_regions_first() {
        let provider = MemoryProvider::new(&["r1", "r2"]);
        let mut settings = settings(Operation::List);
        settings.scan.regions = vec!["r9".to_string()];

        let regions = resolve_regions(&provider, &settings).await.unwrap();
        assert_eq!(regions, vec!["r9".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_subscribed_regions() {
        let provider = MemoryProvider::new(&["r1", "r2"]);
        let regions = resolve_regions(&provider, &settings(Operation::List)).await.unwrap();
        assert_eq!(regions, vec!["r1".to_string(), "r2".to_string()]);
    }

    #[tokio::test]
    async fn test_list_runs_every_region_without_mutations() {
        let provider = Arc::new(MemoryProvider::new(&["r1", "r2"]));
        provider.insert(
            ResourceKind::Compartment,
            None,
            ResourceDescriptor::new("dev", "Dev", "root"),
        );
        provider.insert_in_region("r2", ResourceKind::Vcn, ResourceDescriptor::new("v", "net", "dev"));

        let runs = run(provider.clone(), Arc::new(settings(Operation::List)))
            .await
            .unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].session.region, "r1");
        assert_eq!(runs[0].report.discovered, 0);
        assert_eq!(runs[1].report.discovered, 1);
        assert!(provider.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_compartment_deleted_once_after_all_regions() {
        let provider = Arc::new(MemoryProvider::new(&["r1", "r2"]));
        provider.insert(
            ResourceKind::Compartment,
            None,
            ResourceDescriptor::new("dev", "Dev", "root"),
        );
        provider.insert_in_region("r1", ResourceKind::BlockVolume, ResourceDescriptor::new("bv1", "a", "dev"));
        provider.insert_in_region("r2", ResourceKind::BlockVolume, ResourceDescriptor::new("bv2", "b", "dev"));

        let runs = run(provider.clone(), Arc::new(settings(Operation::Cleanup)))
            .await
            .unwrap();

        let deleted = provider.deleted_ids();
        assert_eq!(deleted.len(), 3);
        assert_eq!(deleted.last().map(String::as_str), Some("dev"));
        assert_eq!(deleted.iter().filter(|id| *id == "dev").count(), 1);

        let home = runs.iter().find(|r| r.session.region == "r2").unwrap();
        assert_eq!(home.report.outcome_of("dev"), Some(crate::cleanup::Outcome::Terminated));
    }
}
