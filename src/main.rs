mod cli;

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};

use cli::{Cli, Command, SourceArgs};
use tenancy_reaper::cleanup::CleanupReport;
use tenancy_reaper::config::{Overrides, Settings, default_config_path};
use tenancy_reaper::{logging, output, providers, runner};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(cli.log, cli.log_level, cli.log_output.as_deref())?;

    match cli.command {
        Command::Sweep(args) => {
            let settings = Arc::new(load_settings(&args.source, args.overrides())?);
            let provider =
                providers::get_provider(&settings.profile, args.source.fixture.as_deref())?;

            let runs = runner::run(provider, settings.clone()).await?;
            for run in &runs {
                println!("region: {}", run.session.region);
                println!("{}", output::render_tree(&run.tree));
            }

            if settings.operation().is_destructive() {
                let reports: Vec<CleanupReport> = runs.iter().map(|run| run.report.clone()).collect();
                println!("{}", output::summary_table(&reports));

                for report in reports.iter().filter(|report| !report.is_clean()) {
                    for (kind, id) in report.failures() {
                        tracing::warn!(region = %report.region, %kind, id, "left behind");
                    }
                }
            }
        }
        Command::Regions(source) => {
            let settings = load_settings(&source, source.overrides())?;
            let provider = providers::get_provider(&settings.profile, source.fixture.as_deref())?;
            for region in runner::resolve_regions(provider.as_ref(), &settings).await? {
                println!("{region}");
            }
        }
    }

    Ok(())
}

fn load_settings(source: &SourceArgs, overrides: Overrides) -> Result<Settings> {
    let path = source
        .config
        .clone()
        .or_else(default_config_path)
        .ok_or_else(|| eyre!("no configuration location available, pass --config"))?;

    let mut settings =
        Settings::load(&path).wrap_err_with(|| format!("loading {}", path.display()))?;
    settings.apply(overrides);
    Ok(settings)
}
