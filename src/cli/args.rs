use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tenancy_reaper::config::{AUTH_TOKEN_ENV, CONFIG_ENV, Operation, Overrides};
use tenancy_reaper::logging::{LogLevel, LogTarget};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Where log events go
    #[arg(long, value_enum, default_value_t = LogTarget::Console, global = true)]
    pub log: LogTarget,

    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    /// Log file used by `--log file` and `--log all`
    #[arg(long, global = true)]
    pub log_output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover the tenancy and, depending on the operation, tear it down
    Sweep(SweepArgs),
    /// Print the regions a sweep would visit
    Regions(SourceArgs),
}

/// Where configuration and resources come from.
#[derive(clap::Args, Debug)]
pub struct SourceArgs {
    #[arg(long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Read the tenancy from a JSON snapshot instead of the cloud API
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    #[arg(long, env = AUTH_TOKEN_ENV, hide_env_values = true)]
    pub auth_token: Option<String>,
}

impl SourceArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            auth_token: self.auth_token.clone(),
            ..Default::default()
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct SweepArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(short, long, value_enum)]
    pub operation: Option<Operation>,

    #[arg(long, value_delimiter = ',')]
    pub regions: Option<Vec<String>>,

    /// Compartment names to limit the sweep to
    #[arg(long, value_delimiter = ',')]
    pub compartments: Option<Vec<String>>,

    #[arg(long, value_delimiter = ',')]
    pub vcns: Option<Vec<String>>,

    /// Walk the full termination logic without deleting anything
    #[arg(long)]
    pub simulate: bool,

    /// Allow terminating top-level compartments
    #[arg(long)]
    pub force: bool,
}

impl SweepArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            operation: self.operation,
            regions: self.regions.clone(),
            compartments: self.compartments.clone(),
            vcns: self.vcns.clone(),
            simulate: self.simulate,
            force: self.force,
            ..self.source.overrides()
        }
    }
}
