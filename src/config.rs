//! Typed configuration loaded from a TOML file, with command-line overrides on top.
//!
//! File keys map one to one onto the structs below; unknown keys are rejected so a typo in a
//! preservation rule fails loudly instead of silently preserving nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::preserve::PreservationRule;
use crate::providers::oci::OCI_ENDPOINT_TEMPLATE;
use crate::wait::WaitConfig;

pub const CONFIG_ENV: &str = "REAPER_CONFIG";
pub const AUTH_TOKEN_ENV: &str = "OCI_AUTH_TOKEN";

const APP_DIR: &str = "tenancy-reaper";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required section [{0}]")]
    MissingSection(&'static str),
    #[error("profile.tenancy must be set")]
    MissingTenancy,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `$REAPER_CONFIG` is handled by the CLI; this is the fallback.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Discover and print the tree.
    #[default]
    List,
    /// Discover, then terminate everything in scope that is not preserved.
    Cleanup,
    /// Cleanup with every scope filter dropped and `force` implied.
    TerminateAll,
}

impl Operation {
    pub fn is_destructive(self) -> bool {
        !matches!(self, Operation::List)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Cleanup => "cleanup",
            Operation::TerminateAll => "terminate-all",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    #[serde(default)]
    pub tenancy: String,
    /// Label of the synthetic root compartment in reports.
    #[serde(default = "default_tenancy_name")]
    pub tenancy_name: String,
    #[serde(default)]
    pub home_region: Option<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_tenancy_name() -> String {
    "tenancy".to_string()
}

fn default_provider() -> String {
    "oci".to_string()
}

fn default_endpoint_template() -> String {
    OCI_ENDPOINT_TEMPLATE.to_string()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            tenancy: String::new(),
            tenancy_name: default_tenancy_name(),
            home_region: None,
            provider: default_provider(),
            endpoint_template: default_endpoint_template(),
            auth_token: None,
        }
    }
}

impl std::fmt::Debug for ProfileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileConfig")
            .field("tenancy", &self.tenancy)
            .field("tenancy_name", &self.tenancy_name)
            .field("home_region", &self.home_region)
            .field("provider", &self.provider)
            .field("endpoint_template", &self.endpoint_template)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Empty means every subscribed region.
    pub regions: Vec<String>,
    /// Compartment name filter. Empty means the whole tenancy is in scope.
    pub compartments: BTreeSet<String>,
    pub vcns: BTreeSet<String>,
    pub skip_scan_preserved_resources: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PreserveSection {
    compartments: BTreeSet<String>,
    top_level_compartment: bool,
    compartment_structure: bool,
    freeform_tags: BTreeMap<String, String>,
    defined_tags: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanupConfig {
    pub operation: Operation,
    pub simulate: bool,
    pub force: bool,
    pub wait_timeout_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            operation: Operation::List,
            simulate: false,
            force: false,
            wait_timeout_secs: 1800,
            poll_interval_secs: 5,
        }
    }
}

impl CleanupConfig {
    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.wait_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    profile: Option<ProfileConfig>,
    #[serde(default)]
    scan: ScanConfig,
    #[serde(default)]
    preserve: PreserveSection,
    #[serde(default)]
    cleanup: CleanupConfig,
}

/// Values given on the command line. `None` / `false` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub operation: Option<Operation>,
    pub regions: Option<Vec<String>>,
    pub compartments: Option<Vec<String>>,
    pub vcns: Option<Vec<String>>,
    pub simulate: bool,
    pub force: bool,
    pub auth_token: Option<String>,
}

/// Fully resolved settings shared by every region worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub profile: ProfileConfig,
    pub scan: ScanConfig,
    pub preservation: PreservationRule,
    pub preserve_top_level_compartment: bool,
    pub preserve_compartment_structure: bool,
    pub cleanup: CleanupConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content)?;
        let profile = file.profile.ok_or(ConfigError::MissingSection("profile"))?;

        let mut settings = Self {
            profile,
            scan: file.scan,
            preservation: PreservationRule {
                freeform_tags: file.preserve.freeform_tags,
                defined_tags: file.preserve.defined_tags,
                compartments: file.preserve.compartments,
            },
            preserve_top_level_compartment: file.preserve.top_level_compartment,
            preserve_compartment_structure: file.preserve.compartment_structure,
            cleanup: file.cleanup,
        };
        settings.validate()?;
        settings.normalize();
        Ok(settings)
    }

    /// Settings for a tenancy with every option at its default.
    pub fn for_tenancy(tenancy: &str) -> Self {
        Self {
            profile: ProfileConfig {
                tenancy: tenancy.to_string(),
                ..Default::default()
            },
            scan: ScanConfig::default(),
            preservation: PreservationRule::default(),
            preserve_top_level_compartment: false,
            preserve_compartment_structure: false,
            cleanup: CleanupConfig::default(),
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(operation) = overrides.operation {
            self.cleanup.operation = operation;
        }
        if let Some(regions) = overrides.regions {
            self.scan.regions = regions;
        }
        if let Some(compartments) = overrides.compartments {
            self.scan.compartments = compartments.into_iter().collect();
        }
        if let Some(vcns) = overrides.vcns {
            self.scan.vcns = vcns.into_iter().collect();
        }
        if overrides.auth_token.is_some() {
            self.profile.auth_token = overrides.auth_token;
        }
        self.cleanup.simulate |= overrides.simulate;
        self.cleanup.force |= overrides.force;
        self.normalize();
    }

    pub fn operation(&self) -> Operation {
        self.cleanup.operation
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.tenancy.trim().is_empty() {
            return Err(ConfigError::MissingTenancy);
        }
        if self.cleanup.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cleanup.poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.cleanup.wait_timeout_secs < self.cleanup.poll_interval_secs {
            return Err(ConfigError::Invalid(
                "cleanup.wait_timeout_secs must not be shorter than the poll interval".to_string(),
            ));
        }
        Ok(())
    }

    fn normalize(&mut self) {
        if self.cleanup.operation == Operation::TerminateAll {
            self.scan.compartments.clear();
            self.scan.vcns.clear();
            self.cleanup.force = true;
        }
    }
}
