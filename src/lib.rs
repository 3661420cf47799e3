//! tenancy-reaper
//!
//! Discovers every resource of a cloud tenancy across its compartment hierarchy and subscribed
//! regions, then tears it down in dependency order while honoring preservation rules.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod preserve;
pub mod providers;
pub mod registry;
pub mod resource;
pub mod runner;
pub mod scanner;
pub mod session;
pub mod tree;
pub mod wait;

pub use cleanup::{CleanupEngine, CleanupOptions, CleanupReport, Outcome};
pub use config::{Operation, Settings};
pub use error::ReaperError;
pub use providers::{CloudProvider, ProviderError};
pub use resource::{LifecycleState, ResourceKind, ResourceNode};
pub use session::ScanSession;
