//! # smoker_core
//!
//! Smoke test orchestration for smoker.
//!
//! This crate provides:
//! - Configuration loading and validation
//! - The event vocabulary and the event bus that fans events out to reporters
//! - The per-package-manager worker (pack, install, lint, run scripts)
//! - The `Smoker` run controller and its aggregated result
//!
//! ## Example
//!
//! ```rust,ignore
//! use smoker_core::{ComponentCatalog, Smoker, SmokerOptions};
//!
//! let (options, _) = SmokerOptions::discover(&cwd)?;
//! let smoker = Smoker::new(options, Arc::new(catalog));
//!
//! let result = smoker.smoke().await?;
//! for outcome in &result.pkg_managers {
//!     println!("{}: {} lint result(s)", outcome.pkg_manager, outcome.lint.len());
//! }
//! ```

pub mod bus;
mod catalog;
mod error;
pub mod event;
mod options;
mod result;
mod smoker;
pub mod worker;

pub use bus::{EventBus, EventSender, Reporter, ReporterDef, ReporterFailure};
pub use catalog::{BUILTIN_PLUGIN, ComponentCatalog};
pub use error::{
    AggregateCause, AggregateError, ComponentError, ConfigError, ReporterError, ReporterStage,
    SmokerError,
};
pub use event::Event;
pub use options::{CONFIG_FILES, PACKAGE_JSON_KEY, RuleSetting, SmokerOptions};
pub use result::{PkgManagerOutcome, SmokeResult};
pub use smoker::Smoker;
pub use worker::{PkgManagerWorker, WorkerOptions};

#[cfg(test)]
pub mod test_utils;
