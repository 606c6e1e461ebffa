//! CLI utility functions

use std::path::PathBuf;
use std::sync::Arc;

use miette::{IntoDiagnostic, Result};
use smoker_core::ComponentCatalog;
use tokio::runtime::Runtime;

use crate::executor::HostExecutor;
use crate::pkg_managers::builtin_pkg_managers;
use crate::reporters::builtin_reporters;

pub fn create_tokio_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()
}

/// Catalog with every built-in component, running tools on the host.
pub fn builtin_catalog() -> Result<ComponentCatalog> {
    let mut catalog = ComponentCatalog::new(Arc::new(HostExecutor));
    for def in builtin_pkg_managers()? {
        catalog = catalog.with_pkg_manager(def);
    }
    catalog = catalog.with_rules(smoker_rule::builtin_rules());
    for reporter in builtin_reporters() {
        catalog = catalog.with_reporter(reporter);
    }
    Ok(catalog)
}

/// `--cwd` if given, otherwise the process working directory.
pub fn resolve_cwd(cwd: Option<&PathBuf>) -> Result<PathBuf> {
    match cwd {
        Some(path) => std::fs::canonicalize(path).into_diagnostic(),
        None => std::env::current_dir().into_diagnostic(),
    }
}
