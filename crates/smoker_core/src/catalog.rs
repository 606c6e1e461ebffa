//! The set of components a run can draw from.

use std::fmt;
use std::sync::Arc;

use smoker_pkg::{CatalogEntry, Executor, HostProbe, PkgManagerDef, SystemProbe};
use smoker_rule::Rule;

use crate::bus::ReporterDef;
use crate::error::SmokerError;

/// Plugin id of the components that ship with smoker.
pub const BUILTIN_PLUGIN: &str = "smoker";

/// Package managers, rules, reporters and the executor they share.
///
/// Read-only once built; workers and sinks share it freely.
pub struct ComponentCatalog {
    plugin_id: String,
    pkg_managers: Vec<CatalogEntry>,
    rules: Vec<Arc<dyn Rule>>,
    reporters: Vec<Arc<dyn ReporterDef>>,
    executor: Arc<dyn Executor>,
    probe: Arc<dyn SystemProbe>,
}

impl ComponentCatalog {
    /// Creates an empty catalog that probes the real host.
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            plugin_id: BUILTIN_PLUGIN.to_string(),
            pkg_managers: Vec::new(),
            rules: Vec::new(),
            reporters: Vec::new(),
            executor,
            probe: Arc::new(HostProbe),
        }
    }

    /// Sets the plugin id recorded on package managers added afterwards.
    pub fn with_plugin_id(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = plugin_id.into();
        self
    }

    pub fn with_pkg_manager(mut self, def: Arc<dyn PkgManagerDef>) -> Self {
        self.pkg_managers
            .push(CatalogEntry::new(self.plugin_id.clone(), def));
        self
    }

    pub fn with_rule(mut self, rule: Arc<dyn Rule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = Arc<dyn Rule>>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ReporterDef>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn pkg_managers(&self) -> &[CatalogEntry] {
        &self.pkg_managers
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn reporters(&self) -> &[Arc<dyn ReporterDef>] {
        &self.reporters
    }

    pub fn reporter(&self, name: &str) -> Option<&Arc<dyn ReporterDef>> {
        self.reporters.iter().find(|r| r.name() == name)
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.executor)
    }

    pub fn probe(&self) -> Arc<dyn SystemProbe> {
        Arc::clone(&self.probe)
    }

    /// Plugin ids that contributed package managers, plus the catalog's own.
    pub fn plugin_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.plugin_id.as_str()];
        for entry in &self.pkg_managers {
            if !ids.contains(&entry.plugin_id.as_str()) {
                ids.push(&entry.plugin_id);
            }
        }
        ids
    }

    /// Rejects plugin names nothing in the catalog provides.
    pub fn check_plugins(&self, requested: &[String]) -> Result<(), SmokerError> {
        let known = self.plugin_ids();
        match requested.iter().find(|name| !known.contains(&name.as_str())) {
            Some(unknown) => Err(SmokerError::UnknownPlugin(unknown.clone())),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCatalog")
            .field("plugin_id", &self.plugin_id)
            .field(
                "pkg_managers",
                &self
                    .pkg_managers
                    .iter()
                    .map(|e| e.def.bin())
                    .collect::<Vec<_>>(),
            )
            .field(
                "rules",
                &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .field(
                "reporters",
                &self.reporters.iter().map(|r| r.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
