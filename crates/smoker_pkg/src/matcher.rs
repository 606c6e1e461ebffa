//! Matching package manager requests against the definition catalog.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::def::PkgManagerDef;
use crate::error::{MatcherError, ResolveError, VersionError};
use crate::probe::SystemProbe;
use crate::spec::{DesiredPkgManager, PkgManagerSpec};
use crate::workspace::{PACKAGE_JSON, WorkspaceInfo};

/// The package manager a bare `system` request probes for.
pub const DEFAULT_SYSTEM_PKG_MANAGER: &str = "npm";

/// A definition as registered by a plugin.
#[derive(Clone)]
pub struct CatalogEntry {
    pub plugin_id: String,
    pub def: Arc<dyn PkgManagerDef>,
}

impl CatalogEntry {
    pub fn new(plugin_id: impl Into<String>, def: Arc<dyn PkgManagerDef>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            def,
        }
    }
}

impl fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("plugin_id", &self.plugin_id)
            .field("bin", &self.def.bin())
            .finish()
    }
}

/// A resolved spec bound to the definition that will drive it.
#[derive(Clone)]
pub struct PkgManagerEnvelope {
    pub spec: PkgManagerSpec,
    pub def: Arc<dyn PkgManagerDef>,
    pub plugin_id: String,
}

impl fmt::Debug for PkgManagerEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkgManagerEnvelope")
            .field("spec", &self.spec)
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}

/// A request that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedPkgManager {
    pub requested: String,
    pub reason: ResolveError,
}

/// Partition of requests into resolved envelopes and unsupported requests.
#[derive(Debug, Default)]
pub struct MatchResult {
    pub envelopes: Vec<PkgManagerEnvelope>,
    pub unsupported: Vec<UnsupportedPkgManager>,
}

/// Resolves package manager requests into envelopes.
///
/// One matcher lives for one run. The first resolved `system` envelope is
/// kept as the default system candidate, so equivalent system requests do
/// not probe the host again.
pub struct CatalogMatcher {
    entries: Vec<CatalogEntry>,
    probe: Arc<dyn SystemProbe>,
    default_system: Mutex<Option<PkgManagerEnvelope>>,
}

impl CatalogMatcher {
    /// Creates a matcher.
    ///
    /// An empty catalog is a caller bug and is rejected.
    pub fn new(
        entries: Vec<CatalogEntry>,
        probe: Arc<dyn SystemProbe>,
    ) -> Result<Self, MatcherError> {
        if entries.is_empty() {
            return Err(MatcherError::NoDefinitions);
        }
        Ok(Self {
            entries,
            probe,
            default_system: Mutex::new(None),
        })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Resolves every request. An empty `desired` list guesses one request
    /// from `cwd` and `workspaces`.
    ///
    /// Never fails per item; unresolvable requests land in
    /// [`MatchResult::unsupported`].
    pub async fn match_all(
        &self,
        desired: &[String],
        cwd: &Path,
        workspaces: &[WorkspaceInfo],
    ) -> MatchResult {
        let requests: Vec<(String, Result<DesiredPkgManager, ResolveError>)> = if desired.is_empty()
        {
            let guessed = self.guess(cwd, workspaces);
            info!("No package manager requested; using {}", guessed);
            vec![(guessed.to_string(), Ok(guessed))]
        } else {
            desired
                .iter()
                .map(|raw| (raw.clone(), raw.parse().map_err(ResolveError::from)))
                .collect()
        };

        let mut result = MatchResult::default();
        let mut seen = HashSet::new();
        for (requested, parsed) in requests {
            let resolved = match parsed {
                Ok(desired) => self.match_one(&desired, &requested).await,
                Err(e) => Err(e),
            };
            match resolved {
                Ok(envelope) => {
                    if seen.insert(envelope.spec.clone()) {
                        debug!("Resolved {} to {}", requested, envelope.spec);
                        result.envelopes.push(envelope);
                    } else {
                        debug!("Dropping duplicate {} ({})", envelope.spec, requested);
                    }
                }
                Err(reason) => {
                    warn!("Unsupported package manager {}: {}", requested, reason);
                    result
                        .unsupported
                        .push(UnsupportedPkgManager { requested, reason });
                }
            }
        }
        result
    }

    async fn match_one(
        &self,
        desired: &DesiredPkgManager,
        requested: &str,
    ) -> Result<PkgManagerEnvelope, ResolveError> {
        match desired {
            DesiredPkgManager::Explicit { name, version } => {
                self.match_explicit(name, version, requested)
            }
            DesiredPkgManager::System { name } => {
                let name = name.as_deref().unwrap_or(DEFAULT_SYSTEM_PKG_MANAGER);
                self.match_system(name, requested).await
            }
        }
    }

    fn candidates<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.def.bin().eq_ignore_ascii_case(name))
    }

    fn match_explicit(
        &self,
        name: &str,
        version: &str,
        requested: &str,
    ) -> Result<PkgManagerEnvelope, ResolveError> {
        let mut any = false;
        for entry in self.candidates(name) {
            any = true;
            if let Some(resolved) = entry.def.accepts(version) {
                let spec =
                    PkgManagerSpec::new(entry.def.bin(), resolved).with_requested_as(requested);
                return Ok(envelope(entry, spec));
            }
        }
        if !any {
            return Err(ResolveError::UnsupportedPackageManager {
                name: name.to_string(),
            });
        }
        Err(ResolveError::Version {
            name: name.to_string(),
            source: VersionError::unmatched(version),
        })
    }

    async fn match_system(
        &self,
        name: &str,
        requested: &str,
    ) -> Result<PkgManagerEnvelope, ResolveError> {
        if self.candidates(name).next().is_none() {
            return Err(ResolveError::UnsupportedPackageManager {
                name: name.to_string(),
            });
        }

        // Held across the probe so concurrent callers wait for one result.
        let mut default_system = self.default_system.lock().await;
        if let Some(cached) = default_system.as_ref()
            && cached.spec.name.eq_ignore_ascii_case(name)
        {
            debug!("Reusing default system package manager {}", cached.spec);
            let mut reused = cached.clone();
            reused.spec = reused.spec.with_requested_as(requested);
            return Ok(reused);
        }

        let path = self
            .probe
            .which(name)
            .await
            .ok_or_else(|| ResolveError::SystemNotFound {
                bin: name.to_string(),
            })?;
        let reported = self.probe.version(&path).await?;
        debug!("Found {} {} at {}", name, reported, path.display());

        for entry in self.candidates(name) {
            if let Some(resolved) = entry.def.accepts(&reported) {
                let spec = PkgManagerSpec::system(
                    entry.def.bin(),
                    path.display().to_string(),
                    resolved,
                )
                .with_requested_as(requested);
                let found = envelope(entry, spec);
                if default_system.is_none() {
                    *default_system = Some(found.clone());
                }
                return Ok(found);
            }
        }

        Err(ResolveError::Version {
            name: name.to_string(),
            source: VersionError::unmatched(&reported),
        })
    }

    /// Picks a request when none was given.
    ///
    /// A `packageManager` field wins, then a known lockfile (as a system
    /// request), then the default system package manager.
    pub fn guess(&self, cwd: &Path, workspaces: &[WorkspaceInfo]) -> DesiredPkgManager {
        let cwd_field = read_package_manager_field(cwd);
        let fields = cwd_field
            .into_iter()
            .chain(workspaces.iter().filter_map(|ws| ws.package_manager().map(str::to_string)));
        for field in fields {
            match DesiredPkgManager::from_package_manager_field(&field) {
                Ok(desired) => return desired,
                Err(e) => debug!("Ignoring packageManager field {:?}: {}", field, e),
            }
        }

        let dirs = std::iter::once(cwd).chain(workspaces.iter().map(|ws| ws.local_path.as_path()));
        for dir in dirs {
            for entry in &self.entries {
                if let Some(lockfile) = entry.def.lockfile()
                    && dir.join(lockfile).is_file()
                {
                    return DesiredPkgManager::System {
                        name: Some(entry.def.bin().to_ascii_lowercase()),
                    };
                }
            }
        }

        DesiredPkgManager::System { name: None }
    }
}

fn envelope(entry: &CatalogEntry, spec: PkgManagerSpec) -> PkgManagerEnvelope {
    PkgManagerEnvelope {
        spec,
        def: Arc::clone(&entry.def),
        plugin_id: entry.plugin_id.clone(),
    }
}

fn read_package_manager_field(dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(dir.join(PACKAGE_JSON)).ok()?;
    let pkg: Value = serde_json::from_str(&content).ok()?;
    pkg.get("packageManager")
        .and_then(Value::as_str)
        .map(str::to_string)
}
