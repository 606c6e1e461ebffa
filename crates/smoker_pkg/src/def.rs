//! Capabilities supplied by package manager adapters.
//!
//! The core only ever talks to a package manager through
//! [`PkgManagerDef`], and only ever runs a binary through [`Executor`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ExecError, PkgManagerError};
use crate::spec::PkgManagerSpec;
use crate::workspace::WorkspaceInfo;

/// Options for a single executor invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Kills the process when cancelled.
    pub signal: Option<CancellationToken>,
}

/// What a finished process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub failed: bool,
}

/// Runs a package manager binary.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `spec`'s binary with `args`.
    ///
    /// A non-zero exit is reported through `ExecOutput::failed`, not as an
    /// error.
    async fn exec(
        &self,
        spec: &PkgManagerSpec,
        args: &[String],
        opts: ExecOptions,
    ) -> Result<ExecOutput, ExecError>;
}

/// Lifecycle hook stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    Setup,
    Teardown,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Teardown => f.write_str("teardown"),
        }
    }
}

/// Everything an adapter call needs from the owning worker.
#[derive(Clone)]
pub struct PkgManagerContext {
    pub spec: PkgManagerSpec,
    /// The worker's exclusive temp directory.
    pub tmpdir: PathBuf,
    pub executor: Arc<dyn Executor>,
    pub loose: bool,
    pub verbose: bool,
    pub signal: CancellationToken,
}

impl PkgManagerContext {
    /// Runs the package manager binary with the context's signal attached.
    pub async fn exec(
        &self,
        args: &[String],
        cwd: Option<PathBuf>,
    ) -> Result<ExecOutput, ExecError> {
        let opts = ExecOptions {
            cwd,
            env: Vec::new(),
            signal: Some(self.signal.clone()),
        };
        self.executor.exec(&self.spec, args, opts).await
    }
}

impl fmt::Debug for PkgManagerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkgManagerContext")
            .field("spec", &self.spec)
            .field("tmpdir", &self.tmpdir)
            .field("loose", &self.loose)
            .finish_non_exhaustive()
    }
}

/// One package to install: a packed workspace or an extra dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallManifest {
    /// Directory the install runs in.
    pub cwd: PathBuf,
    pub pkg_name: String,
    /// Tarball path or `name@range` passed to the package manager.
    pub pkg_spec: String,
    /// Where the package ends up; filled in once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
    /// Source workspace directory, for packed workspaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// `true` for dependencies requested with `add`.
    pub is_additional: bool,
}

impl InstallManifest {
    /// Creates a manifest for an extra dependency such as `lodash@4`.
    pub fn additional(cwd: impl Into<PathBuf>, pkg_spec: impl Into<String>) -> Self {
        let cwd = cwd.into();
        let pkg_spec = pkg_spec.into();
        let pkg_name = dependency_name(&pkg_spec).to_string();
        let install_path = cwd.join("node_modules").join(&pkg_name);
        Self {
            cwd,
            pkg_name,
            pkg_spec,
            install_path: Some(install_path),
            local_path: None,
            is_additional: true,
        }
    }
}

/// Strips a version suffix from a dependency request, keeping any scope.
fn dependency_name(pkg_spec: &str) -> &str {
    let search_from = usize::from(pkg_spec.starts_with('@'));
    match pkg_spec[search_from..].find('@') {
        Some(idx) => &pkg_spec[..idx + search_from],
        None => pkg_spec,
    }
}

/// One script to run in one installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunScriptManifest {
    pub script: String,
    pub pkg_name: String,
    /// The installed package directory.
    pub cwd: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

/// Why a script counted as failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Outcome of one script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunScriptResult {
    Ok {
        manifest: RunScriptManifest,
        output: ExecOutput,
    },
    Failed {
        manifest: RunScriptManifest,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<ExecOutput>,
        error: ScriptFailure,
    },
    Skipped {
        manifest: RunScriptManifest,
    },
}

impl RunScriptResult {
    /// Builds `Ok` or `Failed` from a finished process.
    pub fn from_output(manifest: RunScriptManifest, output: ExecOutput) -> Self {
        if output.failed {
            let error = ScriptFailure {
                message: format!(
                    "Script \"{}\" in package \"{}\" failed with exit code {}",
                    manifest.script,
                    manifest.pkg_name,
                    output
                        .exit_code
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string())
                ),
                exit_code: output.exit_code,
            };
            Self::Failed {
                manifest,
                output: Some(output),
                error,
            }
        } else {
            Self::Ok { manifest, output }
        }
    }

    pub fn manifest(&self) -> &RunScriptManifest {
        match self {
            Self::Ok { manifest, .. } | Self::Failed { manifest, .. } | Self::Skipped { manifest } => {
                manifest
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// A pluggable package manager strategy.
///
/// Implementations must be stateless with respect to a run; per-run state
/// lives in the [`PkgManagerContext`] the worker passes in.
#[async_trait]
pub trait PkgManagerDef: Send + Sync {
    /// Binary name, also used as the package manager name.
    fn bin(&self) -> &str;

    /// One-line description for listings.
    fn description(&self) -> &str {
        ""
    }

    /// Lockfile that identifies a project using this package manager.
    fn lockfile(&self) -> Option<&str> {
        None
    }

    /// Maps a version, range or tag to a concrete supported version.
    fn accepts(&self, value: &str) -> Option<Version>;

    async fn setup(&self, _ctx: &PkgManagerContext) -> Result<(), PkgManagerError> {
        Ok(())
    }

    async fn teardown(&self, _ctx: &PkgManagerContext) -> Result<(), PkgManagerError> {
        Ok(())
    }

    /// Packs a workspace into a tarball inside `ctx.tmpdir`.
    async fn pack(
        &self,
        ctx: &PkgManagerContext,
        workspace: &WorkspaceInfo,
    ) -> Result<InstallManifest, PkgManagerError>;

    /// Installs one manifest into `manifest.cwd`.
    async fn install(
        &self,
        ctx: &PkgManagerContext,
        manifest: &InstallManifest,
    ) -> Result<ExecOutput, PkgManagerError>;

    /// Runs one script in an installed package.
    async fn run_script(
        &self,
        ctx: &PkgManagerContext,
        manifest: &RunScriptManifest,
    ) -> Result<RunScriptResult, PkgManagerError>;
}
