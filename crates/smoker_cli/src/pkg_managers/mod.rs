//! Built-in package manager adapters.

mod npm;
mod pnpm;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use smoker_pkg::{
    ExecOutput, InstallManifest, KnownVersions, PkgManagerContext, PkgManagerDef,
    PkgManagerError, RunScriptManifest, RunScriptResult, VersionAcceptor, VersionError,
    VersionResolver, WorkspaceInfo,
};

pub use npm::Npm;
pub use pnpm::Pnpm;

/// Every adapter that ships with smoker.
pub fn builtin_pkg_managers() -> Result<Vec<Arc<dyn PkgManagerDef>>, VersionError> {
    Ok(vec![Arc::new(Npm::new()?), Arc::new(Pnpm::new()?)])
}

/// Builds the `accepts` logic for one adapter from its known versions.
fn acceptor(
    name: &str,
    versions: &[&str],
    tags: &[(&str, &str)],
    supported: &str,
) -> Result<VersionAcceptor, VersionError> {
    let known = KnownVersions::parse(versions.iter().copied(), tags.iter().copied())?;
    let resolver = Arc::new(VersionResolver::new().with_catalog(name, known));
    VersionAcceptor::new(name, resolver, supported)
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Describes a failed process for error messages.
fn failure_detail(output: &ExecOutput) -> String {
    let code = output
        .exit_code
        .map_or_else(|| "unknown".to_string(), |c| c.to_string());
    match output.stderr.trim() {
        "" => format!("`{}` exited with code {code}", output.command),
        stderr => format!("`{}` exited with code {code}: {stderr}", output.command),
    }
}

/// Manifest for a tarball installed into the worker's temp directory.
fn packed_manifest(
    ctx: &PkgManagerContext,
    workspace: &WorkspaceInfo,
    tarball: PathBuf,
) -> InstallManifest {
    InstallManifest {
        cwd: ctx.tmpdir.clone(),
        pkg_name: workspace.pkg_name.clone(),
        pkg_spec: tarball.display().to_string(),
        install_path: Some(installed_path(&ctx.tmpdir, &workspace.pkg_name)),
        local_path: Some(workspace.local_path.clone()),
        is_additional: false,
    }
}

fn installed_path(cwd: &Path, pkg_name: &str) -> PathBuf {
    cwd.join("node_modules").join(pkg_name)
}

/// Runs `<bin> run <script>` in the installed package.
async fn run_script(
    ctx: &PkgManagerContext,
    manifest: &RunScriptManifest,
) -> Result<RunScriptResult, PkgManagerError> {
    let output = ctx
        .exec(&args(&["run", &manifest.script]), Some(manifest.cwd.clone()))
        .await
        .map_err(|e| PkgManagerError::ScriptRunner {
            script: manifest.script.clone(),
            pkg_name: manifest.pkg_name.clone(),
            message: e.to_string(),
        })?;
    Ok(RunScriptResult::from_output(manifest.clone(), output))
}
