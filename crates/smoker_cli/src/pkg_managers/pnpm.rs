//! pnpm adapter.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;
use smoker_pkg::{
    ExecOutput, InstallManifest, LifecycleStage, PkgManagerContext, PkgManagerDef,
    PkgManagerError, RunScriptManifest, RunScriptResult, Version, VersionAcceptor, VersionError,
    WorkspaceInfo,
};
use tracing::debug;

use super::{acceptor, args, failure_detail, packed_manifest};

const KNOWN_VERSIONS: &[&str] = &["8.15.9", "9.15.0", "10.0.0"];
const DIST_TAGS: &[(&str, &str)] = &[
    ("latest", "10.0.0"),
    ("latest-8", "8.15.9"),
    ("latest-9", "9.15.0"),
];
const SUPPORTED: &str = ">=8.0.0";

pub struct Pnpm {
    acceptor: VersionAcceptor,
}

impl Pnpm {
    pub fn new() -> Result<Self, VersionError> {
        Ok(Self {
            acceptor: acceptor("pnpm", KNOWN_VERSIONS, DIST_TAGS, SUPPORTED)?,
        })
    }
}

#[async_trait]
impl PkgManagerDef for Pnpm {
    fn bin(&self) -> &str {
        "pnpm"
    }

    fn description(&self) -> &str {
        "pnpm, the disk-space efficient package manager"
    }

    fn lockfile(&self) -> Option<&str> {
        Some("pnpm-lock.yaml")
    }

    fn accepts(&self, value: &str) -> Option<Version> {
        self.acceptor.accepts(value)
    }

    /// `pnpm add` refuses to run without a `package.json`.
    async fn setup(&self, ctx: &PkgManagerContext) -> Result<(), PkgManagerError> {
        let pkg_json = json!({ "name": "smoker-sandbox", "private": true });
        tokio::fs::write(ctx.tmpdir.join("package.json"), pkg_json.to_string())
            .await
            .map_err(|e| PkgManagerError::lifecycle(LifecycleStage::Setup, e))
    }

    async fn pack(
        &self,
        ctx: &PkgManagerContext,
        workspace: &WorkspaceInfo,
    ) -> Result<InstallManifest, PkgManagerError> {
        let destination = ctx.tmpdir.display().to_string();
        let output = ctx
            .exec(
                &args(&["pack", "--pack-destination", &destination]),
                Some(workspace.local_path.clone()),
            )
            .await?;
        if output.failed {
            return Err(PkgManagerError::pack(
                &workspace.pkg_name,
                failure_detail(&output),
            ));
        }

        let tarball = tarball_path(&output.stdout, &ctx.tmpdir)
            .ok_or_else(|| PkgManagerError::pack(&workspace.pkg_name, "pnpm pack printed no tarball"))?;
        debug!("[{}] Packed {} to {}", ctx.spec, workspace.pkg_name, tarball.display());
        Ok(packed_manifest(ctx, workspace, tarball))
    }

    async fn install(
        &self,
        ctx: &PkgManagerContext,
        manifest: &InstallManifest,
    ) -> Result<ExecOutput, PkgManagerError> {
        let mut argv = args(&["add", "--config.confirmModulesPurge=false"]);
        if ctx.loose {
            argv.push("--no-strict-peer-dependencies".to_string());
        }
        argv.push(manifest.pkg_spec.clone());
        Ok(ctx.exec(&argv, Some(manifest.cwd.clone())).await?)
    }

    async fn run_script(
        &self,
        ctx: &PkgManagerContext,
        manifest: &RunScriptManifest,
    ) -> Result<RunScriptResult, PkgManagerError> {
        super::run_script(ctx, manifest).await
    }
}

/// The tarball `pnpm pack` reports on its last line.
fn tarball_path(stdout: &str, destination: &Path) -> Option<PathBuf> {
    let last = stdout.lines().map(str::trim).rfind(|line| line.ends_with(".tgz"))?;
    let path = PathBuf::from(last);
    if path.is_absolute() {
        Some(path)
    } else {
        path.file_name().map(|name| destination.join(name))
    }
}
