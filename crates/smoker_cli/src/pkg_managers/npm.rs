//! npm adapter.

use async_trait::async_trait;
use serde_json::Value;
use smoker_pkg::{
    ExecOutput, InstallManifest, PkgManagerContext, PkgManagerDef, PkgManagerError,
    RunScriptManifest, RunScriptResult, Version, VersionAcceptor, VersionError, WorkspaceInfo,
};
use tracing::debug;

use super::{acceptor, args, failure_detail, packed_manifest};

const KNOWN_VERSIONS: &[&str] = &["7.24.2", "8.19.4", "9.9.4", "10.9.2", "11.0.0"];
const DIST_TAGS: &[(&str, &str)] = &[
    ("latest", "11.0.0"),
    ("latest-7", "7.24.2"),
    ("latest-8", "8.19.4"),
    ("latest-9", "9.9.4"),
    ("latest-10", "10.9.2"),
];
/// `--pack-destination` first shipped in npm 7.
const SUPPORTED: &str = ">=7.0.0";

pub struct Npm {
    acceptor: VersionAcceptor,
}

impl Npm {
    pub fn new() -> Result<Self, VersionError> {
        Ok(Self {
            acceptor: acceptor("npm", KNOWN_VERSIONS, DIST_TAGS, SUPPORTED)?,
        })
    }
}

#[async_trait]
impl PkgManagerDef for Npm {
    fn bin(&self) -> &str {
        "npm"
    }

    fn description(&self) -> &str {
        "npm, the package manager bundled with Node.js"
    }

    fn lockfile(&self) -> Option<&str> {
        Some("package-lock.json")
    }

    fn accepts(&self, value: &str) -> Option<Version> {
        self.acceptor.accepts(value)
    }

    async fn pack(
        &self,
        ctx: &PkgManagerContext,
        workspace: &WorkspaceInfo,
    ) -> Result<InstallManifest, PkgManagerError> {
        let destination = ctx.tmpdir.display().to_string();
        let output = ctx
            .exec(
                &args(&[
                    "pack",
                    "--json",
                    "--pack-destination",
                    &destination,
                    "--foreground-scripts=false",
                ]),
                Some(workspace.local_path.clone()),
            )
            .await?;
        if output.failed {
            return Err(PkgManagerError::pack(
                &workspace.pkg_name,
                failure_detail(&output),
            ));
        }

        let filename = tarball_filename(&output.stdout)
            .ok_or_else(|| PkgManagerError::pack(&workspace.pkg_name, "npm pack printed no tarball"))?;
        debug!("[{}] Packed {} to {}", ctx.spec, workspace.pkg_name, filename);
        Ok(packed_manifest(ctx, workspace, ctx.tmpdir.join(filename)))
    }

    async fn install(
        &self,
        ctx: &PkgManagerContext,
        manifest: &InstallManifest,
    ) -> Result<ExecOutput, PkgManagerError> {
        let mut argv = args(&["install", "--no-audit", "--no-fund", "--no-package-lock"]);
        if ctx.loose {
            argv.push("--legacy-peer-deps".to_string());
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

/// `filename` of the first entry of `npm pack --json` output.
///
/// Lifecycle scripts may print before the JSON, so parsing starts at the
/// first line opening an array.
fn tarball_filename(stdout: &str) -> Option<String> {
    let start = stdout
        .lines()
        .scan(0, |offset, line| {
            let at = *offset;
            *offset += line.len() + 1;
            Some((at, line))
        })
        .find(|(_, line)| line.trim_start().starts_with('['))
        .map(|(at, _)| at)?;
    let parsed: Value = serde_json::from_str(&stdout[start..]).ok()?;
    parsed
        .as_array()?
        .first()?
        .get("filename")?
        .as_str()
        .map(str::to_string)
}
