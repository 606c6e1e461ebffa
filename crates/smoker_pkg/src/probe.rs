//! Host lookups for `system` package managers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::ResolveError;

/// Locates package manager binaries on the host and asks them their version.
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Returns the path to `bin`, if it is on `PATH`.
    async fn which(&self, bin: &str) -> Option<PathBuf>;

    /// Runs `path --version` and returns the trimmed version string.
    async fn version(&self, path: &Path) -> Result<String, ResolveError>;
}

/// [`SystemProbe`] backed by the real `PATH` and process spawning.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

#[async_trait]
impl SystemProbe for HostProbe {
    async fn which(&self, bin: &str) -> Option<PathBuf> {
        find_in_path(bin)
    }

    async fn version(&self, path: &Path) -> Result<String, ResolveError> {
        let bin = path.display().to_string();
        debug!("Probing {} --version", bin);

        let output = Command::new(path)
            .arg("--version")
            .output()
            .await
            .map_err(|e| ResolveError::Probe {
                bin: bin.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ResolveError::Probe {
                bin,
                message: format!("exited with {}", output.status),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(clean_version(&stdout))
    }
}

fn clean_version(raw: &str) -> String {
    let line = raw.lines().next().unwrap_or_default().trim();
    line.strip_prefix('v').unwrap_or(line).to_string()
}

fn find_in_path(bin: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        for name in candidate_names(bin) {
            let candidate = dir.join(&name);
            if candidate.is_file() && is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(windows)]
fn candidate_names(bin: &str) -> Vec<String> {
    vec![format!("{bin}.cmd"), format!("{bin}.exe"), bin.to_string()]
}

#[cfg(not(windows))]
fn candidate_names(bin: &str) -> Vec<String> {
    vec![bin.to_string()]
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        if let Ok(meta) = std::fs::metadata(path) {
            return meta.permissions().mode() & 0o111 != 0;
        }
        false
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
