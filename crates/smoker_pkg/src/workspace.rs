//! Workspace discovery.
//!
//! A single-package repository yields one entry for its root. A monorepo
//! declares `workspaces` glob patterns in its root `package.json`; those are
//! expanded against the directory tree and then filtered.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

pub const PACKAGE_JSON: &str = "package.json";

#[derive(Debug, Error, miette::Diagnostic)]
pub enum WorkspaceError {
    #[error("Failed to read {path}: {source}")]
    #[diagnostic(code(smoker::workspace::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {path}: {message}")]
    #[diagnostic(code(smoker::workspace::invalid))]
    Invalid { path: PathBuf, message: String },

    #[error("Invalid workspace pattern '{pattern}': {message}")]
    #[diagnostic(code(smoker::workspace::pattern))]
    Pattern { pattern: String, message: String },

    #[error("No workspace matches: {}", names.join(", "))]
    #[diagnostic(code(smoker::workspace::unknown))]
    Unknown { names: Vec<String> },

    #[error("No workspaces to smoke test in {}", root.display())]
    #[diagnostic(code(smoker::workspace::empty))]
    Empty { root: PathBuf },
}

/// A discovered package.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceInfo {
    pub pkg_name: String,
    pub local_path: PathBuf,
    pub pkg_json: Value,
    pub pkg_json_path: PathBuf,
    pub private: bool,
}

impl WorkspaceInfo {
    /// Reads the `package.json` in `dir`.
    pub fn load(dir: &Path) -> Result<Self, WorkspaceError> {
        let info = Self::load_unnamed(dir)?;
        if info.pkg_name.is_empty() {
            return Err(WorkspaceError::Invalid {
                path: info.pkg_json_path,
                message: "missing \"name\" field".to_string(),
            });
        }
        Ok(info)
    }

    /// Like [`WorkspaceInfo::load`], but a missing name falls back to the
    /// directory name. Monorepo roots often have no name.
    fn load_root(dir: &Path) -> Result<Self, WorkspaceError> {
        let mut info = Self::load_unnamed(dir)?;
        if info.pkg_name.is_empty() {
            info.pkg_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "root".to_string());
        }
        Ok(info)
    }

    fn load_unnamed(dir: &Path) -> Result<Self, WorkspaceError> {
        let pkg_json_path = dir.join(PACKAGE_JSON);
        let content = fs::read_to_string(&pkg_json_path).map_err(|source| WorkspaceError::Read {
            path: pkg_json_path.clone(),
            source,
        })?;
        let pkg_json: Value =
            serde_json::from_str(&content).map_err(|e| WorkspaceError::Invalid {
                path: pkg_json_path.clone(),
                message: e.to_string(),
            })?;
        if !pkg_json.is_object() {
            return Err(WorkspaceError::Invalid {
                path: pkg_json_path,
                message: "root must be an object".to_string(),
            });
        }

        let pkg_name = pkg_json
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let private = pkg_json
            .get("private")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            pkg_name,
            local_path: dir.to_path_buf(),
            pkg_json,
            pkg_json_path,
            private,
        })
    }

    /// The `packageManager` field, if present.
    pub fn package_manager(&self) -> Option<&str> {
        self.pkg_json.get("packageManager").and_then(Value::as_str)
    }

    /// The `workspaces` glob patterns, if present.
    pub fn workspace_patterns(&self) -> Vec<String> {
        let patterns = match self.pkg_json.get("workspaces") {
            Some(Value::Array(items)) => Some(items),
            Some(Value::Object(obj)) => obj.get("packages").and_then(Value::as_array),
            _ => None,
        };
        patterns
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Which workspaces to smoke test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceFilter {
    /// Every non-private workspace.
    pub all: bool,
    /// Also include the monorepo root.
    pub include_root: bool,
    /// Explicit workspace names or paths (relative to the root).
    pub workspaces: Vec<String>,
}

/// Discovers workspaces under `root`, unique by local path.
pub fn discover_workspaces(
    root: &Path,
    filter: &WorkspaceFilter,
) -> Result<Vec<WorkspaceInfo>, WorkspaceError> {
    let root_info = WorkspaceInfo::load_root(root)?;
    let patterns = root_info.workspace_patterns();

    if patterns.is_empty() {
        if !filter.workspaces.is_empty() {
            return Err(WorkspaceError::Unknown {
                names: filter.workspaces.clone(),
            });
        }
        debug!("Single-package project: {}", root_info.pkg_name);
        return Ok(vec![root_info]);
    }

    let members = expand_patterns(root, &patterns)?;
    debug!(
        "Found {} workspace(s) matching {:?}",
        members.len(),
        patterns
    );

    let mut selected: Vec<WorkspaceInfo> = Vec::new();
    if !filter.workspaces.is_empty() {
        let mut missing = Vec::new();
        for wanted in &filter.workspaces {
            match members.iter().find(|m| matches_request(root, m, wanted)) {
                Some(member) => selected.push(member.clone()),
                None => missing.push(wanted.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(WorkspaceError::Unknown { names: missing });
        }
    } else if filter.all {
        for member in &members {
            if member.private {
                debug!("Skipping private workspace {}", member.pkg_name);
                continue;
            }
            selected.push(member.clone());
        }
    }

    let root_only = !filter.all && filter.workspaces.is_empty();
    if filter.include_root || root_only {
        selected.insert(0, root_info);
    }

    let mut seen = HashSet::new();
    selected.retain(|ws| seen.insert(ws.local_path.clone()));

    if selected.is_empty() {
        return Err(WorkspaceError::Empty {
            root: root.to_path_buf(),
        });
    }
    Ok(selected)
}

fn matches_request(root: &Path, member: &WorkspaceInfo, wanted: &str) -> bool {
    if member.pkg_name == wanted {
        return true;
    }
    let wanted_path = Path::new(wanted);
    let candidate = if wanted_path.is_absolute() {
        normalize(wanted_path)
    } else {
        normalize(&root.join(wanted_path))
    };
    candidate == normalize(&member.local_path)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn build_globset(patterns: &[&str]) -> Result<Option<GlobSet>, WorkspaceError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| WorkspaceError::Pattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|e| WorkspaceError::Pattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })?;
    Ok(Some(set))
}

fn expand_patterns(root: &Path, patterns: &[String]) -> Result<Vec<WorkspaceInfo>, WorkspaceError> {
    let cleaned: Vec<String> = patterns
        .iter()
        .map(|p| {
            p.trim()
                .trim_start_matches("./")
                .trim_end_matches('/')
                .to_string()
        })
        .collect();

    let (negated, positive): (Vec<&String>, Vec<&String>) =
        cleaned.iter().partition(|p| p.starts_with('!'));
    let positive: Vec<&str> = positive.iter().map(|p| p.as_str()).collect();
    let negated: Vec<&str> = negated.iter().map(|p| &p[1..]).collect();

    let Some(include) = build_globset(&positive)? else {
        return Ok(Vec::new());
    };
    let exclude = build_globset(&negated)?;

    let max_depth = if positive.iter().any(|p| p.contains("**")) {
        usize::MAX
    } else {
        positive
            .iter()
            .map(|p| p.split('/').count())
            .max()
            .unwrap_or(1)
    };

    let mut members = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            e.file_type().is_dir() && name != "node_modules" && !name.starts_with('.')
        });

    for entry in walker.filter_map(|e| e.ok()) {
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if !include.is_match(&relative) {
            continue;
        }
        if let Some(ref exclude) = exclude
            && exclude.is_match(&relative)
        {
            continue;
        }
        if !entry.path().join(PACKAGE_JSON).is_file() {
            continue;
        }
        members.push(WorkspaceInfo::load(entry.path())?);
    }

    Ok(members)
}
