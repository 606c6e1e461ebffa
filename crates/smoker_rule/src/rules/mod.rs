//! Built-in rules.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::RuleError;
use crate::rule::Rule;

mod no_banned_files;
mod no_missing_entry_point;
mod no_missing_exports;
mod no_missing_pkg_files;

pub use no_banned_files::NoBannedFiles;
pub use no_missing_entry_point::NoMissingEntryPoint;
pub use no_missing_exports::NoMissingExports;
pub use no_missing_pkg_files::NoMissingPkgFiles;

/// Every built-in rule, in listing order.
pub fn builtin_rules() -> Vec<Arc<dyn Rule>> {
    vec![
        Arc::new(NoBannedFiles),
        Arc::new(NoMissingPkgFiles),
        Arc::new(NoMissingEntryPoint),
        Arc::new(NoMissingExports),
    ]
}

/// Joins a `package.json` relative path onto the install directory.
///
/// Returns `None` for paths escaping the package.
pub(crate) fn package_path(install_path: &Path, relative: &str) -> Option<PathBuf> {
    let mut out = install_path.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => out.push(part),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Lists package files as `/`-separated paths relative to `root`, in
/// file-name order, skipping `node_modules`.
///
/// The walk runs on the blocking thread pool and stops early once `signal`
/// fires.
pub(crate) async fn list_files(
    root: &Path,
    signal: &CancellationToken,
) -> Result<Vec<String>, RuleError> {
    let root = root.to_path_buf();
    let signal = signal.clone();
    tokio::task::spawn_blocking(move || {
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != "node_modules");

        let mut files = Vec::new();
        for entry in walker {
            if signal.is_cancelled() {
                break;
            }
            let entry = entry.map_err(|e| RuleError::check(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&root) {
                files.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(files)
    })
    .await
    .map_err(|e| RuleError::check(format!("listing package files failed: {e}")))?
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::Value;
    use tokio_util::sync::CancellationToken;

    use crate::context::{PackageUnderTest, RuleContext};
    use crate::issue::{RuleIssue, RuleSeverity};
    use crate::rule::Rule;

    /// Writes `package.json` plus `files` into `dir`.
    pub fn write_package(dir: &Path, pkg_json: &Value, files: &[&str]) {
        std::fs::write(dir.join("package.json"), pkg_json.to_string()).unwrap();
        for file in files {
            let path = dir.join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, "").unwrap();
        }
    }

    /// Runs one rule against `dir` and returns its issue messages.
    pub async fn check(rule: &dyn Rule, dir: &Path, opts: Value) -> Vec<String> {
        let pkg = Arc::new(PackageUnderTest::load(dir).unwrap());
        let issues: Arc<Mutex<Vec<RuleIssue>>> = Arc::new(Mutex::new(Vec::new()));
        let signal = CancellationToken::new();
        let ctx = RuleContext::new(
            pkg,
            rule.name(),
            RuleSeverity::Error,
            Arc::clone(&issues),
            signal.clone(),
        );
        rule.check(&ctx, &opts, &signal).await.unwrap();
        let issues = issues.lock();
        issues.iter().map(|i| i.message.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_rule_names_are_unique() {
        let rules = builtin_rules();
        let mut names: Vec<&str> = rules.iter().map(|r| r.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), rules.len());
    }

    #[tokio::test]
    async fn test_list_files_skips_node_modules() {
        let temp = tempfile::TempDir::new().unwrap();
        test_support::write_package(
            temp.path(),
            &serde_json::json!({ "name": "x" }),
            &["lib/b.js", "a.js", "node_modules/dep/index.js"],
        );

        let files = list_files(temp.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(files, vec!["a.js", "lib/b.js", "package.json"]);
    }

    #[tokio::test]
    async fn test_list_files_stops_when_cancelled() {
        let temp = tempfile::TempDir::new().unwrap();
        test_support::write_package(temp.path(), &serde_json::json!({ "name": "x" }), &["a.js"]);
        let signal = CancellationToken::new();
        signal.cancel();

        let files = list_files(temp.path(), &signal).await.unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_package_path_rejects_escape() {
        let root = Path::new("/pkg");
        assert_eq!(
            package_path(root, "./lib/index.js"),
            Some(PathBuf::from("/pkg/lib/index.js"))
        );
        assert_eq!(package_path(root, "../outside.js"), None);
    }
}
