//! no-missing-entry-point: A CommonJS package's entry point must exist.
//!
//! Packages declaring `exports` are left to `no-missing-exports`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::context::RuleContext;
use crate::error::RuleError;
use crate::rule::Rule;
use crate::rules::package_path;

const RULE_ID: &str = "no-missing-entry-point";

const EXTENSIONS: &[&str] = &["js", "json", "node", "cjs"];

pub struct NoMissingEntryPoint;

/// Resolves `candidate` the way `require()` does for a file or directory.
fn resolve_entry(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    for ext in EXTENSIONS {
        let mut with_ext = candidate.as_os_str().to_owned();
        with_ext.push(".");
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    if candidate.is_dir() {
        return EXTENSIONS
            .iter()
            .map(|ext| candidate.join(format!("index.{ext}")))
            .find(|index| index.is_file());
    }
    None
}

#[async_trait]
impl Rule for NoMissingEntryPoint {
    fn name(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Checks that the package contains an entry point"
    }

    async fn check(
        &self,
        ctx: &RuleContext,
        _opts: &Value,
        _signal: &CancellationToken,
    ) -> Result<(), RuleError> {
        let pkg_json = ctx.pkg_json();
        if pkg_json.get("exports").is_some() {
            return Ok(());
        }

        let main = pkg_json.get("main").and_then(Value::as_str);
        let relative = main.unwrap_or("index.js");
        let resolved = package_path(ctx.install_path(), relative).and_then(|p| resolve_entry(&p));
        if resolved.is_none() {
            let message = match main {
                Some(main) => format!(
                    "No entry point found for package \"{}\"; file from field \"main\" unreadable: {}",
                    ctx.pkg_name(),
                    main
                ),
                None => format!(
                    "No entry point found for package \"{}\"; index.js unreadable",
                    ctx.pkg_name()
                ),
            };
            ctx.add_issue_with_data(message, json!({ "main": relative }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{check, write_package};
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case::default_index(json!({ "name": "x" }), &["index.js"][..])]
    #[case::explicit_main(json!({ "name": "x", "main": "lib/main.js" }), &["lib/main.js"][..])]
    #[case::extensionless(json!({ "name": "x", "main": "lib/main" }), &["lib/main.js"][..])]
    #[case::directory(json!({ "name": "x", "main": "lib" }), &["lib/index.js"][..])]
    #[case::has_exports(json!({ "name": "x", "exports": "./missing.js" }), &[][..])]
    #[tokio::test]
    async fn test_entry_point_found(#[case] pkg_json: Value, #[case] files: &[&str]) {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), &pkg_json, files);
        assert!(check(&NoMissingEntryPoint, temp.path(), Value::Null).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_main() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), &json!({ "name": "x", "main": "dist/index.js" }), &[]);
        let messages = check(&NoMissingEntryPoint, temp.path(), Value::Null).await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("dist/index.js"));
    }

    #[tokio::test]
    async fn test_missing_default_index() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), &json!({ "name": "x" }), &[]);
        let messages = check(&NoMissingEntryPoint, temp.path(), Value::Null).await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("index.js unreadable"));
    }
}
