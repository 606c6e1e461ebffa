//! no-missing-pkg-files: Files referenced by `package.json` fields must exist.
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | bin | boolean | true | Check the `bin` field |
//! | browser | boolean | true | Check the `browser` field (string form) |
//! | types | boolean | true | Check the `types` and `typings` fields |
//! | unpkg | boolean | true | Check the `unpkg` field |
//! | module | boolean | true | Check the `module` field |
//! | fields | string[] | [] | Additional top-level fields to check |

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::context::RuleContext;
use crate::error::RuleError;
use crate::rule::Rule;
use crate::rules::package_path;

const RULE_ID: &str = "no-missing-pkg-files";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    bin: bool,
    browser: bool,
    types: bool,
    unpkg: bool,
    module: bool,
    fields: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bin: true,
            browser: true,
            types: true,
            unpkg: true,
            module: true,
            fields: Vec::new(),
        }
    }
}

impl Config {
    fn fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        if self.browser {
            fields.push("browser".to_string());
        }
        if self.types {
            fields.push("types".to_string());
            fields.push("typings".to_string());
        }
        if self.unpkg {
            fields.push("unpkg".to_string());
        }
        if self.module {
            fields.push("module".to_string());
        }
        fields.extend(self.fields.iter().cloned());
        fields
    }
}

pub struct NoMissingPkgFiles;

impl NoMissingPkgFiles {
    fn check_file(ctx: &RuleContext, field: &str, relative: &str) {
        let exists = package_path(ctx.install_path(), relative).is_some_and(|p| p.is_file());
        if !exists {
            ctx.add_issue_with_data(
                format!("File {relative} from field \"{field}\" does not exist"),
                json!({ "field": field, "filepath": relative }),
            );
        }
    }
}

#[async_trait]
impl Rule for NoMissingPkgFiles {
    fn name(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Checks that files referenced in package.json exist in the tarball"
    }

    async fn check(
        &self,
        ctx: &RuleContext,
        opts: &Value,
        _signal: &CancellationToken,
    ) -> Result<(), RuleError> {
        let config: Config = if opts.is_null() {
            Config::default()
        } else {
            serde_json::from_value(opts.clone())
                .map_err(|e| RuleError::InvalidOptions(e.to_string()))?
        };
        let pkg_json = ctx.pkg_json();

        if config.bin {
            match pkg_json.get("bin") {
                Some(Value::String(path)) => Self::check_file(ctx, "bin", path),
                Some(Value::Object(bins)) => {
                    for (name, path) in bins {
                        if let Some(path) = path.as_str() {
                            Self::check_file(ctx, &format!("bin.{name}"), path);
                        }
                    }
                }
                _ => {}
            }
        }

        for field in config.fields() {
            if let Some(path) = pkg_json.get(&field).and_then(Value::as_str) {
                Self::check_file(ctx, &field, path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{check, write_package};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_all_present() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            &json!({ "name": "ok", "bin": { "ok": "./cli.js" }, "types": "index.d.ts" }),
            &["cli.js", "index.d.ts"],
        );
        assert!(check(&NoMissingPkgFiles, temp.path(), Value::Null).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_bin_and_types() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            &json!({ "name": "bad", "bin": "cli.js", "types": "index.d.ts" }),
            &[],
        );
        let messages = check(&NoMissingPkgFiles, temp.path(), Value::Null).await;
        assert_eq!(
            messages,
            vec![
                "File cli.js from field \"bin\" does not exist".to_string(),
                "File index.d.ts from field \"types\" does not exist".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_disabled_field() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            &json!({ "name": "bad", "bin": "cli.js" }),
            &[],
        );
        let messages = check(&NoMissingPkgFiles, temp.path(), json!({ "bin": false })).await;
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_custom_field() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            &json!({ "name": "x", "style": "dist/style.css" }),
            &[],
        );
        let messages =
            check(&NoMissingPkgFiles, temp.path(), json!({ "fields": ["style"] })).await;
        assert_eq!(messages.len(), 1);
    }
}
