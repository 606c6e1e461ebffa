//! no-missing-exports: Every target in `exports` must exist and be well-formed.
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | types | boolean | true | `types` targets must be declaration files |
//! | require | boolean | true | `require` targets must not be ESM-only (`.mjs`) |
//! | import | boolean | true | `import` targets must not be CommonJS-only (`.cjs`) |
//! | order | boolean | true | `default` must be the last condition |
//! | glob | boolean | true | Subpath patterns must match at least one file |

use async_trait::async_trait;
use globset::GlobBuilder;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::context::RuleContext;
use crate::error::RuleError;
use crate::rule::Rule;
use crate::rules::{list_files, package_path};

const RULE_ID: &str = "no-missing-exports";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    types: bool,
    require: bool,
    import: bool,
    order: bool,
    glob: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            types: true,
            require: true,
            import: true,
            order: true,
            glob: true,
        }
    }
}

pub struct NoMissingExports;

struct Walker<'a> {
    ctx: &'a RuleContext,
    config: Config,
    /// Package files, listed only when a subpath pattern needs them.
    files: Vec<String>,
}

impl Walker<'_> {
    fn visit(&mut self, key: &str, value: &Value) -> Result<(), RuleError> {
        match value {
            Value::String(target) => self.check_target(key, target),
            Value::Array(fallbacks) => {
                for fallback in fallbacks {
                    self.visit(key, fallback)?;
                }
                Ok(())
            }
            Value::Object(conditions) => self.visit_object(key, conditions),
            _ => Ok(()),
        }
    }

    fn visit_object(&mut self, key: &str, conditions: &Map<String, Value>) -> Result<(), RuleError> {
        if self.config.order
            && let Some(pos) = conditions.keys().position(|k| k == "default")
            && pos + 1 != conditions.len()
        {
            self.ctx.add_issue_with_data(
                format!("Export {key} has a \"default\" condition that is not last"),
                json!({ "export": key }),
            );
        }

        for (condition, target) in conditions {
            let child_key = if condition.starts_with('.') {
                condition.clone()
            } else {
                format!("{key}[{condition}]")
            };

            if let Some(path) = target.as_str() {
                match condition.as_str() {
                    "types"
                        if self.config.types
                            && ![".d.ts", ".d.mts", ".d.cts"]
                                .iter()
                                .any(|ext| path.ends_with(ext)) =>
                    {
                        self.ctx.add_issue_with_data(
                            format!("Export {child_key} is not a declaration file: {path}"),
                            json!({ "export": child_key, "filepath": path }),
                        );
                    }
                    "require" if self.config.require && path.ends_with(".mjs") => {
                        self.ctx.add_issue_with_data(
                            format!("Export {child_key} points to an ES module: {path}"),
                            json!({ "export": child_key, "filepath": path }),
                        );
                    }
                    "import" if self.config.import && path.ends_with(".cjs") => {
                        self.ctx.add_issue_with_data(
                            format!("Export {child_key} points to a CommonJS module: {path}"),
                            json!({ "export": child_key, "filepath": path }),
                        );
                    }
                    _ => {}
                }
            }

            self.visit(&child_key, target)?;
        }
        Ok(())
    }

    fn check_target(&mut self, key: &str, target: &str) -> Result<(), RuleError> {
        if target.contains('*') {
            if !self.config.glob {
                return Ok(());
            }
            let pattern = target.trim_start_matches("./");
            let glob = GlobBuilder::new(pattern)
                .build()
                .map_err(|e| RuleError::check(format!("invalid export pattern {target}: {e}")))?
                .compile_matcher();
            if !self.files.iter().any(|file| glob.is_match(file)) {
                self.ctx.add_issue_with_data(
                    format!("Export {key} matches no files: {target}"),
                    json!({ "export": key, "filepath": target }),
                );
            }
            return Ok(());
        }

        let exists = package_path(self.ctx.install_path(), target).is_some_and(|p| p.is_file());
        if !exists {
            self.ctx.add_issue_with_data(
                format!("Export {key} points to a missing file: {target}"),
                json!({ "export": key, "filepath": target }),
            );
        }
        Ok(())
    }
}

/// Returns whether any export target is a subpath pattern.
fn has_pattern(value: &Value) -> bool {
    match value {
        Value::String(target) => target.contains('*'),
        Value::Array(items) => items.iter().any(has_pattern),
        Value::Object(map) => map.values().any(has_pattern),
        _ => false,
    }
}

#[async_trait]
impl Rule for NoMissingExports {
    fn name(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Checks that all export targets in package.json exist"
    }

    async fn check(
        &self,
        ctx: &RuleContext,
        opts: &Value,
        signal: &CancellationToken,
    ) -> Result<(), RuleError> {
        let Some(exports) = ctx.pkg_json().get("exports") else {
            return Ok(());
        };
        let config: Config = if opts.is_null() {
            Config::default()
        } else {
            serde_json::from_value(opts.clone())
                .map_err(|e| RuleError::InvalidOptions(e.to_string()))?
        };

        let files = if config.glob && has_pattern(exports) {
            list_files(ctx.install_path(), signal).await?
        } else {
            Vec::new()
        };
        let mut walker = Walker { ctx, config, files };
        walker.visit(".", exports)
    }
}
