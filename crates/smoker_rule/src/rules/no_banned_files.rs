//! no-banned-files: Disallow sensitive files in the published package.
//!
//! # Configuration
//!
//! | Option | Type | Default | Description |
//! |--------|------|---------|-------------|
//! | allow | string[] | [] | Built-in names to permit |
//! | deny | string[] | [] | Additional file names to ban |

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::context::RuleContext;
use crate::error::RuleError;
use crate::rule::Rule;
use crate::rules::list_files;

const RULE_ID: &str = "no-banned-files";

/// File names that should never ship in a package.
const BANNED_FILES: &[&str] = &[
    ".env",
    ".npmrc",
    ".netrc",
    ".git-credentials",
    ".htpasswd",
    ".pgpass",
    ".bash_history",
    ".zsh_history",
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
    "credentials.json",
    "secret_token.rb",
    "wallet.dat",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl Config {
    fn banned(&self) -> BTreeSet<String> {
        BANNED_FILES
            .iter()
            .map(|name| (*name).to_string())
            .chain(self.deny.iter().cloned())
            .filter(|name| !self.allow.contains(name))
            .collect()
    }
}

pub struct NoBannedFiles;

#[async_trait]
impl Rule for NoBannedFiles {
    fn name(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Ensures banned files won't be published to the registry"
    }

    async fn check(
        &self,
        ctx: &RuleContext,
        opts: &Value,
        signal: &CancellationToken,
    ) -> Result<(), RuleError> {
        let config: Config = if opts.is_null() {
            Config::default()
        } else {
            serde_json::from_value(opts.clone())
                .map_err(|e| RuleError::InvalidOptions(e.to_string()))?
        };
        let banned = config.banned();

        for relative in list_files(ctx.install_path(), signal).await? {
            let name = relative.rsplit('/').next().unwrap_or(&relative);
            if banned.contains(name) {
                ctx.add_issue_with_data(
                    format!("Banned file found: {relative}"),
                    json!({ "filepath": relative }),
                );
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
    async fn test_clean_package() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), &json!({ "name": "ok" }), &["index.js"]);
        assert!(check(&NoBannedFiles, temp.path(), Value::Null).await.is_empty());
    }

    #[tokio::test]
    async fn test_reports_banned_file() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), &json!({ "name": "leaky" }), &["config/.npmrc"]);
        let messages = check(&NoBannedFiles, temp.path(), Value::Null).await;
        assert_eq!(messages, vec!["Banned file found: config/.npmrc".to_string()]);
    }

    #[tokio::test]
    async fn test_allow_and_deny() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            &json!({ "name": "custom" }),
            &[".env", "notes.txt"],
        );
        let messages = check(
            &NoBannedFiles,
            temp.path(),
            json!({ "allow": [".env"], "deny": ["notes.txt"] }),
        )
        .await;
        assert_eq!(messages, vec!["Banned file found: notes.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_ignores_node_modules() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            &json!({ "name": "deps" }),
            &["node_modules/dep/.npmrc"],
        );
        assert!(check(&NoBannedFiles, temp.path(), Value::Null).await.is_empty());
    }
}
