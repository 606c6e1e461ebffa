//! The view of an installed package that a rule check receives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::issue::{RuleIssue, RuleSeverity};

/// An installed package under lint.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageUnderTest {
    pub pkg_name: String,
    pub pkg_json: Value,
    pub pkg_json_path: PathBuf,
    /// Directory the package was installed to.
    pub install_path: PathBuf,
}

impl PackageUnderTest {
    /// Reads `package.json` from an install directory.
    pub fn load(install_path: &Path) -> std::io::Result<Self> {
        let pkg_json_path = install_path.join("package.json");
        let content = std::fs::read_to_string(&pkg_json_path)?;
        let pkg_json: Value = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let pkg_name = pkg_json
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            pkg_name,
            pkg_json,
            pkg_json_path,
            install_path: install_path.to_path_buf(),
        })
    }

    /// Same as [`load`](Self::load), run on the blocking thread pool.
    pub async fn read(install_path: PathBuf) -> std::io::Result<Self> {
        tokio::task::spawn_blocking(move || Self::load(&install_path))
            .await
            .map_err(std::io::Error::other)?
    }
}

/// Read-only package view plus an issue sink, bound to one rule.
///
/// Issues added after cancellation, or for a rule configured `off`, are
/// dropped.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pkg: Arc<PackageUnderTest>,
    rule_id: String,
    severity: RuleSeverity,
    issues: Arc<Mutex<Vec<RuleIssue>>>,
    signal: CancellationToken,
}

impl RuleContext {
    pub fn new(
        pkg: Arc<PackageUnderTest>,
        rule_id: impl Into<String>,
        severity: RuleSeverity,
        issues: Arc<Mutex<Vec<RuleIssue>>>,
        signal: CancellationToken,
    ) -> Self {
        Self {
            pkg,
            rule_id: rule_id.into(),
            severity,
            issues,
            signal,
        }
    }

    pub fn pkg_name(&self) -> &str {
        &self.pkg.pkg_name
    }

    pub fn pkg_json(&self) -> &Value {
        &self.pkg.pkg_json
    }

    pub fn pkg_json_path(&self) -> &Path {
        &self.pkg.pkg_json_path
    }

    pub fn install_path(&self) -> &Path {
        &self.pkg.install_path
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn severity(&self) -> RuleSeverity {
        self.severity
    }

    /// Reports an issue at the rule's configured severity.
    pub fn add_issue(&self, message: impl Into<String>) {
        self.push(RuleIssue::new(
            &self.rule_id,
            self.pkg_name(),
            message,
            self.severity,
        ));
    }

    /// Reports an issue carrying structured data.
    pub fn add_issue_with_data(&self, message: impl Into<String>, data: Value) {
        self.push(
            RuleIssue::new(&self.rule_id, self.pkg_name(), message, self.severity).with_data(data),
        );
    }

    fn push(&self, issue: RuleIssue) {
        if self.severity == RuleSeverity::Off || self.signal.is_cancelled() {
            return;
        }
        self.issues.lock().push(issue);
    }
}
