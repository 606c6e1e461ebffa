//! Lint issues and per-package lint results.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

static NEXT_ISSUE_ID: AtomicU64 = AtomicU64::new(1);

/// Severity configured for a rule.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    /// Fails the package.
    #[default]
    Error,
    /// Reported, but does not fail the package.
    Warn,
    /// Rule disabled.
    Off,
}

impl RuleSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "off" => Ok(Self::Off),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// One finding reported by a rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleIssue {
    /// Unique and increasing in creation order.
    pub id: u64,
    pub rule_id: String,
    pub pkg_name: String,
    pub message: String,
    pub severity: RuleSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Message of the error that produced this issue, for broken checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl RuleIssue {
    /// Creates an issue with a fresh id.
    pub fn new(
        rule_id: impl Into<String>,
        pkg_name: impl Into<String>,
        message: impl Into<String>,
        severity: RuleSeverity,
    ) -> Self {
        Self {
            id: NEXT_ISSUE_ID.fetch_add(1, Ordering::Relaxed),
            rule_id: rule_id.into(),
            pkg_name: pkg_name.into(),
            message: message.into(),
            severity,
            data: None,
            cause: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// `true` for `error` severity.
    pub fn failed(&self) -> bool {
        self.severity == RuleSeverity::Error
    }
}

/// Lint outcome for one installed package.
///
/// A package fails only when it has at least one `error` issue. Warnings
/// alone leave it `Ok`, and are still carried for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LintResult {
    #[serde(rename_all = "camelCase")]
    Ok {
        pkg_name: String,
        warnings: Vec<RuleIssue>,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        pkg_name: String,
        issues: Vec<RuleIssue>,
    },
}

impl LintResult {
    /// Builds the result for `pkg_name`, sorting issues by id.
    pub fn from_issues(pkg_name: impl Into<String>, mut issues: Vec<RuleIssue>) -> Self {
        let pkg_name = pkg_name.into();
        issues.sort_by_key(|issue| issue.id);
        if issues.iter().any(RuleIssue::failed) {
            Self::Failed { pkg_name, issues }
        } else {
            Self::Ok {
                pkg_name,
                warnings: issues,
            }
        }
    }

    pub fn pkg_name(&self) -> &str {
        match self {
            Self::Ok { pkg_name, .. } | Self::Failed { pkg_name, .. } => pkg_name,
        }
    }

    pub fn issues(&self) -> &[RuleIssue] {
        match self {
            Self::Ok { warnings, .. } => warnings,
            Self::Failed { issues, .. } => issues,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
