//! Terminal results of workers and runs.

use std::path::PathBuf;

use serde::Serialize;
use smoker_pkg::{PkgManagerSpec, RunScriptResult};
use smoker_rule::{LintResult, RuleFault};

use crate::error::AggregateError;

/// What one package manager worker produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PkgManagerOutcome {
    pub pkg_manager: PkgManagerSpec,
    pub lint: Vec<LintResult>,
    pub scripts: Vec<RunScriptResult>,
    /// Checks that broke; reported, never fatal.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rule_errors: Vec<RuleFault>,
    /// Temp directory kept on disk with `linger`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lingered: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AggregateError>,
    /// `true` when the phases did not run to completion because of an abort.
    pub aborted: bool,
}

impl PkgManagerOutcome {
    pub fn new(pkg_manager: PkgManagerSpec) -> Self {
        Self {
            pkg_manager,
            lint: Vec::new(),
            scripts: Vec::new(),
            rule_errors: Vec::new(),
            lingered: None,
            error: None,
            aborted: false,
        }
    }

    pub fn lint_failed(&self) -> bool {
        self.lint.iter().any(LintResult::is_failed)
    }

    pub fn scripts_failed(&self) -> bool {
        self.scripts.iter().any(RunScriptResult::is_failed)
    }

    /// `true` for any error, lint failure or script failure.
    pub fn has_failures(&self) -> bool {
        self.error.is_some() || self.lint_failed() || self.scripts_failed()
    }
}

/// The outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeResult {
    pub pkg_managers: Vec<PkgManagerOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AggregateError>,
    pub aborted: bool,
}

impl SmokeResult {
    /// `true` when the run should exit non-zero.
    pub fn has_failures(&self) -> bool {
        self.error.is_some()
            || self.aborted
            || self.pkg_managers.iter().any(PkgManagerOutcome::has_failures)
    }

    pub fn specs(&self) -> Vec<&PkgManagerSpec> {
        self.pkg_managers.iter().map(|o| &o.pkg_manager).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smoker_pkg::{RunScriptManifest, ScriptFailure, Version};
    use smoker_rule::{RuleIssue, RuleSeverity};

    fn outcome() -> PkgManagerOutcome {
        PkgManagerOutcome::new(PkgManagerSpec::new("npm", Version::new(9, 8, 1)))
    }

    #[test]
    fn test_clean_outcome_has_no_failures() {
        let result = SmokeResult {
            pkg_managers: vec![outcome()],
            error: None,
            aborted: false,
        };
        assert!(!result.has_failures());
    }

    #[test]
    fn test_warn_only_lint_is_not_a_failure() {
        let mut outcome = outcome();
        outcome.lint.push(LintResult::from_issues(
            "pkg",
            vec![RuleIssue::new("r", "pkg", "careful", RuleSeverity::Warn)],
        ));
        assert!(!outcome.has_failures());
    }

    #[test]
    fn test_failed_script_is_a_failure() {
        let mut outcome = outcome();
        outcome.scripts.push(RunScriptResult::Failed {
            manifest: RunScriptManifest {
                script: "test".to_string(),
                pkg_name: "pkg".to_string(),
                cwd: PathBuf::from("/tmp/pkg"),
                local_path: None,
            },
            output: None,
            error: ScriptFailure {
                message: "exit 1".to_string(),
                exit_code: Some(1),
            },
        });
        assert!(outcome.has_failures());
    }

    #[test]
    fn test_aborted_run_is_a_failure() {
        let result = SmokeResult {
            pkg_managers: Vec::new(),
            error: None,
            aborted: true,
        };
        assert!(result.has_failures());
    }
}
