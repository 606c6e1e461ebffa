//! Events emitted during a smoke run.
//!
//! Events are append-only records. Within one package manager, phase
//! events nest as `*_BEGIN`, per-item events, then `*_OK` or `*_FAILED`.

use std::path::PathBuf;

use serde::Serialize;
use smoker_pkg::{
    ExecOutput, InstallManifest, PkgManagerSpec, RunScriptManifest, RunScriptResult, ScriptFailure,
};
use smoker_rule::{LintResult, RuleFault, RuleIssue};

use crate::error::{AggregateError, ComponentError};
use crate::result::SmokeResult;

#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    SmokeBegin {
        pkg_managers: Vec<PkgManagerSpec>,
        workspaces: Vec<String>,
        scripts: Vec<String>,
        lint: bool,
    },

    PkgManagerBegin {
        pkg_manager: PkgManagerSpec,
    },

    PkgManagerPackBegin {
        pkg_manager: PkgManagerSpec,
        total: usize,
    },
    PackBegin {
        pkg_manager: PkgManagerSpec,
        pkg_name: String,
        local_path: PathBuf,
    },
    PackOk {
        pkg_manager: PkgManagerSpec,
        manifest: InstallManifest,
    },
    PackFailed {
        pkg_manager: PkgManagerSpec,
        pkg_name: String,
        error: ComponentError,
    },
    PkgManagerPackOk {
        pkg_manager: PkgManagerSpec,
        manifests: Vec<InstallManifest>,
    },
    PkgManagerPackFailed {
        pkg_manager: PkgManagerSpec,
        errors: Vec<ComponentError>,
    },

    PkgManagerInstallBegin {
        pkg_manager: PkgManagerSpec,
        total: usize,
    },
    InstallBegin {
        pkg_manager: PkgManagerSpec,
        manifest: InstallManifest,
    },
    InstallOk {
        pkg_manager: PkgManagerSpec,
        manifest: InstallManifest,
        output: ExecOutput,
    },
    InstallFailed {
        pkg_manager: PkgManagerSpec,
        manifest: InstallManifest,
        error: ComponentError,
    },
    PkgManagerInstallOk {
        pkg_manager: PkgManagerSpec,
        manifests: Vec<InstallManifest>,
    },
    PkgManagerInstallFailed {
        pkg_manager: PkgManagerSpec,
        errors: Vec<ComponentError>,
    },

    PkgManagerLintBegin {
        pkg_manager: PkgManagerSpec,
        total_rules: usize,
        total_pkgs: usize,
    },
    RuleBegin {
        pkg_manager: PkgManagerSpec,
        rule: String,
        pkg_name: String,
    },
    RuleOk {
        pkg_manager: PkgManagerSpec,
        rule: String,
        pkg_name: String,
        warnings: Vec<RuleIssue>,
    },
    RuleFailed {
        pkg_manager: PkgManagerSpec,
        rule: String,
        pkg_name: String,
        issues: Vec<RuleIssue>,
    },
    RuleError {
        pkg_manager: PkgManagerSpec,
        rule: String,
        pkg_name: String,
        error: RuleFault,
    },
    PkgManagerLintOk {
        pkg_manager: PkgManagerSpec,
        results: Vec<LintResult>,
    },
    PkgManagerLintFailed {
        pkg_manager: PkgManagerSpec,
        results: Vec<LintResult>,
    },

    PkgManagerRunScriptsBegin {
        pkg_manager: PkgManagerSpec,
        total: usize,
    },
    RunScriptBegin {
        pkg_manager: PkgManagerSpec,
        manifest: RunScriptManifest,
    },
    RunScriptOk {
        pkg_manager: PkgManagerSpec,
        manifest: RunScriptManifest,
        output: ExecOutput,
    },
    RunScriptFailed {
        pkg_manager: PkgManagerSpec,
        manifest: RunScriptManifest,
        error: ScriptFailure,
    },
    RunScriptSkipped {
        pkg_manager: PkgManagerSpec,
        manifest: RunScriptManifest,
    },
    RunScriptError {
        pkg_manager: PkgManagerSpec,
        manifest: RunScriptManifest,
        error: ComponentError,
    },
    PkgManagerRunScriptsOk {
        pkg_manager: PkgManagerSpec,
        results: Vec<RunScriptResult>,
    },
    PkgManagerRunScriptsFailed {
        pkg_manager: PkgManagerSpec,
        results: Vec<RunScriptResult>,
    },

    Lingered {
        pkg_manager: PkgManagerSpec,
        directory: PathBuf,
    },
    PkgManagerEnd {
        pkg_manager: PkgManagerSpec,
        aborted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<AggregateError>,
    },

    SmokeOk {
        result: SmokeResult,
    },
    SmokeFailed {
        result: SmokeResult,
    },
    Aborted {
        result: SmokeResult,
    },
}

impl Event {
    /// The serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SmokeBegin { .. } => "SMOKE_BEGIN",
            Self::PkgManagerBegin { .. } => "PKG_MANAGER_BEGIN",
            Self::PkgManagerPackBegin { .. } => "PKG_MANAGER_PACK_BEGIN",
            Self::PackBegin { .. } => "PACK_BEGIN",
            Self::PackOk { .. } => "PACK_OK",
            Self::PackFailed { .. } => "PACK_FAILED",
            Self::PkgManagerPackOk { .. } => "PKG_MANAGER_PACK_OK",
            Self::PkgManagerPackFailed { .. } => "PKG_MANAGER_PACK_FAILED",
            Self::PkgManagerInstallBegin { .. } => "PKG_MANAGER_INSTALL_BEGIN",
            Self::InstallBegin { .. } => "INSTALL_BEGIN",
            Self::InstallOk { .. } => "INSTALL_OK",
            Self::InstallFailed { .. } => "INSTALL_FAILED",
            Self::PkgManagerInstallOk { .. } => "PKG_MANAGER_INSTALL_OK",
            Self::PkgManagerInstallFailed { .. } => "PKG_MANAGER_INSTALL_FAILED",
            Self::PkgManagerLintBegin { .. } => "PKG_MANAGER_LINT_BEGIN",
            Self::RuleBegin { .. } => "RULE_BEGIN",
            Self::RuleOk { .. } => "RULE_OK",
            Self::RuleFailed { .. } => "RULE_FAILED",
            Self::RuleError { .. } => "RULE_ERROR",
            Self::PkgManagerLintOk { .. } => "PKG_MANAGER_LINT_OK",
            Self::PkgManagerLintFailed { .. } => "PKG_MANAGER_LINT_FAILED",
            Self::PkgManagerRunScriptsBegin { .. } => "PKG_MANAGER_RUN_SCRIPTS_BEGIN",
            Self::RunScriptBegin { .. } => "RUN_SCRIPT_BEGIN",
            Self::RunScriptOk { .. } => "RUN_SCRIPT_OK",
            Self::RunScriptFailed { .. } => "RUN_SCRIPT_FAILED",
            Self::RunScriptSkipped { .. } => "RUN_SCRIPT_SKIPPED",
            Self::RunScriptError { .. } => "RUN_SCRIPT_ERROR",
            Self::PkgManagerRunScriptsOk { .. } => "PKG_MANAGER_RUN_SCRIPTS_OK",
            Self::PkgManagerRunScriptsFailed { .. } => "PKG_MANAGER_RUN_SCRIPTS_FAILED",
            Self::Lingered { .. } => "LINGERED",
            Self::PkgManagerEnd { .. } => "PKG_MANAGER_END",
            Self::SmokeOk { .. } => "SMOKE_OK",
            Self::SmokeFailed { .. } => "SMOKE_FAILED",
            Self::Aborted { .. } => "ABORTED",
        }
    }

    /// The package manager this event belongs to, if any.
    pub fn pkg_manager(&self) -> Option<&PkgManagerSpec> {
        match self {
            Self::SmokeBegin { .. }
            | Self::SmokeOk { .. }
            | Self::SmokeFailed { .. }
            | Self::Aborted { .. } => None,
            Self::PkgManagerBegin { pkg_manager }
            | Self::PkgManagerPackBegin { pkg_manager, .. }
            | Self::PackBegin { pkg_manager, .. }
            | Self::PackOk { pkg_manager, .. }
            | Self::PackFailed { pkg_manager, .. }
            | Self::PkgManagerPackOk { pkg_manager, .. }
            | Self::PkgManagerPackFailed { pkg_manager, .. }
            | Self::PkgManagerInstallBegin { pkg_manager, .. }
            | Self::InstallBegin { pkg_manager, .. }
            | Self::InstallOk { pkg_manager, .. }
            | Self::InstallFailed { pkg_manager, .. }
            | Self::PkgManagerInstallOk { pkg_manager, .. }
            | Self::PkgManagerInstallFailed { pkg_manager, .. }
            | Self::PkgManagerLintBegin { pkg_manager, .. }
            | Self::RuleBegin { pkg_manager, .. }
            | Self::RuleOk { pkg_manager, .. }
            | Self::RuleFailed { pkg_manager, .. }
            | Self::RuleError { pkg_manager, .. }
            | Self::PkgManagerLintOk { pkg_manager, .. }
            | Self::PkgManagerLintFailed { pkg_manager, .. }
            | Self::PkgManagerRunScriptsBegin { pkg_manager, .. }
            | Self::RunScriptBegin { pkg_manager, .. }
            | Self::RunScriptOk { pkg_manager, .. }
            | Self::RunScriptFailed { pkg_manager, .. }
            | Self::RunScriptSkipped { pkg_manager, .. }
            | Self::RunScriptError { pkg_manager, .. }
            | Self::PkgManagerRunScriptsOk { pkg_manager, .. }
            | Self::PkgManagerRunScriptsFailed { pkg_manager, .. }
            | Self::Lingered { pkg_manager, .. }
            | Self::PkgManagerEnd { pkg_manager, .. } => Some(pkg_manager),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smoker_pkg::Version;

    #[test]
    fn test_name_matches_serialized_tag() {
        let spec = PkgManagerSpec::new("npm", Version::new(9, 8, 1));
        let events = vec![
            Event::PkgManagerBegin {
                pkg_manager: spec.clone(),
            },
            Event::PkgManagerRunScriptsBegin {
                pkg_manager: spec.clone(),
                total: 2,
            },
            Event::PkgManagerEnd {
                pkg_manager: spec,
                aborted: false,
                error: None,
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }

    #[test]
    fn test_fields_are_camel_case() {
        let event = Event::PkgManagerLintBegin {
            pkg_manager: PkgManagerSpec::new("npm", Version::new(9, 8, 1)),
            total_rules: 4,
            total_pkgs: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["totalRules"], 4);
        assert_eq!(json["pkgManager"]["name"], "npm");
    }
}
