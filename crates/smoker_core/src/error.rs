//! Error types for smoke runs.
//!
//! Setup problems surface as [`SmokerError`] and stop a run before it
//! starts. Everything that goes wrong once workers are running is collected
//! as [`ComponentError`]s inside an [`AggregateError`].

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use smoker_pkg::{LifecycleStage, MatcherError, UnsupportedPkgManager, WorkspaceError};
use thiserror::Error;

/// Configuration loading or validation failed.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    #[diagnostic(code(smoker::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    #[diagnostic(code(smoker::config::parse))]
    Parse(String),

    #[error("Config validation failed: {0}")]
    #[diagnostic(code(smoker::config::validation))]
    Validation(String),

    #[error("Invalid config: {0}")]
    #[diagnostic(code(smoker::config::invalid))]
    Invalid(String),
}

/// Which reporter hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReporterStage {
    Setup,
    Event,
    Teardown,
}

impl fmt::Display for ReporterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Event => f.write_str("event"),
            Self::Teardown => f.write_str("teardown"),
        }
    }
}

/// A reporter hook or event handler failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("Reporter \"{reporter}\" failed during {stage}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct ReporterError {
    pub reporter: String,
    pub stage: ReporterStage,
    pub message: String,
}

/// A fault captured by a worker, reporter sink or the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", rename_all_fields = "camelCase")]
pub enum ComponentError {
    #[error("[{pkg_manager}] Failed to create temp directory: {message}")]
    #[serde(rename = "ESMOKER_TEMPDIR")]
    TempDir { pkg_manager: String, message: String },

    #[error("[{pkg_manager}] {stage} hook failed: {message}")]
    #[serde(rename = "ESMOKER_LIFECYCLE")]
    Lifecycle {
        pkg_manager: String,
        stage: LifecycleStage,
        message: String,
    },

    #[error("[{pkg_manager}] Failed to pack {pkg_name}: {message}")]
    #[serde(rename = "ESMOKER_PACK")]
    Pack {
        pkg_manager: String,
        pkg_name: String,
        message: String,
    },

    #[error("[{pkg_manager}] Failed to install {pkg_spec}: {message}")]
    #[serde(rename = "ESMOKER_INSTALL")]
    Install {
        pkg_manager: String,
        pkg_spec: String,
        message: String,
    },

    #[error("[{pkg_manager}] Script runner failed for \"{script}\" in {pkg_name}: {message}")]
    #[serde(rename = "ESMOKER_SCRIPTRUNNER")]
    ScriptRunner {
        pkg_manager: String,
        script: String,
        pkg_name: String,
        message: String,
    },

    #[error("[{pkg_manager}] Failed to prune {}: {message}", .path.display())]
    #[serde(rename = "ESMOKER_CLEANUP")]
    Cleanup {
        pkg_manager: String,
        path: PathBuf,
        message: String,
    },

    #[error(transparent)]
    #[serde(rename = "ESMOKER_REPORTER")]
    Reporter(ReporterError),

    #[error("{component} panicked: {message}")]
    #[serde(rename = "ESMOKER_PANIC")]
    Panic { component: String, message: String },

    #[error(transparent)]
    #[serde(rename = "ESMOKER_AGGREGATE")]
    Aggregate(Box<AggregateError>),
}

impl ComponentError {
    /// Stable machine-readable tag.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TempDir { .. } => "ESMOKER_TEMPDIR",
            Self::Lifecycle { .. } => "ESMOKER_LIFECYCLE",
            Self::Pack { .. } => "ESMOKER_PACK",
            Self::Install { .. } => "ESMOKER_INSTALL",
            Self::ScriptRunner { .. } => "ESMOKER_SCRIPTRUNNER",
            Self::Cleanup { .. } => "ESMOKER_CLEANUP",
            Self::Reporter(_) => "ESMOKER_REPORTER",
            Self::Panic { .. } => "ESMOKER_PANIC",
            Self::Aggregate(_) => "ESMOKER_AGGREGATE",
        }
    }
}

impl From<ReporterError> for ComponentError {
    fn from(err: ReporterError) -> Self {
        Self::Reporter(err)
    }
}

impl From<AggregateError> for ComponentError {
    fn from(err: AggregateError) -> Self {
        Self::Aggregate(Box::new(err))
    }
}

/// Where an [`AggregateError`] was collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AggregateCause {
    /// One package manager worker.
    Worker { pkg_manager: String },
    /// Reporter sinks.
    Reporter,
    /// The run as a whole.
    Smoke,
}

impl fmt::Display for AggregateCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Worker { pkg_manager } => write!(f, "smoke testing with {pkg_manager}"),
            Self::Reporter => f.write_str("reporting"),
            Self::Smoke => f.write_str("smoke testing"),
        }
    }
}

/// Ordered collection of faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateError {
    pub cause: AggregateCause,
    pub errors: Vec<ComponentError>,
}

impl AggregateError {
    pub fn new(cause: AggregateCause, errors: Vec<ComponentError>) -> Self {
        Self { cause, errors }
    }

    /// Every leaf fault, with nested aggregates expanded in order.
    pub fn flatten(&self) -> Vec<&ComponentError> {
        let mut out = Vec::new();
        for err in &self.errors {
            match err {
                ComponentError::Aggregate(inner) => out.extend(inner.flatten()),
                other => out.push(other),
            }
        }
        out
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let leaves = self.flatten();
        write!(
            f,
            "{} error(s) occurred while {}",
            leaves.len(),
            self.cause
        )?;
        for err in leaves {
            write!(f, "\n  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// A run could not start.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum SmokerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Matcher(#[from] MatcherError),

    #[error("Unsupported package manager(s): {}", format_unsupported(.0))]
    #[diagnostic(
        code(smoker::unsupported_pkg_manager),
        help("Check the requested versions, or use `name@system` to test the one on PATH")
    )]
    Unsupported(Vec<UnsupportedPkgManager>),

    #[error("Unknown rule: {0}")]
    #[diagnostic(code(smoker::unknown_rule), help("Run `smoker list rules` to see available rules"))]
    UnknownRule(String),

    #[error("Unknown reporter: {0}")]
    #[diagnostic(
        code(smoker::unknown_reporter),
        help("Run `smoker list reporters` to see available reporters")
    )]
    UnknownReporter(String),

    #[error("Unknown plugin: {0}")]
    #[diagnostic(code(smoker::unknown_plugin))]
    UnknownPlugin(String),

    #[error("Nothing to do: linting is disabled and no scripts were requested")]
    #[diagnostic(code(smoker::nothing_to_do))]
    NothingToDo,
}

fn format_unsupported(list: &[UnsupportedPkgManager]) -> String {
    list.iter()
        .map(|u| format!("{} ({})", u.requested, u.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pack_error(pkg: &str) -> ComponentError {
        ComponentError::Pack {
            pkg_manager: "npm@9.8.1".to_string(),
            pkg_name: pkg.to_string(),
            message: "exit 1".to_string(),
        }
    }

    #[test]
    fn test_code_matches_serialized_tag() {
        let err = pack_error("a");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], err.code());
        assert_eq!(json["pkgName"], "a");
    }

    #[test]
    fn test_flatten_nested_aggregates() {
        let worker = AggregateError::new(
            AggregateCause::Worker {
                pkg_manager: "npm@9.8.1".to_string(),
            },
            vec![pack_error("a"), pack_error("b")],
        );
        let reporter = ComponentError::from(ReporterError {
            reporter: "console".to_string(),
            stage: ReporterStage::Teardown,
            message: "closed".to_string(),
        });
        let top = AggregateError::new(AggregateCause::Smoke, vec![worker.into(), reporter]);

        let codes: Vec<&str> = top.flatten().iter().map(|e| e.code()).collect();
        assert_eq!(codes, vec!["ESMOKER_PACK", "ESMOKER_PACK", "ESMOKER_REPORTER"]);
        assert!(top.to_string().starts_with("3 error(s) occurred while smoke testing"));
    }
}
