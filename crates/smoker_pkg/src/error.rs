//! Error types for package manager resolution and execution.

use std::fmt;

use thiserror::Error;

use crate::def::LifecycleStage;
use crate::spec::ParseError;
use crate::version::{QueryKind, classify_query};

/// A query that no known version, range or tag satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error, miette::Diagnostic)]
pub enum VersionError {
    /// Looks like an exact version, but it is not in the catalog.
    #[error("Unknown version: {0}")]
    #[diagnostic(code(smoker::version::unknown_version))]
    UnknownVersion(String),

    /// Parses as a range, but nothing in the catalog satisfies it.
    #[error("No known version satisfies range: {0}")]
    #[diagnostic(code(smoker::version::unknown_range))]
    UnknownRange(String),

    /// Neither a version nor a range, and not a known tag.
    #[error("Unknown dist-tag: {0}")]
    #[diagnostic(code(smoker::version::unknown_dist_tag))]
    UnknownDistTag(String),

    /// A version string in catalog data could not be parsed.
    #[error("Invalid version '{value}': {message}")]
    Invalid { value: String, message: String },
}

impl VersionError {
    /// Creates the "no match" error appropriate for the shape of `query`.
    pub fn unmatched(query: &str) -> Self {
        match classify_query(query) {
            QueryKind::Version => Self::UnknownVersion(query.to_string()),
            QueryKind::Range => Self::UnknownRange(query.to_string()),
            QueryKind::Tag => Self::UnknownDistTag(query.to_string()),
        }
    }
}

/// Errors produced while resolving a single package manager request.
#[derive(Debug, Clone, PartialEq, Eq, Error, miette::Diagnostic)]
pub enum ResolveError {
    /// No definition in the catalog handles this package manager.
    #[error("Unsupported package manager: {name}")]
    #[diagnostic(code(smoker::resolve::unsupported))]
    UnsupportedPackageManager { name: String },

    /// The requested version did not resolve.
    #[error("{name}: {source}")]
    #[diagnostic(code(smoker::resolve::version))]
    Version {
        name: String,
        #[source]
        source: VersionError,
    },

    /// The request string could not be parsed.
    #[error("Invalid package manager request: {0}")]
    #[diagnostic(code(smoker::resolve::parse))]
    Parse(#[from] ParseError),

    /// The binary was not found on the host.
    #[error("{bin} was not found in PATH")]
    #[diagnostic(code(smoker::resolve::system_not_found))]
    SystemNotFound { bin: String },

    /// The binary was found but reporting its version failed.
    #[error("Failed to query version of {bin}: {message}")]
    #[diagnostic(code(smoker::resolve::probe))]
    Probe { bin: String, message: String },
}

/// Invalid use of the catalog matcher.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum MatcherError {
    /// The catalog holds no package manager definitions at all.
    #[error("Invalid argument: no package manager definitions were provided")]
    #[diagnostic(code(smoker::matcher::invalid_argument))]
    NoDefinitions,
}

/// Failure of the injected executor itself (not a non-zero exit).
#[derive(Debug, Error)]
pub enum ExecError {
    /// The process could not be started.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process was killed because the run was aborted.
    #[error("`{command}` was aborted")]
    Aborted { command: String },
}

/// Errors raised by package manager adapters.
#[derive(Debug, Error)]
pub enum PkgManagerError {
    /// `pack` failed for a workspace.
    #[error("Failed to pack {pkg_name}: {message}")]
    Pack { pkg_name: String, message: String },

    /// `install` failed for a manifest.
    #[error("Failed to install {pkg_spec}: {message}")]
    Install { pkg_spec: String, message: String },

    /// The script runner misbehaved (as opposed to the script failing).
    #[error("Failed to run script \"{script}\" in {pkg_name}: {message}")]
    ScriptRunner {
        script: String,
        pkg_name: String,
        message: String,
    },

    /// A `setup` or `teardown` hook rejected.
    #[error("{stage} hook failed: {message}")]
    Lifecycle {
        stage: LifecycleStage,
        message: String,
    },

    /// The executor failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PkgManagerError {
    /// Creates a pack error.
    pub fn pack(pkg_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Pack {
            pkg_name: pkg_name.into(),
            message: message.to_string(),
        }
    }

    /// Creates an install error.
    pub fn install(pkg_spec: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Install {
            pkg_spec: pkg_spec.into(),
            message: message.to_string(),
        }
    }

    /// Creates a lifecycle error.
    pub fn lifecycle(stage: LifecycleStage, message: impl fmt::Display) -> Self {
        Self::Lifecycle {
            stage,
            message: message.to_string(),
        }
    }
}
