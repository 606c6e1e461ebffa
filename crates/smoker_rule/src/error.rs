//! Error type for rule checks.

use thiserror::Error;

/// A rule check that could not run to completion.
///
/// Reporting issues is not an error; this is for checks that break.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The check itself failed.
    #[error("{0}")]
    Check(String),

    /// The rule options did not match what the rule expects.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// I/O error while inspecting the package.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuleError {
    pub fn check(message: impl Into<String>) -> Self {
        Self::Check(message.into())
    }
}
