//! # smoker_rule
//!
//! Lint rules that run against an installed package.
//!
//! A [`Rule`] inspects one installed package through a [`RuleContext`] and
//! reports [`RuleIssue`]s. The [`RuleRunner`] executes a plan of enabled
//! rules concurrently and folds their issues into a [`LintResult`].

pub mod context;
pub mod error;
pub mod issue;
pub mod rule;
pub mod rules;
pub mod runner;

pub use context::{PackageUnderTest, RuleContext};
pub use error::RuleError;
pub use issue::{LintResult, RuleIssue, RuleSeverity};
pub use rule::{PlannedRule, Rule};
pub use runner::{CheckOutcome, CheckStatus, RuleEvent, RuleFault, RuleRunner, RunnerOutput};
pub use rules::builtin_rules;
