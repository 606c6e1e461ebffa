//! The rule capability.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::context::RuleContext;
use crate::error::RuleError;
use crate::issue::RuleSeverity;

/// A lint check run against one installed package.
///
/// Checks report findings through [`RuleContext::add_issue`]. Returning an
/// error means the check broke, not that the package has a problem.
/// Long-running checks should stop early when `signal` is cancelled.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Rule id, as used in configuration.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Severity used when configuration does not set one.
    fn default_severity(&self) -> RuleSeverity {
        RuleSeverity::Error
    }

    async fn check(
        &self,
        ctx: &RuleContext,
        opts: &Value,
        signal: &CancellationToken,
    ) -> Result<(), RuleError>;
}

/// A rule enabled for a run with its effective severity and options.
#[derive(Clone)]
pub struct PlannedRule {
    pub rule: Arc<dyn Rule>,
    pub severity: RuleSeverity,
    pub opts: Value,
}

impl PlannedRule {
    pub fn new(rule: Arc<dyn Rule>, severity: RuleSeverity, opts: Value) -> Self {
        Self {
            rule,
            severity,
            opts,
        }
    }

    /// Plans `rule` with its default severity and no options.
    pub fn with_defaults(rule: Arc<dyn Rule>) -> Self {
        let severity = rule.default_severity();
        Self::new(rule, severity, Value::Null)
    }

    pub fn id(&self) -> &str {
        self.rule.name()
    }
}

impl fmt::Debug for PlannedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannedRule")
            .field("rule", &self.rule.name())
            .field("severity", &self.severity)
            .field("opts", &self.opts)
            .finish()
    }
}
