//! Concurrent execution of a rule plan against one package.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::{PackageUnderTest, RuleContext};
use crate::error::RuleError;
use crate::issue::{LintResult, RuleIssue, RuleSeverity};
use crate::rule::PlannedRule;

/// A check that broke instead of reporting issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFault {
    pub rule_id: String,
    pub pkg_name: String,
    pub message: String,
}

/// Progress notifications, in completion order.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleEvent {
    Begin {
        rule_id: String,
        pkg_name: String,
    },
    Ok {
        rule_id: String,
        pkg_name: String,
        warnings: Vec<RuleIssue>,
    },
    Failed {
        rule_id: String,
        pkg_name: String,
        issues: Vec<RuleIssue>,
    },
    Error {
        rule_id: String,
        pkg_name: String,
        fault: RuleFault,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckStatus {
    /// No `error` issues; warnings may be present.
    Ok,
    /// At least one `error` issue.
    Failed,
    /// The check broke.
    Error(RuleFault),
}

/// Result of one finished check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub rule_id: String,
    pub status: CheckStatus,
    pub issues: Vec<RuleIssue>,
}

/// Terminal output of one runner pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerOutput {
    pub pkg_name: String,
    /// Finished checks, in completion order.
    pub results: Vec<CheckOutcome>,
    /// `true` when cancellation cut the pass short.
    pub aborted: bool,
}

impl RunnerOutput {
    /// All issues, including synthetic ones for broken checks.
    pub fn issues(&self) -> Vec<RuleIssue> {
        self.results
            .iter()
            .flat_map(|outcome| outcome.issues.iter().cloned())
            .collect()
    }

    pub fn faults(&self) -> Vec<&RuleFault> {
        self.results
            .iter()
            .filter_map(|outcome| match &outcome.status {
                CheckStatus::Error(fault) => Some(fault),
                _ => None,
            })
            .collect()
    }

    /// Folds the issues into a [`LintResult`].
    ///
    /// Broken checks surface as `warn` issues and never fail the package on
    /// their own.
    pub fn lint_result(&self) -> LintResult {
        LintResult::from_issues(&self.pkg_name, self.issues())
    }
}

/// Runs a fixed plan of rules concurrently.
#[derive(Debug, Clone, Default)]
pub struct RuleRunner {
    plan: Arc<[PlannedRule]>,
}

impl RuleRunner {
    /// Creates a runner. Rules planned as `off` are dropped.
    pub fn new(plan: Vec<PlannedRule>) -> Self {
        let plan: Vec<PlannedRule> = plan
            .into_iter()
            .filter(|planned| planned.severity != RuleSeverity::Off)
            .collect();
        Self { plan: plan.into() }
    }

    /// Number of enabled rules.
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    pub fn plan(&self) -> &[PlannedRule] {
        &self.plan
    }

    /// Runs every planned check against `pkg`.
    ///
    /// On cancellation, unfinished checks are dropped, finished results are
    /// kept and the output is marked `aborted`.
    pub async fn run(
        &self,
        pkg: Arc<PackageUnderTest>,
        signal: &CancellationToken,
        mut notify: impl FnMut(RuleEvent),
    ) -> RunnerOutput {
        let pkg_name = pkg.pkg_name.clone();
        let issues = Arc::new(Mutex::new(Vec::new()));
        let mut tasks: JoinSet<(String, Option<Result<(), RuleError>>)> = JoinSet::new();
        let mut task_rules = HashMap::new();

        for planned in self.plan.iter() {
            let rule_id = planned.id().to_string();
            notify(RuleEvent::Begin {
                rule_id: rule_id.clone(),
                pkg_name: pkg_name.clone(),
            });

            let ctx = RuleContext::new(
                Arc::clone(&pkg),
                rule_id.clone(),
                planned.severity,
                Arc::clone(&issues),
                signal.clone(),
            );
            let rule = Arc::clone(&planned.rule);
            let opts = planned.opts.clone();
            let signal = signal.clone();
            let task_rule_id = rule_id.clone();
            let handle = tasks.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = signal.cancelled() => None,
                    result = rule.check(&ctx, &opts, &signal) => Some(result),
                };
                (task_rule_id, result)
            });
            task_rules.insert(handle.id(), rule_id);
        }

        let mut results = Vec::new();
        let mut aborted = false;
        loop {
            // After an abort, unfinished checks are cancelled but the set is
            // still drained so checks that already returned are kept.
            let joined = tokio::select! {
                biased;
                _ = signal.cancelled() => {
                    tasks.abort_all();
                    aborted = true;
                    tasks.join_next_with_id().await
                }
                joined = tasks.join_next_with_id() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            let (rule_id, finished) = match joined {
                Ok((_, (rule_id, Some(result)))) => (rule_id, result),
                Ok((_, (_, None))) => {
                    aborted = true;
                    continue;
                }
                Err(e) if e.is_cancelled() => {
                    aborted = true;
                    continue;
                }
                Err(e) => {
                    let rule_id = task_rules.get(&e.id()).cloned().unwrap_or_default();
                    (rule_id, Err(RuleError::check("check panicked")))
                }
            };

            let outcome = match finished {
                Ok(()) => {
                    let reported: Vec<RuleIssue> = issues
                        .lock()
                        .iter()
                        .filter(|issue| issue.rule_id == rule_id)
                        .cloned()
                        .collect();
                    if reported.iter().any(RuleIssue::failed) {
                        notify(RuleEvent::Failed {
                            rule_id: rule_id.clone(),
                            pkg_name: pkg_name.clone(),
                            issues: reported.clone(),
                        });
                        CheckOutcome {
                            rule_id,
                            status: CheckStatus::Failed,
                            issues: reported,
                        }
                    } else {
                        notify(RuleEvent::Ok {
                            rule_id: rule_id.clone(),
                            pkg_name: pkg_name.clone(),
                            warnings: reported.clone(),
                        });
                        CheckOutcome {
                            rule_id,
                            status: CheckStatus::Ok,
                            issues: reported,
                        }
                    }
                }
                Err(e) => {
                    warn!("Rule {} broke while checking {}: {}", rule_id, pkg_name, e);
                    let fault = RuleFault {
                        rule_id: rule_id.clone(),
                        pkg_name: pkg_name.clone(),
                        message: e.to_string(),
                    };
                    let mut reported: Vec<RuleIssue> = issues
                        .lock()
                        .iter()
                        .filter(|issue| issue.rule_id == rule_id)
                        .cloned()
                        .collect();
                    reported.push(
                        RuleIssue::new(
                            &rule_id,
                            &pkg_name,
                            format!("Rule \"{}\" failed to run: {}", rule_id, e),
                            RuleSeverity::Warn,
                        )
                        .with_cause(e.to_string()),
                    );
                    notify(RuleEvent::Error {
                        rule_id: rule_id.clone(),
                        pkg_name: pkg_name.clone(),
                        fault: fault.clone(),
                    });
                    CheckOutcome {
                        rule_id,
                        status: CheckStatus::Error(fault),
                        issues: reported,
                    }
                }
            };
            results.push(outcome);
        }

        debug!(
            "Linted {} with {} rule(s){}",
            pkg_name,
            results.len(),
            if aborted { " (aborted)" } else { "" }
        );

        RunnerOutput {
            pkg_name,
            results,
            aborted,
        }
    }
}
