//! Human-readable progress on stdout.

use std::io::Write;

use async_trait::async_trait;
use smoker_core::{Event, Reporter, ReporterDef, ReporterFailure, SmokeResult, SmokerOptions};
use smoker_pkg::RunScriptResult;
use smoker_rule::RuleIssue;

pub struct ConsoleReporter {
    verbose: bool,
}

#[async_trait]
impl Reporter for ConsoleReporter {
    fn name(&self) -> &str {
        "console"
    }

    async fn handle(&mut self, event: &Event) -> Result<(), ReporterFailure> {
        if let Some(text) = render(event, self.verbose) {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}")?;
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), ReporterFailure> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

pub struct ConsoleReporterDef;

impl ReporterDef for ConsoleReporterDef {
    fn name(&self) -> &str {
        "console"
    }

    fn description(&self) -> &str {
        "Human-readable progress and summary"
    }

    fn create(&self, options: &SmokerOptions) -> Box<dyn Reporter> {
        Box::new(ConsoleReporter {
            verbose: options.verbose,
        })
    }
}

/// Text for one event, or `None` for events the console stays quiet about.
pub fn render(event: &Event, verbose: bool) -> Option<String> {
    match event {
        Event::SmokeBegin {
            pkg_managers,
            workspaces,
            scripts,
            lint,
        } => {
            let pms: Vec<&str> = pkg_managers.iter().map(|pm| pm.label()).collect();
            let mut tasks = Vec::new();
            if *lint {
                tasks.push("lint".to_string());
            }
            if !scripts.is_empty() {
                tasks.push(format!("run {}", scripts.join(", ")));
            }
            Some(format!(
                "Smoking {} workspace(s) with {} ({})",
                workspaces.len(),
                pms.join(", "),
                tasks.join(" + ")
            ))
        }
        Event::PkgManagerPackOk {
            pkg_manager,
            manifests,
        } => Some(format!("{pkg_manager}: packed {} package(s)", manifests.len())),
        Event::PackFailed { error, .. } => Some(format!("  x {error}")),
        Event::PkgManagerInstallOk {
            pkg_manager,
            manifests,
        } => Some(format!(
            "{pkg_manager}: installed {} package(s)",
            manifests.len()
        )),
        Event::InstallFailed { error, .. } => Some(format!("  x {error}")),
        Event::InstallOk { output, .. } if verbose => Some(format!("  $ {}", output.command)),
        Event::RuleOk { warnings, .. } if !warnings.is_empty() => Some(issues(warnings)),
        Event::RuleFailed { issues: found, .. } => Some(issues(found)),
        Event::RuleError {
            rule,
            pkg_name,
            error,
            ..
        } => Some(format!(
            "  ! rule {rule} broke while checking {pkg_name}: {}",
            error.message
        )),
        Event::PkgManagerLintOk {
            pkg_manager,
            results,
        } => Some(format!(
            "{pkg_manager}: lint passed for {} package(s)",
            results.len()
        )),
        Event::PkgManagerLintFailed {
            pkg_manager,
            results,
        } => Some(format!(
            "{pkg_manager}: lint failed for {} of {} package(s)",
            results.iter().filter(|r| r.is_failed()).count(),
            results.len()
        )),
        Event::RunScriptOk { manifest, output, .. } => {
            let mut text = format!("  ok {} ({})", manifest.script, manifest.pkg_name);
            if verbose && !output.stdout.trim().is_empty() {
                text.push('\n');
                text.push_str(output.stdout.trim_end());
            }
            Some(text)
        }
        Event::RunScriptFailed { error, .. } => Some(format!("  x {}", error.message)),
        Event::RunScriptSkipped { manifest, .. } => Some(format!(
            "  - {} ({}) skipped: not defined",
            manifest.script, manifest.pkg_name
        )),
        Event::RunScriptError { error, .. } => Some(format!("  ! {error}")),
        Event::PkgManagerRunScriptsOk {
            pkg_manager,
            results,
        } => Some(format!("{pkg_manager}: {} script(s) passed", passed(results))),
        Event::PkgManagerRunScriptsFailed {
            pkg_manager,
            results,
        } => Some(format!(
            "{pkg_manager}: {} of {} script(s) failed",
            results.iter().filter(|r| r.is_failed()).count(),
            results.len()
        )),
        Event::Lingered {
            pkg_manager,
            directory,
        } => Some(format!(
            "{pkg_manager}: left temp directory at {}",
            directory.display()
        )),
        Event::PkgManagerEnd {
            error: Some(error), ..
        } => Some(error.to_string()),
        Event::SmokeOk { result } => Some(summary("Smoke test passed", result)),
        Event::SmokeFailed { result } => Some(summary("Smoke test failed", result)),
        Event::Aborted { result } => Some(summary("Smoke test aborted", result)),
        _ => None,
    }
}

fn issues(issues: &[RuleIssue]) -> String {
    issues
        .iter()
        .map(|issue| {
            format!(
                "  {} [{}] {}: {}",
                issue.severity, issue.rule_id, issue.pkg_name, issue.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn passed(results: &[RunScriptResult]) -> usize {
    results
        .iter()
        .filter(|r| matches!(r, RunScriptResult::Ok { .. }))
        .count()
}

fn summary(headline: &str, result: &SmokeResult) -> String {
    let issues: usize = result
        .pkg_managers
        .iter()
        .flat_map(|pm| pm.lint.iter())
        .map(|lint| lint.issues().len())
        .sum();
    let failed_scripts = result
        .pkg_managers
        .iter()
        .flat_map(|pm| pm.scripts.iter())
        .filter(|s| s.is_failed())
        .count();
    format!(
        "\n{headline}: {} package manager(s), {issues} lint issue(s), {failed_scripts} failed script(s)",
        result.pkg_managers.len()
    )
}
