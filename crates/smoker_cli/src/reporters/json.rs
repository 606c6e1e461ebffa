//! Machine-readable report of the whole run.

use std::io::Write;

use async_trait::async_trait;
use serde_json::Value;
use smoker_core::{Event, Reporter, ReporterDef, ReporterFailure, SmokerOptions};

/// Buffers the final result and prints it as one JSON document.
#[derive(Default)]
pub struct JsonReporter {
    report: Option<Value>,
}

impl JsonReporter {
    fn capture(&mut self, outcome: &str, event: &Event) -> Result<(), ReporterFailure> {
        let result = match event {
            Event::SmokeOk { result } | Event::SmokeFailed { result } | Event::Aborted { result } => {
                result
            }
            _ => return Ok(()),
        };
        let mut report = serde_json::to_value(result)?;
        if let Value::Object(map) = &mut report {
            map.insert("outcome".to_string(), Value::String(outcome.to_string()));
        }
        self.report = Some(report);
        Ok(())
    }
}

#[async_trait]
impl Reporter for JsonReporter {
    fn name(&self) -> &str {
        "json"
    }

    async fn handle(&mut self, event: &Event) -> Result<(), ReporterFailure> {
        match event {
            Event::SmokeOk { .. } => self.capture("ok", event),
            Event::SmokeFailed { .. } => self.capture("failed", event),
            Event::Aborted { .. } => self.capture("aborted", event),
            _ => Ok(()),
        }
    }

    async fn teardown(&mut self) -> Result<(), ReporterFailure> {
        if let Some(report) = self.report.take() {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", serde_json::to_string_pretty(&report)?)?;
            stdout.flush()?;
        }
        Ok(())
    }
}

pub struct JsonReporterDef;

impl ReporterDef for JsonReporterDef {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Prints the final result as JSON"
    }

    fn create(&self, _options: &SmokerOptions) -> Box<dyn Reporter> {
        Box::new(JsonReporter::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use smoker_core::{PkgManagerOutcome, SmokeResult};
    use smoker_pkg::{PkgManagerSpec, Version};

    fn result() -> SmokeResult {
        SmokeResult {
            pkg_managers: vec![PkgManagerOutcome::new(PkgManagerSpec::new(
                "npm",
                Version::new(10, 9, 2),
            ))],
            error: None,
            aborted: false,
        }
    }

    #[tokio::test]
    async fn test_captures_terminal_result() {
        let mut reporter = JsonReporter::default();
        reporter
            .handle(&Event::SmokeFailed { result: result() })
            .await
            .unwrap();

        let report = reporter.report.as_ref().unwrap();
        assert_eq!(report["outcome"], "failed");
        assert_eq!(report["pkgManagers"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_ignores_progress_events() {
        let mut reporter = JsonReporter::default();
        reporter
            .handle(&Event::PkgManagerBegin {
                pkg_manager: PkgManagerSpec::new("npm", Version::new(10, 9, 2)),
            })
            .await
            .unwrap();
        assert!(reporter.report.is_none());
    }
}
