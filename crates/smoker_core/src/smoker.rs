//! The run controller.

use std::sync::Arc;
use std::time::Duration;

use smoker_pkg::{CatalogMatcher, PkgManagerSpec, WorkspaceInfo, discover_workspaces};
use smoker_rule::RuleRunner;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Reporter};
use crate::catalog::ComponentCatalog;
use crate::error::{AggregateCause, AggregateError, ComponentError, SmokerError};
use crate::event::Event;
use crate::options::SmokerOptions;
use crate::result::{PkgManagerOutcome, SmokeResult};
use crate::worker::{PkgManagerWorker, WorkerOptions};

/// Smoke tests the workspaces under `options.cwd` with every requested
/// package manager.
///
/// # Example
///
/// ```rust,ignore
/// let smoker = Smoker::new(options, Arc::new(catalog));
/// let result = smoker.smoke().await?;
/// std::process::exit(i32::from(result.has_failures()));
/// ```
pub struct Smoker {
    options: SmokerOptions,
    catalog: Arc<ComponentCatalog>,
    signal: CancellationToken,
}

impl Smoker {
    pub fn new(options: SmokerOptions, catalog: Arc<ComponentCatalog>) -> Self {
        Self {
            options,
            catalog,
            signal: CancellationToken::new(),
        }
    }

    /// The run's abort signal. Cancelling it stops every worker.
    pub fn signal(&self) -> CancellationToken {
        self.signal.clone()
    }

    pub fn options(&self) -> &SmokerOptions {
        &self.options
    }

    /// Runs every worker to completion.
    ///
    /// Returns `Err` only when the run cannot start. Failures once workers
    /// are running are reported through [`SmokeResult`].
    pub async fn smoke(&self) -> Result<SmokeResult, SmokerError> {
        let options = &self.options;
        self.catalog.check_plugins(&options.plugin)?;
        if !options.lint && options.script.is_empty() {
            return Err(SmokerError::NothingToDo);
        }

        let workspaces = discover_workspaces(&options.cwd, &options.workspace_filter())?;
        info!(
            "Found {} workspace(s): {}",
            workspaces.len(),
            workspace_names(&workspaces).join(", ")
        );

        let plan = options.rule_plan(self.catalog.rules())?;
        let runner = RuleRunner::new(plan);
        debug!("{} rule(s) enabled", runner.len());

        let matcher = CatalogMatcher::new(self.catalog.pkg_managers().to_vec(), self.catalog.probe())?;
        let matched = matcher
            .match_all(&options.pkg_manager, &options.cwd, &workspaces)
            .await;
        if !matched.unsupported.is_empty() {
            return Err(SmokerError::Unsupported(matched.unsupported));
        }

        let reporters = self.create_reporters()?;
        let bus = EventBus::start(reporters);
        let specs: Vec<PkgManagerSpec> = matched.envelopes.iter().map(|e| e.spec.clone()).collect();
        bus.emit(Event::SmokeBegin {
            pkg_managers: specs.clone(),
            workspaces: workspace_names(&workspaces),
            scripts: options.script.clone(),
            lint: options.lint && !runner.is_empty(),
        });

        let timer = options.timeout.map(|secs| {
            let signal = self.signal.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                warn!("Timed out after {}s; aborting", secs);
                signal.cancel();
            })
        });

        let workspaces: Arc<[WorkspaceInfo]> = workspaces.into();
        let worker_options = Arc::new(WorkerOptions::from(options));
        let handles: Vec<_> = matched
            .envelopes
            .into_iter()
            .map(|envelope| {
                let worker = PkgManagerWorker::new(
                    envelope,
                    Arc::clone(&workspaces),
                    self.catalog.executor(),
                    runner.clone(),
                    Arc::clone(&worker_options),
                    bus.sender(),
                    self.signal.child_token(),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut errors: Vec<ComponentError> = Vec::new();
        for (spec, handle) in specs.into_iter().zip(handles) {
            match handle.await {
                Ok(outcome) => {
                    if let Some(error) = &outcome.error {
                        errors.push(error.clone().into());
                    }
                    outcomes.push(outcome);
                }
                Err(e) => {
                    errors.push(ComponentError::Panic {
                        component: format!("{spec} worker"),
                        message: e.to_string(),
                    });
                    let mut outcome = PkgManagerOutcome::new(spec);
                    outcome.aborted = self.signal.is_cancelled();
                    outcomes.push(outcome);
                }
            }
        }
        if let Some(timer) = timer {
            timer.abort();
        }

        let aborted = self.signal.is_cancelled();
        let mut result = SmokeResult {
            pkg_managers: outcomes,
            error: (!errors.is_empty()).then(|| AggregateError::new(AggregateCause::Smoke, errors)),
            aborted,
        };

        let terminal = if aborted {
            info!("Smoke test aborted");
            Event::Aborted {
                result: result.clone(),
            }
        } else if result.has_failures() {
            info!("Smoke test failed");
            Event::SmokeFailed {
                result: result.clone(),
            }
        } else {
            info!("Smoke test passed");
            Event::SmokeOk {
                result: result.clone(),
            }
        };
        bus.emit(terminal);

        let reporter_errors = bus.shutdown().await;
        if !reporter_errors.is_empty() {
            warn!("{} reporter error(s)", reporter_errors.len());
            let reporting = AggregateError::new(
                AggregateCause::Reporter,
                reporter_errors.into_iter().map(ComponentError::from).collect(),
            );
            result.error = Some(match result.error.take() {
                Some(mut error) => {
                    error.errors.push(reporting.into());
                    error
                }
                None => reporting,
            });
        }

        Ok(result)
    }

    fn create_reporters(&self) -> Result<Vec<Box<dyn Reporter>>, SmokerError> {
        self.options
            .reporter_names()
            .iter()
            .map(|name| {
                self.catalog
                    .reporter(name)
                    .map(|def| def.create(&self.options))
                    .ok_or_else(|| SmokerError::UnknownReporter(name.clone()))
            })
            .collect()
    }
}

fn workspace_names(workspaces: &[WorkspaceInfo]) -> Vec<String> {
    workspaces.iter().map(|ws| ws.pkg_name.clone()).collect()
}
