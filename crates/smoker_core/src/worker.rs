//! One package manager's pass over the workspaces.
//!
//! A worker owns a temp directory and walks the phases in order:
//! setup, pack, install, lint, run scripts, teardown, cleanup. Each phase
//! fans out over its items and is bracketed by begin/end events. Faults are
//! collected into the worker's [`AggregateError`] instead of propagating.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use smoker_pkg::{
    ExecOutput, Executor, InstallManifest, LifecycleStage, PkgManagerContext, PkgManagerDef,
    PkgManagerEnvelope, PkgManagerError, PkgManagerSpec, RunScriptManifest, RunScriptResult, ScriptFailure,
    WorkspaceInfo,
};
use smoker_rule::{PackageUnderTest, RuleEvent, RuleRunner, RunnerOutput};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::EventSender;
use crate::error::{AggregateCause, AggregateError, ComponentError};
use crate::event::Event;
use crate::options::SmokerOptions;
use crate::result::PkgManagerOutcome;

/// The part of [`SmokerOptions`] a worker cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Extra dependencies installed next to the packed workspaces.
    pub add: Vec<String>,
    pub scripts: Vec<String>,
    pub lint: bool,
    /// Missing scripts are skipped instead of failing.
    pub loose: bool,
    /// Stop running scripts after the first failure.
    pub bail: bool,
    /// Keep the temp directory.
    pub linger: bool,
    pub verbose: bool,
}

impl From<&SmokerOptions> for WorkerOptions {
    fn from(options: &SmokerOptions) -> Self {
        Self {
            add: options.add.clone(),
            scripts: options.script.clone(),
            lint: options.lint,
            loose: options.loose,
            bail: options.bail,
            linger: options.linger,
            verbose: options.verbose,
        }
    }
}

/// Drives one [`PkgManagerEnvelope`] through every phase.
pub struct PkgManagerWorker {
    envelope: PkgManagerEnvelope,
    workspaces: Arc<[WorkspaceInfo]>,
    executor: Arc<dyn Executor>,
    runner: RuleRunner,
    options: Arc<WorkerOptions>,
    events: EventSender,
    signal: CancellationToken,
}

impl PkgManagerWorker {
    pub fn new(
        envelope: PkgManagerEnvelope,
        workspaces: Arc<[WorkspaceInfo]>,
        executor: Arc<dyn Executor>,
        runner: RuleRunner,
        options: Arc<WorkerOptions>,
        events: EventSender,
        signal: CancellationToken,
    ) -> Self {
        Self {
            envelope,
            workspaces,
            executor,
            runner,
            options,
            events,
            signal,
        }
    }

    pub fn spec(&self) -> &PkgManagerSpec {
        &self.envelope.spec
    }

    /// Runs every phase and reports what happened. Never fails.
    pub async fn run(self) -> PkgManagerOutcome {
        let spec = self.spec().clone();
        let mut outcome = PkgManagerOutcome::new(spec.clone());
        let mut errors = Vec::new();

        info!("Smoke testing with {}", spec);
        self.events.emit(Event::PkgManagerBegin {
            pkg_manager: spec.clone(),
        });

        let tmpdir = match tempfile::Builder::new()
            .prefix(&format!("smoker-{}-", spec.name))
            .tempdir()
        {
            Ok(tmpdir) => tmpdir,
            Err(e) => {
                errors.push(ComponentError::TempDir {
                    pkg_manager: spec.to_string(),
                    message: e.to_string(),
                });
                return self.finish(outcome, errors);
            }
        };
        debug!("[{}] Working in {}", spec, tmpdir.path().display());

        let ctx = PkgManagerContext {
            spec: spec.clone(),
            tmpdir: tmpdir.path().to_path_buf(),
            executor: Arc::clone(&self.executor),
            loose: self.options.loose,
            verbose: self.options.verbose,
            signal: self.signal.clone(),
        };

        match self.envelope.def.setup(&ctx).await {
            Ok(()) => self.run_phases(&ctx, &mut outcome, &mut errors).await,
            Err(e) => errors.push(lifecycle_error(&spec, LifecycleStage::Setup, e)),
        }

        if let Err(e) = self.envelope.def.teardown(&ctx).await {
            errors.push(lifecycle_error(&spec, LifecycleStage::Teardown, e));
        }

        if self.options.linger {
            let directory = tmpdir.keep();
            info!("[{}] Leaving {} in place", spec, directory.display());
            self.events.emit(Event::Lingered {
                pkg_manager: spec.clone(),
                directory: directory.clone(),
            });
            outcome.lingered = Some(directory);
        } else {
            let path = tmpdir.path().to_path_buf();
            match tmpdir.close() {
                Ok(()) => debug!("[{}] Pruned {}", spec, path.display()),
                Err(e) => errors.push(ComponentError::Cleanup {
                    pkg_manager: spec.to_string(),
                    path,
                    message: e.to_string(),
                }),
            }
        }

        self.finish(outcome, errors)
    }

    fn finish(
        &self,
        mut outcome: PkgManagerOutcome,
        errors: Vec<ComponentError>,
    ) -> PkgManagerOutcome {
        let spec = self.spec();
        outcome.aborted = self.signal.is_cancelled();
        if !errors.is_empty() {
            warn!("[{}] Finished with {} error(s)", spec, errors.len());
            outcome.error = Some(AggregateError::new(
                AggregateCause::Worker {
                    pkg_manager: spec.to_string(),
                },
                errors,
            ));
        }
        self.events.emit(Event::PkgManagerEnd {
            pkg_manager: spec.clone(),
            aborted: outcome.aborted,
            error: outcome.error.clone(),
        });
        outcome
    }

    async fn run_phases(
        &self,
        ctx: &PkgManagerContext,
        outcome: &mut PkgManagerOutcome,
        errors: &mut Vec<ComponentError>,
    ) {
        let packed = match self.pack_all(ctx).await {
            Ok(packed) => packed,
            Err(pack_errors) => {
                errors.extend(pack_errors);
                return;
            }
        };
        if self.signal.is_cancelled() {
            return;
        }

        let installed = match self.install_all(ctx, packed).await {
            Ok(installed) => installed,
            Err(install_errors) => {
                errors.extend(install_errors);
                return;
            }
        };
        if self.signal.is_cancelled() {
            return;
        }

        if self.options.lint && !self.runner.is_empty() {
            self.lint_all(&installed, outcome, errors).await;
            if self.signal.is_cancelled() {
                return;
            }
        }

        if !self.options.scripts.is_empty() {
            self.run_scripts(ctx, &installed, outcome, errors).await;
        }
    }

    async fn pack_all(
        &self,
        ctx: &PkgManagerContext,
    ) -> Result<Vec<InstallManifest>, Vec<ComponentError>> {
        let spec = self.spec();
        debug!("[{}] Packing {} workspace(s)", spec, self.workspaces.len());
        self.events.emit(Event::PkgManagerPackBegin {
            pkg_manager: spec.clone(),
            total: self.workspaces.len(),
        });

        let mut tasks = JoinSet::new();
        for (index, workspace) in self.workspaces.iter().enumerate() {
            self.events.emit(Event::PackBegin {
                pkg_manager: spec.clone(),
                pkg_name: workspace.pkg_name.clone(),
                local_path: workspace.local_path.clone(),
            });
            let def = Arc::clone(&self.envelope.def);
            let ctx = ctx.clone();
            let workspace = workspace.clone();
            tasks.spawn(async move {
                let result = def.pack(&ctx, &workspace).await;
                (index, workspace.pkg_name, result)
            });
        }

        let mut packed = Vec::new();
        let mut errors = Vec::new();
        while let Some(joined) = join_next(&mut tasks, &self.signal).await {
            match joined {
                Ok((index, _, Ok(manifest))) => {
                    self.events.emit(Event::PackOk {
                        pkg_manager: spec.clone(),
                        manifest: manifest.clone(),
                    });
                    packed.push((index, manifest));
                }
                Ok((_, pkg_name, Err(e))) => {
                    let error = ComponentError::Pack {
                        pkg_manager: spec.to_string(),
                        pkg_name: pkg_name.clone(),
                        message: detail(e),
                    };
                    self.events.emit(Event::PackFailed {
                        pkg_manager: spec.clone(),
                        pkg_name,
                        error: error.clone(),
                    });
                    errors.push(error);
                }
                Err(e) => errors.push(panic_error(spec, "pack", e)),
            }
        }
        packed.sort_by_key(|(index, _)| *index);
        let manifests: Vec<InstallManifest> = packed.into_iter().map(|(_, m)| m).collect();

        if errors.is_empty() && !self.signal.is_cancelled() {
            self.events.emit(Event::PkgManagerPackOk {
                pkg_manager: spec.clone(),
                manifests: manifests.clone(),
            });
            Ok(manifests)
        } else {
            self.events.emit(Event::PkgManagerPackFailed {
                pkg_manager: spec.clone(),
                errors: errors.clone(),
            });
            Err(errors)
        }
    }

    async fn install_all(
        &self,
        ctx: &PkgManagerContext,
        packed: Vec<InstallManifest>,
    ) -> Result<Vec<InstallManifest>, Vec<ComponentError>> {
        let spec = self.spec();
        let groups = group_by_cwd(packed, &self.options.add);
        let total: usize = groups.iter().map(|(_, items)| items.len()).sum();
        debug!("[{}] Installing {} package(s)", spec, total);
        self.events.emit(Event::PkgManagerInstallBegin {
            pkg_manager: spec.clone(),
            total,
        });

        // Installs sharing a directory would race on its lockfile, so each
        // group is sequential while groups run side by side.
        let mut tasks = JoinSet::new();
        for (_, items) in groups {
            let def = Arc::clone(&self.envelope.def);
            let ctx = ctx.clone();
            let events = self.events.clone();
            tasks.spawn(async move {
                let mut results = Vec::with_capacity(items.len());
                for (index, manifest) in items {
                    if ctx.signal.is_cancelled() {
                        break;
                    }
                    events.emit(Event::InstallBegin {
                        pkg_manager: ctx.spec.clone(),
                        manifest: manifest.clone(),
                    });
                    let result = install_one(def.as_ref(), &ctx, &manifest).await;
                    match &result {
                        Ok(output) => events.emit(Event::InstallOk {
                            pkg_manager: ctx.spec.clone(),
                            manifest: manifest.clone(),
                            output: output.clone(),
                        }),
                        Err(error) => events.emit(Event::InstallFailed {
                            pkg_manager: ctx.spec.clone(),
                            manifest: manifest.clone(),
                            error: error.clone(),
                        }),
                    }
                    results.push((index, manifest, result));
                }
                results
            });
        }

        let mut installed = Vec::new();
        let mut errors = Vec::new();
        while let Some(joined) = join_next(&mut tasks, &self.signal).await {
            match joined {
                Ok(results) => {
                    for (index, manifest, result) in results {
                        match result {
                            Ok(_) => installed.push((index, manifest)),
                            Err(error) => errors.push(error),
                        }
                    }
                }
                Err(e) => errors.push(panic_error(spec, "install", e)),
            }
        }
        installed.sort_by_key(|(index, _)| *index);
        let manifests: Vec<InstallManifest> = installed.into_iter().map(|(_, m)| m).collect();

        if errors.is_empty() && !self.signal.is_cancelled() {
            self.events.emit(Event::PkgManagerInstallOk {
                pkg_manager: spec.clone(),
                manifests: manifests.clone(),
            });
            Ok(manifests
                .into_iter()
                .filter(|manifest| !manifest.is_additional)
                .collect())
        } else {
            self.events.emit(Event::PkgManagerInstallFailed {
                pkg_manager: spec.clone(),
                errors: errors.clone(),
            });
            Err(errors)
        }
    }

    async fn lint_all(
        &self,
        installed: &[InstallManifest],
        outcome: &mut PkgManagerOutcome,
        errors: &mut Vec<ComponentError>,
    ) {
        let spec = self.spec();
        debug!(
            "[{}] Linting {} package(s) with {} rule(s)",
            spec,
            installed.len(),
            self.runner.len()
        );
        self.events.emit(Event::PkgManagerLintBegin {
            pkg_manager: spec.clone(),
            total_rules: self.runner.len(),
            total_pkgs: installed.len(),
        });

        let mut tasks = JoinSet::new();
        for (index, manifest) in installed.iter().enumerate() {
            let install_path = installed_path(manifest);
            let pkg = match PackageUnderTest::read(install_path.clone()).await {
                Ok(pkg) => Arc::new(pkg),
                Err(e) => {
                    errors.push(ComponentError::Install {
                        pkg_manager: spec.to_string(),
                        pkg_spec: manifest.pkg_spec.clone(),
                        message: format!(
                            "installed package at {} is unreadable: {e}",
                            install_path.display()
                        ),
                    });
                    continue;
                }
            };
            let runner = self.runner.clone();
            let events = self.events.clone();
            let signal = self.signal.clone();
            let task_spec = spec.clone();
            tasks.spawn(async move {
                let output = runner
                    .run(pkg, &signal, |event| events.emit(rule_event(&task_spec, event)))
                    .await;
                (index, output)
            });
        }

        let mut outputs: Vec<(usize, RunnerOutput)> = Vec::new();
        while let Some(joined) = join_next(&mut tasks, &self.signal).await {
            match joined {
                Ok(output) => outputs.push(output),
                Err(e) => errors.push(panic_error(spec, "lint", e)),
            }
        }
        outputs.sort_by_key(|(index, _)| *index);

        let mut aborted = self.signal.is_cancelled();
        for (_, output) in &outputs {
            aborted |= output.aborted;
            outcome
                .rule_errors
                .extend(output.faults().into_iter().cloned());
            outcome.lint.push(output.lint_result());
        }

        // An interrupted lint never passes, whatever it found so far.
        let results = outcome.lint.clone();
        if aborted || outcome.lint_failed() {
            self.events.emit(Event::PkgManagerLintFailed {
                pkg_manager: spec.clone(),
                results,
            });
        } else {
            self.events.emit(Event::PkgManagerLintOk {
                pkg_manager: spec.clone(),
                results,
            });
        }
    }

    async fn run_scripts(
        &self,
        ctx: &PkgManagerContext,
        installed: &[InstallManifest],
        outcome: &mut PkgManagerOutcome,
        errors: &mut Vec<ComponentError>,
    ) {
        let spec = self.spec();
        let manifests: Vec<RunScriptManifest> = installed
            .iter()
            .flat_map(|installed| {
                self.options.scripts.iter().map(|script| RunScriptManifest {
                    script: script.clone(),
                    pkg_name: installed.pkg_name.clone(),
                    cwd: installed_path(installed),
                    local_path: installed.local_path.clone(),
                })
            })
            .collect();

        debug!("[{}] Running {} script(s)", spec, manifests.len());
        self.events.emit(Event::PkgManagerRunScriptsBegin {
            pkg_manager: spec.clone(),
            total: manifests.len(),
        });

        let mut runner_failed = false;
        for manifest in manifests {
            if self.signal.is_cancelled() {
                break;
            }
            self.events.emit(Event::RunScriptBegin {
                pkg_manager: spec.clone(),
                manifest: manifest.clone(),
            });

            let result = if self.has_script(&manifest) {
                match self.envelope.def.run_script(ctx, &manifest).await {
                    Ok(result) => result,
                    Err(e) => {
                        let error = ComponentError::ScriptRunner {
                            pkg_manager: spec.to_string(),
                            script: manifest.script.clone(),
                            pkg_name: manifest.pkg_name.clone(),
                            message: detail(e),
                        };
                        self.events.emit(Event::RunScriptError {
                            pkg_manager: spec.clone(),
                            manifest,
                            error: error.clone(),
                        });
                        errors.push(error);
                        runner_failed = true;
                        break;
                    }
                }
            } else if self.options.loose {
                RunScriptResult::Skipped { manifest }
            } else {
                let error = ScriptFailure {
                    message: format!(
                        "Script \"{}\" not found in package \"{}\"",
                        manifest.script, manifest.pkg_name
                    ),
                    exit_code: None,
                };
                RunScriptResult::Failed {
                    manifest,
                    output: None,
                    error,
                }
            };

            self.events.emit(script_event(spec, &result));
            let failed = result.is_failed();
            outcome.scripts.push(result);
            if failed && self.options.bail {
                info!("[{}] Bailing after first script failure", spec);
                break;
            }
        }

        let results = outcome.scripts.clone();
        if runner_failed || outcome.scripts_failed() || self.signal.is_cancelled() {
            self.events.emit(Event::PkgManagerRunScriptsFailed {
                pkg_manager: spec.clone(),
                results,
            });
        } else {
            self.events.emit(Event::PkgManagerRunScriptsOk {
                pkg_manager: spec.clone(),
                results,
            });
        }
    }

    /// Whether the source workspace declares `manifest.script`.
    fn has_script(&self, manifest: &RunScriptManifest) -> bool {
        self.workspaces
            .iter()
            .find(|ws| {
                manifest.local_path.as_deref() == Some(ws.local_path.as_path())
                    || (manifest.local_path.is_none() && ws.pkg_name == manifest.pkg_name)
            })
            .and_then(|ws| ws.pkg_json.get("scripts"))
            .and_then(Value::as_object)
            .is_some_and(|scripts| scripts.contains_key(&manifest.script))
    }
}

async fn install_one(
    def: &dyn PkgManagerDef,
    ctx: &PkgManagerContext,
    manifest: &InstallManifest,
) -> Result<ExecOutput, ComponentError> {
    let error = |message: String| ComponentError::Install {
        pkg_manager: ctx.spec.to_string(),
        pkg_spec: manifest.pkg_spec.clone(),
        message,
    };
    match def.install(ctx, manifest).await {
        Ok(output) if output.failed => Err(error(exit_detail(&output))),
        Ok(output) => Ok(output),
        Err(e) => Err(error(detail(e))),
    }
}

/// Groups manifests by install directory in first-seen order, appending
/// the extra dependencies to every group.
fn group_by_cwd(
    packed: Vec<InstallManifest>,
    additional: &[String],
) -> Vec<(PathBuf, Vec<(usize, InstallManifest)>)> {
    let mut groups: Vec<(PathBuf, Vec<InstallManifest>)> = Vec::new();
    for manifest in packed {
        match groups.iter_mut().find(|(cwd, _)| *cwd == manifest.cwd) {
            Some((_, items)) => items.push(manifest),
            None => groups.push((manifest.cwd.clone(), vec![manifest])),
        }
    }
    for (cwd, items) in &mut groups {
        items.extend(
            additional
                .iter()
                .map(|dep| InstallManifest::additional(cwd.clone(), dep.as_str())),
        );
    }

    let mut index = 0;
    groups
        .into_iter()
        .map(|(cwd, items)| {
            let items = items
                .into_iter()
                .map(|manifest| {
                    index += 1;
                    (index, manifest)
                })
                .collect();
            (cwd, items)
        })
        .collect()
}

fn installed_path(manifest: &InstallManifest) -> PathBuf {
    manifest
        .install_path
        .clone()
        .unwrap_or_else(|| manifest.cwd.join("node_modules").join(&manifest.pkg_name))
}

/// Next finished task. Once `signal` fires, unfinished tasks are aborted and
/// only results that were already complete are returned.
async fn join_next<T: Send + 'static>(
    tasks: &mut JoinSet<T>,
    signal: &CancellationToken,
) -> Option<Result<T, JoinError>> {
    if !signal.is_cancelled() {
        tokio::select! {
            biased;
            _ = signal.cancelled() => {}
            joined = tasks.join_next() => return joined,
        }
    }
    tasks.abort_all();
    while let Some(joined) = tasks.join_next().await {
        if matches!(&joined, Err(e) if e.is_cancelled()) {
            continue;
        }
        return Some(joined);
    }
    None
}

fn rule_event(spec: &PkgManagerSpec, event: RuleEvent) -> Event {
    let pkg_manager = spec.clone();
    match event {
        RuleEvent::Begin { rule_id, pkg_name } => Event::RuleBegin {
            pkg_manager,
            rule: rule_id,
            pkg_name,
        },
        RuleEvent::Ok {
            rule_id,
            pkg_name,
            warnings,
        } => Event::RuleOk {
            pkg_manager,
            rule: rule_id,
            pkg_name,
            warnings,
        },
        RuleEvent::Failed {
            rule_id,
            pkg_name,
            issues,
        } => Event::RuleFailed {
            pkg_manager,
            rule: rule_id,
            pkg_name,
            issues,
        },
        RuleEvent::Error {
            rule_id,
            pkg_name,
            fault,
        } => Event::RuleError {
            pkg_manager,
            rule: rule_id,
            pkg_name,
            error: fault,
        },
    }
}

fn script_event(spec: &PkgManagerSpec, result: &RunScriptResult) -> Event {
    let pkg_manager = spec.clone();
    match result.clone() {
        RunScriptResult::Ok { manifest, output } => Event::RunScriptOk {
            pkg_manager,
            manifest,
            output,
        },
        RunScriptResult::Failed {
            manifest, error, ..
        } => Event::RunScriptFailed {
            pkg_manager,
            manifest,
            error,
        },
        RunScriptResult::Skipped { manifest } => Event::RunScriptSkipped {
            pkg_manager,
            manifest,
        },
    }
}

fn lifecycle_error(
    spec: &PkgManagerSpec,
    stage: LifecycleStage,
    err: PkgManagerError,
) -> ComponentError {
    warn!("[{}] {} hook failed: {}", spec, stage, err);
    ComponentError::Lifecycle {
        pkg_manager: spec.to_string(),
        stage,
        message: detail(err),
    }
}

fn panic_error(spec: &PkgManagerSpec, phase: &str, err: JoinError) -> ComponentError {
    ComponentError::Panic {
        component: format!("{spec} {phase}"),
        message: err.to_string(),
    }
}

/// The adapter's message without the wrapper text the component error adds.
fn detail(err: PkgManagerError) -> String {
    match err {
        PkgManagerError::Pack { message, .. }
        | PkgManagerError::Install { message, .. }
        | PkgManagerError::ScriptRunner { message, .. }
        | PkgManagerError::Lifecycle { message, .. } => message,
        other => other.to_string(),
    }
}

fn exit_detail(output: &ExecOutput) -> String {
    let code = output
        .exit_code
        .map_or_else(|| "unknown".to_string(), |c| c.to_string());
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("`{}` exited with code {code}", output.command)
    } else {
        format!("`{}` exited with code {code}: {stderr}", output.command)
    }
}
