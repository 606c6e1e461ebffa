//! Fakes shared by the unit tests in this crate.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use smoker_pkg::{
    ExecError, ExecOptions, ExecOutput, Executor, InstallManifest, LifecycleStage,
    PkgManagerContext, PkgManagerDef, PkgManagerError, PkgManagerSpec, ResolveError,
    RunScriptManifest, RunScriptResult, SystemProbe, Version, WorkspaceInfo,
};
use smoker_rule::{Rule, RuleContext, RuleError};
use tokio_util::sync::CancellationToken;

use crate::bus::{Reporter, ReporterDef, ReporterFailure};
use crate::event::Event;
use crate::options::SmokerOptions;

pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Executor that never spawns anything.
#[derive(Debug, Default)]
pub struct NoopExecutor;

#[async_trait]
impl Executor for NoopExecutor {
    async fn exec(
        &self,
        spec: &PkgManagerSpec,
        args: &[String],
        _opts: ExecOptions,
    ) -> Result<ExecOutput, ExecError> {
        Ok(ExecOutput {
            command: format!("{} {}", spec.bin, args.join(" ")),
            ..Default::default()
        })
    }
}

/// How a fake script behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptBehavior {
    Pass,
    Exit(i32),
    Crash,
}

/// In-memory package manager.
///
/// `pack` writes the workspace's `package.json` as the "tarball"; `install`
/// unpacks it to `node_modules/<name>` so rules have something to read.
#[derive(Debug)]
pub struct FakePkgManager {
    bin: String,
    versions: Vec<Version>,
    lockfile: Option<String>,
    fail_setup: bool,
    fail_teardown: bool,
    fail_pack: HashSet<String>,
    fail_install: HashSet<String>,
    scripts: HashMap<String, ScriptBehavior>,
    pack_delay: Option<Duration>,
    calls: CallLog,
}

impl FakePkgManager {
    pub fn new(bin: &str, versions: &[&str]) -> Self {
        Self {
            bin: bin.to_string(),
            versions: versions
                .iter()
                .map(|v| Version::parse(v).unwrap())
                .collect(),
            lockfile: None,
            fail_setup: false,
            fail_teardown: false,
            fail_pack: HashSet::new(),
            fail_install: HashSet::new(),
            scripts: HashMap::new(),
            pack_delay: None,
            calls: CallLog::default(),
        }
    }

    pub fn with_lockfile(mut self, lockfile: &str) -> Self {
        self.lockfile = Some(lockfile.to_string());
        self
    }

    pub fn failing_setup(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    pub fn failing_teardown(mut self) -> Self {
        self.fail_teardown = true;
        self
    }

    pub fn failing_pack(mut self, pkg_name: &str) -> Self {
        self.fail_pack.insert(pkg_name.to_string());
        self
    }

    pub fn failing_install(mut self, pkg_name: &str) -> Self {
        self.fail_install.insert(pkg_name.to_string());
        self
    }

    pub fn with_script(mut self, script: &str, behavior: ScriptBehavior) -> Self {
        self.scripts.insert(script.to_string(), behavior);
        self
    }

    pub fn with_pack_delay(mut self, delay: Duration) -> Self {
        self.pack_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PkgManagerDef for FakePkgManager {
    fn bin(&self) -> &str {
        &self.bin
    }

    fn lockfile(&self) -> Option<&str> {
        self.lockfile.as_deref()
    }

    fn accepts(&self, value: &str) -> Option<Version> {
        if value == "latest" {
            return self.versions.iter().max().cloned();
        }
        let wanted = Version::parse(value).ok()?;
        self.versions.iter().find(|v| **v == wanted).cloned()
    }

    async fn setup(&self, _ctx: &PkgManagerContext) -> Result<(), PkgManagerError> {
        self.record("setup".to_string());
        if self.fail_setup {
            return Err(PkgManagerError::lifecycle(LifecycleStage::Setup, "boom"));
        }
        Ok(())
    }

    async fn teardown(&self, _ctx: &PkgManagerContext) -> Result<(), PkgManagerError> {
        self.record("teardown".to_string());
        if self.fail_teardown {
            return Err(PkgManagerError::lifecycle(LifecycleStage::Teardown, "boom"));
        }
        Ok(())
    }

    async fn pack(
        &self,
        ctx: &PkgManagerContext,
        workspace: &WorkspaceInfo,
    ) -> Result<InstallManifest, PkgManagerError> {
        if let Some(delay) = self.pack_delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = ctx.signal.cancelled() => {
                    return Err(PkgManagerError::pack(&workspace.pkg_name, "aborted"));
                }
            }
        }
        self.record(format!("pack:{}", workspace.pkg_name));
        if self.fail_pack.contains(&workspace.pkg_name) {
            return Err(PkgManagerError::pack(&workspace.pkg_name, "exit code 1"));
        }

        let tarball = ctx
            .tmpdir
            .join(format!("{}.tgz", workspace.pkg_name.replace('/', "-")));
        std::fs::write(&tarball, workspace.pkg_json.to_string())?;
        Ok(InstallManifest {
            cwd: ctx.tmpdir.clone(),
            pkg_name: workspace.pkg_name.clone(),
            pkg_spec: tarball.display().to_string(),
            install_path: Some(ctx.tmpdir.join("node_modules").join(&workspace.pkg_name)),
            local_path: Some(workspace.local_path.clone()),
            is_additional: false,
        })
    }

    async fn install(
        &self,
        _ctx: &PkgManagerContext,
        manifest: &InstallManifest,
    ) -> Result<ExecOutput, PkgManagerError> {
        self.record(format!("install:{}", manifest.pkg_name));
        if self.fail_install.contains(&manifest.pkg_name) {
            return Err(PkgManagerError::install(&manifest.pkg_spec, "exit code 1"));
        }

        let pkg_json = match std::fs::read_to_string(&manifest.pkg_spec) {
            Ok(content) => content,
            Err(_) => json!({ "name": manifest.pkg_name }).to_string(),
        };
        let target = manifest
            .cwd
            .join("node_modules")
            .join(&manifest.pkg_name);
        std::fs::create_dir_all(&target)?;
        std::fs::write(target.join("package.json"), pkg_json)?;
        Ok(ExecOutput {
            command: format!("{} install {}", self.bin, manifest.pkg_spec),
            ..Default::default()
        })
    }

    async fn run_script(
        &self,
        _ctx: &PkgManagerContext,
        manifest: &RunScriptManifest,
    ) -> Result<RunScriptResult, PkgManagerError> {
        self.record(format!("script:{}:{}", manifest.script, manifest.pkg_name));
        let behavior = self
            .scripts
            .get(&manifest.script)
            .copied()
            .unwrap_or(ScriptBehavior::Pass);
        let command = format!("{} run {}", self.bin, manifest.script);
        match behavior {
            ScriptBehavior::Pass => Ok(RunScriptResult::from_output(
                manifest.clone(),
                ExecOutput {
                    command,
                    exit_code: Some(0),
                    ..Default::default()
                },
            )),
            ScriptBehavior::Exit(code) => Ok(RunScriptResult::from_output(
                manifest.clone(),
                ExecOutput {
                    command,
                    exit_code: Some(code),
                    failed: true,
                    ..Default::default()
                },
            )),
            ScriptBehavior::Crash => Err(PkgManagerError::ScriptRunner {
                script: manifest.script.clone(),
                pkg_name: manifest.pkg_name.clone(),
                message: "runner crashed".to_string(),
            }),
        }
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    pub version: Option<String>,
}

#[async_trait]
impl SystemProbe for StaticProbe {
    async fn which(&self, bin: &str) -> Option<PathBuf> {
        self.version
            .as_ref()
            .map(|_| PathBuf::from("/usr/bin").join(bin))
    }

    async fn version(&self, path: &Path) -> Result<String, ResolveError> {
        self.version.clone().ok_or_else(|| ResolveError::Probe {
            bin: path.display().to_string(),
            message: "not installed".to_string(),
        })
    }
}

/// Rule that reports one issue per package with a fixed message.
#[derive(Debug)]
pub struct StaticRule {
    pub name: &'static str,
    pub message: Option<&'static str>,
    pub throws: bool,
    /// Cancels the run and waits for the cancellation before returning.
    pub aborts: bool,
}

#[async_trait]
impl Rule for StaticRule {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "test rule"
    }

    async fn check(
        &self,
        ctx: &RuleContext,
        _opts: &Value,
        signal: &CancellationToken,
    ) -> Result<(), RuleError> {
        if self.aborts {
            signal.cancel();
            signal.cancelled().await;
            return Ok(());
        }
        if self.throws {
            return Err(RuleError::check("rule exploded"));
        }
        if let Some(message) = self.message {
            ctx.add_issue(message);
        }
        Ok(())
    }
}

/// Reporter that records hook calls and event names.
pub struct RecordingReporter {
    name: String,
    log: CallLog,
    events: Arc<Mutex<Vec<Event>>>,
    delay: Option<Duration>,
}

impl RecordingReporter {
    pub fn new(name: &str) -> (Self, CallLog) {
        let log = CallLog::default();
        let reporter = Self {
            name: name.to_string(),
            log: Arc::clone(&log),
            events: Arc::default(),
            delay: None,
        };
        (reporter, log)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn events(&self) -> Arc<Mutex<Vec<Event>>> {
        Arc::clone(&self.events)
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&mut self) -> Result<(), ReporterFailure> {
        self.log.lock().push("setup".to_string());
        Ok(())
    }

    async fn handle(&mut self, event: &Event) -> Result<(), ReporterFailure> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.log.lock().push(event.name().to_string());
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), ReporterFailure> {
        self.log.lock().push("teardown".to_string());
        Ok(())
    }
}

/// Reporter whose hooks fail on demand.
pub struct FailingReporter {
    name: String,
    setup: bool,
    event: bool,
    teardown: bool,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl FailingReporter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            setup: false,
            event: false,
            teardown: false,
            calls: Arc::default(),
        }
    }

    pub fn fail_on_setup(mut self) -> Self {
        self.setup = true;
        self
    }

    pub fn fail_on_event(mut self) -> Self {
        self.event = true;
        self
    }

    pub fn fail_on_teardown(mut self) -> Self {
        self.teardown = true;
        self
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.calls)
    }

    fn hook(&self, call: &'static str, fail: bool) -> Result<(), ReporterFailure> {
        self.calls.lock().push(call);
        if fail {
            return Err(format!("{call} exploded").into());
        }
        Ok(())
    }
}

#[async_trait]
impl Reporter for FailingReporter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&mut self) -> Result<(), ReporterFailure> {
        self.hook("setup", self.setup)
    }

    async fn handle(&mut self, _event: &Event) -> Result<(), ReporterFailure> {
        self.hook("event", self.event)
    }

    async fn teardown(&mut self) -> Result<(), ReporterFailure> {
        self.hook("teardown", self.teardown)
    }
}

/// Catalog entry that hands out recording reporters and keeps their logs.
#[derive(Default)]
pub struct RecordingReporterDef {
    pub logs: Mutex<Vec<CallLog>>,
    pub events: Mutex<Vec<Arc<Mutex<Vec<Event>>>>>,
}

impl RecordingReporterDef {
    /// Event names seen by the first reporter created.
    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .first()
            .map(|events| events.lock().iter().map(|e| e.name().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn recorded(&self) -> Vec<Event> {
        self.events
            .lock()
            .first()
            .map(|events| events.lock().clone())
            .unwrap_or_default()
    }
}

impl ReporterDef for RecordingReporterDef {
    fn name(&self) -> &str {
        "recording"
    }

    fn create(&self, _options: &SmokerOptions) -> Box<dyn Reporter> {
        let (reporter, log) = RecordingReporter::new("recording");
        self.logs.lock().push(log);
        self.events.lock().push(reporter.events());
        Box::new(reporter)
    }
}

/// Catalog entry for a reporter that fails every event.
pub struct FailingReporterDef;

impl ReporterDef for FailingReporterDef {
    fn name(&self) -> &str {
        "failing"
    }

    fn create(&self, _options: &SmokerOptions) -> Box<dyn Reporter> {
        Box::new(FailingReporter::new("failing").fail_on_event())
    }
}

/// Writes a `package.json` into `dir`, creating it first.
pub fn write_package(dir: &Path, pkg_json: Value) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("package.json"), pkg_json.to_string()).unwrap();
}

/// A workspace in a fresh directory under `root`.
pub fn workspace(root: &Path, name: &str, extra: Value) -> WorkspaceInfo {
    let dir = root.join(name);
    let mut pkg_json = json!({ "name": name, "version": "1.0.0" });
    if let (Some(target), Value::Object(fields)) = (pkg_json.as_object_mut(), extra) {
        target.extend(fields);
    }
    write_package(&dir, pkg_json);
    WorkspaceInfo::load(&dir).unwrap()
}
