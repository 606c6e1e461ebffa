//! Runs package manager binaries on the host.

use std::process::Stdio;

use async_trait::async_trait;
use smoker_pkg::{ExecError, ExecOptions, ExecOutput, Executor, PkgManagerSpec};
use tokio::process::Command;
use tracing::debug;

/// [`Executor`] backed by `tokio::process`.
///
/// System package managers run their own binary. Catalog versions run
/// through `npx` so the exact version is fetched on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostExecutor;

#[async_trait]
impl Executor for HostExecutor {
    async fn exec(
        &self,
        spec: &PkgManagerSpec,
        args: &[String],
        opts: ExecOptions,
    ) -> Result<ExecOutput, ExecError> {
        let (program, argv) = command_line(spec, args);
        let command = std::iter::once(program.as_str())
            .chain(argv.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        debug!("Running `{}`", command);

        let mut cmd = Command::new(&program);
        cmd.args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(opts.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: command.clone(),
            source,
        })?;

        // Dropping the wait future drops the child, which kills it.
        let waited = match opts.signal {
            Some(signal) => tokio::select! {
                output = child.wait_with_output() => output,
                _ = signal.cancelled() => return Err(ExecError::Aborted { command }),
            },
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| ExecError::Spawn {
            command: command.clone(),
            source,
        })?;

        Ok(ExecOutput {
            command,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            failed: !output.status.success(),
        })
    }
}

fn npx() -> &'static str {
    if cfg!(windows) { "npx.cmd" } else { "npx" }
}

/// Program and arguments for running `args` with `spec`.
fn command_line(spec: &PkgManagerSpec, args: &[String]) -> (String, Vec<String>) {
    if spec.is_system {
        return (spec.bin.clone(), args.to_vec());
    }
    let mut argv = vec!["--yes".to_string(), format!("{}@{}", spec.name, spec.version)];
    argv.extend(args.iter().cloned());
    (npx().to_string(), argv)
}
