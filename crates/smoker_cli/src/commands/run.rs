//! Run command implementation

use std::sync::Arc;
use std::time::Instant;

use miette::Result;
use smoker_core::{Smoker, SmokerOptions};
use tracing::{debug, info, warn};

use crate::cli::{Cli, RunArgs};
use crate::utils::{builtin_catalog, create_tokio_runtime, resolve_cwd};

/// Runs a smoke test. Returns `true` when anything failed.
pub fn run_smoke(cli: &Cli, args: &RunArgs) -> Result<bool> {
    let options = load_options(cli, args)?;
    debug!("Options: {:?}", options);

    let catalog = Arc::new(builtin_catalog()?);
    let smoker = Smoker::new(options, catalog);
    let signal = smoker.signal();

    let runtime = create_tokio_runtime()?;
    let start = Instant::now();
    let result = runtime.block_on(async {
        let interrupt = signal.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, aborting");
                interrupt.cancel();
            }
        });
        let result = smoker.smoke().await;
        watcher.abort();
        result
    })?;

    info!("Finished in {:.2?}", start.elapsed());
    Ok(result.has_failures())
}

/// Config file values with command-line flags applied on top.
fn load_options(cli: &Cli, args: &RunArgs) -> Result<SmokerOptions> {
    let cwd = resolve_cwd(cli.cwd.as_ref())?;
    let mut options = match &cli.config {
        Some(path) => SmokerOptions::from_file(path)?,
        None => {
            let (options, source) = SmokerOptions::discover(&cwd)?;
            if let Some(source) = source {
                info!("Loaded configuration from {}", source.display());
            }
            options
        }
    };
    options.cwd = cwd;
    args.apply(&mut options);
    options.verbose |= cli.verbose;
    Ok(options)
}
