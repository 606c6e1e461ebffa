//! CLI argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use smoker_core::SmokerOptions;

/// smoker - Smoke test npm packages
#[derive(Parser)]
#[command(name = "smoker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Working directory (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack, install, lint and run scripts against the workspaces
    Run(RunArgs),

    /// List available components
    List {
        #[arg(value_enum)]
        kind: ListKind,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Scripts to run in each installed package
    pub scripts: Vec<String>,

    /// Package manager to use, e.g. npm@9 or pnpm@system (repeatable)
    #[arg(long = "pm", value_name = "SPEC")]
    pub pkg_manager: Vec<String>,

    /// Workspace to test, by name or path (repeatable)
    #[arg(short, long, value_name = "NAME")]
    pub workspace: Vec<String>,

    /// Test every public workspace
    #[arg(short, long)]
    pub all: bool,

    /// Also test the workspace root
    #[arg(long)]
    pub include_root: bool,

    /// Additional dependency to install (repeatable)
    #[arg(long, value_name = "DEP")]
    pub add: Vec<String>,

    /// Run lint rules (default)
    #[arg(long, overrides_with = "no_lint")]
    pub lint: bool,

    /// Skip lint rules
    #[arg(long)]
    pub no_lint: bool,

    /// Skip scripts a package does not define instead of failing
    #[arg(long)]
    pub loose: bool,

    /// Stop running scripts after the first failure
    #[arg(long)]
    pub bail: bool,

    /// Keep temp directories after the run
    #[arg(long)]
    pub linger: bool,

    /// Output a JSON report
    #[arg(long)]
    pub json: bool,

    /// Reporter to use (repeatable)
    #[arg(long, value_name = "NAME")]
    pub reporter: Vec<String>,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Additional component set to load (repeatable)
    #[arg(long, value_name = "NAME")]
    pub plugin: Vec<String>,
}

impl RunArgs {
    /// Applies flags on top of file configuration. Lists given on the
    /// command line replace the configured ones.
    pub fn apply(&self, options: &mut SmokerOptions) {
        replace_if_set(&mut options.script, &self.scripts);
        replace_if_set(&mut options.pkg_manager, &self.pkg_manager);
        replace_if_set(&mut options.workspace, &self.workspace);
        replace_if_set(&mut options.add, &self.add);
        replace_if_set(&mut options.reporter, &self.reporter);
        replace_if_set(&mut options.plugin, &self.plugin);

        options.all |= self.all;
        options.include_root |= self.include_root;
        options.loose |= self.loose;
        options.bail |= self.bail;
        options.linger |= self.linger;
        options.json |= self.json;

        if self.no_lint {
            options.lint = false;
        } else if self.lint {
            options.lint = true;
        }
        if self.timeout.is_some() {
            options.timeout = self.timeout;
        }
    }
}

fn replace_if_set(target: &mut Vec<String>, values: &[String]) {
    if !values.is_empty() {
        *target = values.to_vec();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ListKind {
    /// Package managers and their known versions
    PkgManagers,
    /// Lint rules
    Rules,
    /// Reporters
    Reporters,
}
