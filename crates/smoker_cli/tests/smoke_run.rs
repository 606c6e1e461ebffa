//! End-to-end runs against a stand-in `npm`.
//!
//! A shell script named `npm` is put first on `PATH`. It packs with `tar`,
//! installs by unpacking into `node_modules`, and runs scripts named `fail`
//! with a non-zero exit code.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const FAKE_NPM: &str = r#"#!/bin/sh
case "$1" in
  --version)
    echo "10.9.2"
    ;;
  pack)
    name=$(basename "$PWD")
    tar -czf "$4/$name.tgz" -C "$PWD" .
    printf '[{"filename":"%s.tgz"}]\n' "$name"
    ;;
  install)
    for spec in "$@"; do :; done
    case "$spec" in
      *.tgz)
        name=$(basename "$spec" .tgz)
        mkdir -p "node_modules/$name"
        tar -xzf "$spec" -C "node_modules/$name"
        ;;
    esac
    ;;
  run)
    if [ "$2" = "fail" ]; then
      echo "boom" >&2
      exit 1
    fi
    echo "ran $2"
    ;;
esac
"#;

struct Project {
    _temp: TempDir,
    root: PathBuf,
    bin_dir: PathBuf,
}

impl Project {
    /// A single-package project in a directory named after the package.
    fn new(pkg_json: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let bin_dir = temp.path().join("bin");
        fs::create_dir_all(&bin_dir).unwrap();
        let npm = bin_dir.join("npm");
        fs::write(&npm, FAKE_NPM).unwrap();
        fs::set_permissions(&npm, fs::Permissions::from_mode(0o755)).unwrap();

        let root = temp.path().join("fixture-pkg");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("package.json"), pkg_json).unwrap();
        fs::write(root.join("index.js"), "module.exports = 1;\n").unwrap();

        Self {
            _temp: temp,
            root,
            bin_dir,
        }
    }

    fn healthy() -> Self {
        Self::new(
            r#"{
                "name": "fixture-pkg",
                "version": "1.0.0",
                "main": "index.js",
                "files": ["index.js"],
                "scripts": { "test": "node index.js", "fail": "exit 1" }
            }"#,
        )
    }

    fn cmd(&self) -> Command {
        let path = std::env::var_os("PATH").unwrap_or_default();
        let mut dirs = vec![self.bin_dir.clone()];
        dirs.extend(std::env::split_paths(&path));

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_smoker"));
        cmd.current_dir(&self.root)
            .env("PATH", std::env::join_paths(dirs).unwrap());
        cmd
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

#[test]
fn passing_run_exits_zero() {
    let project = Project::healthy();
    project
        .cmd()
        .args(["run", "test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok test (fixture-pkg)"))
        .stdout(predicate::str::contains("Smoke test passed"));
}

#[test]
fn failing_script_exits_one() {
    let project = Project::healthy();
    project
        .cmd()
        .args(["run", "test", "fail"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Smoke test failed"));
}

#[test]
fn missing_script_fails_unless_loose() {
    let project = Project::healthy();
    project
        .cmd()
        .args(["run", "--no-lint", "build"])
        .assert()
        .code(1);

    project
        .cmd()
        .args(["run", "--no-lint", "--loose", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("skipped"));
}

#[test]
fn lint_failure_exits_one() {
    let project = Project::new(
        r#"{ "name": "fixture-pkg", "version": "1.0.0", "main": "missing.js" }"#,
    );
    project
        .cmd()
        .arg("run")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("no-missing-entry-point"));
}

#[test]
fn json_report_is_valid_json() {
    let project = Project::healthy();
    let output = project
        .cmd()
        .args(["run", "--json", "test"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["outcome"], "ok");
    let outcome = &report["pkgManagers"][0];
    assert_eq!(outcome["pkgManager"]["name"], "npm");
    assert_eq!(outcome["scripts"][0]["type"], "OK");
}

#[test]
fn config_file_supplies_scripts() {
    let project = Project::healthy();
    fs::write(
        project.root().join(".smokerrc.jsonc"),
        "// scripts to run\n{ \"script\": [\"test\"], \"lint\": false }\n",
    )
    .unwrap();

    project
        .cmd()
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok test (fixture-pkg)"));
}

#[test]
fn unknown_reporter_is_an_error() {
    let project = Project::healthy();
    project
        .cmd()
        .args(["run", "--reporter", "nope", "test"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nope"));
}

#[test]
fn unsupported_pkg_manager_is_an_error() {
    let project = Project::healthy();
    project
        .cmd()
        .args(["run", "--pm", "yarn@1", "test"])
        .assert()
        .code(2);
}
