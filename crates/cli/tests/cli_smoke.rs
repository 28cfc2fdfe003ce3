//! CLI smoke tests for kiln.
//!
//! Each test lays out a throwaway project, runs the binary against it, and
//! checks exit codes plus what lands on disk.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the kiln binary.
fn kiln_cmd() -> Command {
  cargo_bin_cmd!("kiln")
}

/// Create a temp project with a config and one module.
fn temp_project(module: &str) -> TempDir {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("kiln.lua"), "return { namespace = 'smoke' }").unwrap();
  std::fs::create_dir(temp.path().join("src")).unwrap();
  std::fs::write(temp.path().join("src/index.lua"), module).unwrap();
  temp
}

const GREET_MODULE: &str = "pack.func('greet', 'say hi')\n";

#[test]
fn help_shows_the_commands() {
  kiln_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("build"))
    .stdout(predicate::str::contains("watch"))
    .stdout(predicate::str::contains("clean"));
}

#[test]
fn version_runs() {
  kiln_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("kiln"));
}

#[test]
fn builds_a_temp_project() {
  let temp = temp_project(GREET_MODULE);

  kiln_cmd()
    .current_dir(temp.path())
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("built 1 resource"));

  let function = temp.path().join("dist/server/smoke/functions/greet.fn");
  assert_eq!(std::fs::read_to_string(function).unwrap(), "say hi\n");
  assert!(temp.path().join("dist/server/pack.json").is_file());
}

#[test]
fn dry_run_leaves_the_project_untouched() {
  let temp = temp_project(GREET_MODULE);

  kiln_cmd()
    .current_dir(temp.path())
    .args(["build", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("dry run"));

  assert!(!temp.path().join("dist").exists());
  assert!(!temp.path().join(".kiln").exists());
}

#[test]
fn conflicting_target_flags_fail() {
  let temp = temp_project(GREET_MODULE);

  kiln_cmd()
    .current_dir(temp.path())
    .args(["build", "--root", "out", "--world", "alpha"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn missing_config_fails_with_a_clear_error() {
  let temp = TempDir::new().unwrap();

  kiln_cmd()
    .current_dir(temp.path())
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("kiln.lua"));
}

#[test]
fn failed_builds_exit_nonzero() {
  let temp = temp_project("error('kaput')\n");

  kiln_cmd()
    .current_dir(temp.path())
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("src/index.lua"))
    .stderr(predicate::str::contains("kaput"));
}

#[test]
fn json_format_emits_a_machine_report() {
  let temp = temp_project(GREET_MODULE);

  kiln_cmd()
    .current_dir(temp.path())
    .args(["build", "--format", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"success\": true"))
    .stdout(predicate::str::contains("\"files_written\": 2"));
}

#[test]
fn clean_removes_outputs_and_metadata() {
  let temp = temp_project(GREET_MODULE);

  kiln_cmd().current_dir(temp.path()).arg("build").assert().success();
  assert!(temp.path().join("dist").is_dir());
  assert!(temp.path().join(".kiln").is_dir());

  kiln_cmd()
    .current_dir(temp.path())
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("removed"));

  assert!(!temp.path().join("dist").exists());
  assert!(!temp.path().join(".kiln").exists());
}
