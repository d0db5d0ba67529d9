//! Clean command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, strings};

#[test]
fn clean_after_build_returns_to_pre_fetch_state() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();

  env
    .cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Clean complete"));

  for dir in ["sources", "artifacts", "state", "downloads"] {
    assert!(!env.root().join(dir).exists(), "{} still exists", dir);
  }
}

#[test]
fn clean_then_build_reproduces_artifacts() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();
  let fresh = std::fs::read(env.core_library()).unwrap();

  env.cmd().arg("clean").assert().success();
  env.cmd().arg("build").assert().success();

  assert_eq!(std::fs::read(env.core_library()).unwrap(), fresh);
}

#[test]
fn dry_run_removes_nothing() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();

  env
    .cmd()
    .args(["clean", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Would remove"))
    .stdout(predicate::str::contains("Dry run"));

  assert!(env.core_library().is_file());
}

#[test]
fn keep_downloads_keeps_archives() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();

  env.cmd().args(["clean", "--keep-downloads"]).assert().success();

  assert!(env.root().join("downloads/nusmv/NuSMV-2.5.4.tar.gz").is_file());
  assert!(!env.root().join("sources").exists());
}

#[test]
fn component_clean_rebuilds_dependents() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();

  env.cmd().args(["clean", "minisat"]).assert().success();
  assert!(env.root().join("sources/nusmv").is_dir());

  let report = env.json(&["build"]);
  assert_eq!(
    strings(&report["executed"]),
    vec!["minisat:build", "minisat:fetch", "minisat:patch", "nusmv:build", "requirements"]
  );
}

#[test]
fn unknown_component_is_rejected() {
  let env = TestEnv::new();

  env
    .cmd()
    .args(["clean", "glucose"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown component 'glucose'"));
}

#[test]
fn clean_json_lists_removed_paths() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();

  let report = env.json(&["clean", "--dry-run"]);

  assert_eq!(report["dry_run"], true);
  assert_eq!(report["removed"].as_array().unwrap().len(), 4);
}
