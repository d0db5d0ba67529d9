//! Status, plan and check integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn status_after_build_shows_core_artifact() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();

  env
    .cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("built"))
    .stdout(predicate::str::contains("libnusmv.so"));
}

#[test]
fn status_json_reports_states() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();

  let status = env.json(&["status"]);
  let components = status["components"].as_array().unwrap();

  assert_eq!(components.len(), 3);
  let state = |name: &str| {
    components
      .iter()
      .find(|c| c["name"] == name)
      .map(|c| c["state"].as_str().unwrap().to_string())
      .unwrap()
  };
  assert_eq!(state("minisat"), "built");
  assert_eq!(state("zchaff"), "absent");
  assert_eq!(state("nusmv"), "built");
}

#[test]
fn status_flags_stale_dependents() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();
  env.cmd().args(["clean", "minisat"]).assert().success();

  let status = env.json(&["status"]);
  let core = status["components"]
    .as_array()
    .unwrap()
    .iter()
    .find(|c| c["name"] == "nusmv")
    .cloned()
    .unwrap();

  assert_eq!(core["state"], "built");
  assert_eq!(core["stale"], true);
}

#[test]
fn plan_after_build_has_nothing_to_do() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();

  env
    .cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to do"))
    .stdout(predicate::str::contains("pending").not());

  let plan = env.json(&["plan", "--solvers", "all"]);
  let pending: Vec<&serde_json::Value> = plan["waves"]
    .as_array()
    .unwrap()
    .iter()
    .flat_map(|w| w.as_array().unwrap())
    .filter(|e| e["state"] == "pending")
    .collect();
  assert_eq!(pending.len(), 4);
}

#[test]
fn check_reports_requirements() {
  let env = TestEnv::new();

  env
    .cmd()
    .arg("check")
    .assert()
    .success()
    .stdout(predicate::str::contains("tool `sh`"))
    .stdout(predicate::str::contains("All 1 requirement(s) met"));
}

#[test]
fn check_fails_on_unmet_requirement() {
  let env = TestEnv::new();
  let config = env
    .default_config()
    .replace("tool = \"sh\"", "tool = \"nativedeps-test-no-such-tool\"");
  env.write_config(&config);

  env
    .cmd()
    .arg("check")
    .assert()
    .failure()
    .stdout(predicate::str::contains("a POSIX shell runs the build steps"))
    .stderr(predicate::str::contains("1 host requirement(s) not met"));
}
