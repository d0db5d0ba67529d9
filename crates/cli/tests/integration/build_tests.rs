//! Build command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, ZCHAFF_STEP, strings};

#[test]
fn build_exports_core_library() {
  let env = TestEnv::new();

  env
    .cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"))
    .stdout(predicate::str::contains("libnusmv.so"));

  let library = std::fs::read_to_string(env.core_library()).unwrap();
  assert_eq!(library, "nusmv minisat=1 zchaff=0\n");
}

#[test]
fn build_is_idempotent() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();
  let sentinel = env.root().join("state/nusmv.build.json");
  let recorded = std::fs::read(&sentinel).unwrap();

  env
    .cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Everything is up to date"))
    .stdout(predicate::str::contains("Executed: 0"));

  assert_eq!(std::fs::read(&sentinel).unwrap(), recorded);
}

#[test]
fn build_all_solvers_reports_json() {
  let env = TestEnv::new();

  let report = env.json(&["build", "--solvers", "all", "--jobs", "2"]);

  assert_eq!(report["success"], true);
  assert_eq!(report["selection"], "all");
  assert_eq!(report["executed"].as_array().unwrap().len(), 10);
  let artifacts = strings(&report["artifacts"]);
  assert_eq!(artifacts.len(), 1);
  assert!(artifacts[0].ends_with("libnusmv.so"));
  let library = std::fs::read_to_string(env.core_library()).unwrap();
  assert_eq!(library, "nusmv minisat=1 zchaff=1\n");
}

#[test]
fn solver_selection_from_environment() {
  let env = TestEnv::new();

  env.cmd().env("NATIVEDEPS_SOLVERS", "all").arg("build").assert().success();

  assert!(env.root().join("artifacts/zchaff/lib/libsat.a").is_file());
}

#[test]
fn failing_solver_fails_build_and_names_target() {
  let env = TestEnv::new();
  env.write_config(&env.default_config().replace(ZCHAFF_STEP, "echo broken >&2; exit 7"));

  env
    .cmd()
    .args(["build", "--solvers", "all"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("zchaff:build failed"))
    .stderr(predicate::str::contains("broken"))
    .stdout(predicate::str::contains("nusmv:build"))
    .stdout(predicate::str::contains("skipped"));

  assert!(!env.core_library().exists());
  assert!(env.root().join("state/logs/zchaff.build.log").is_file());
}

#[test]
fn unmet_requirement_stops_before_fetching() {
  let env = TestEnv::new();
  let config = env
    .default_config()
    .replace("tool = \"sh\"", "tool = \"nativedeps-test-no-such-tool\"");
  env.write_config(&config);

  env
    .cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("target requirements failed"))
    .stderr(predicate::str::contains("a POSIX shell runs the build steps"));

  assert!(!env.root().join("sources").exists());
}

#[test]
fn root_flag_overrides_config() {
  let env = TestEnv::new();
  let other = env.dir().join("elsewhere");

  env.cmd().arg("--root").arg(&other).arg("build").assert().success();

  assert!(other.join("artifacts/nusmv/lib/libnusmv.so").is_file());
  assert!(!env.root().exists());
}

#[test]
fn changed_selection_rebuilds_only_the_core() {
  let env = TestEnv::new();
  env.cmd().arg("build").assert().success();

  let report = env.json(&["build", "--solvers", "all"]);

  assert_eq!(
    strings(&report["executed"]),
    vec!["nusmv:build", "requirements", "zchaff:build", "zchaff:fetch", "zchaff:patch"]
  );
}
