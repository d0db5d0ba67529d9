use std::fs;

use nativedeps_lib::action::patch::PatchLedger;
use nativedeps_lib::action::{ActionError, FetchError, PatchError};
use nativedeps_lib::clean::{CleanOptions, clean};
use nativedeps_lib::config::SolverSelection;
use nativedeps_lib::execute::status::{ComponentState, component_status};
use nativedeps_lib::execute::{ExecuteError, SkipReason};
use nativedeps_lib::requirements::RequirementError;
use nativedeps_lib::target::{Stage, TargetId};

use super::common::{Project, ids, patching_runner};

#[tokio::test]
async fn fresh_build_exports_core_library() {
  let project = Project::new();

  let report = project.build(SolverSelection::Default).await;

  assert!(report.is_success(), "{:?}", report.failed);
  assert_eq!(project.core_library(), "nusmv minisat=1 zchaff=0\n");
  let layout = project.layout();
  assert!(layout.artifact_dir("minisat").join("include/Solver.h").is_file());
  assert!(layout.log_path("nusmv", Stage::Build).is_file());
}

#[tokio::test]
async fn archives_sharing_a_file_name_stay_apart() {
  let project = Project::new();
  let upstream = project.dir().join("upstream");
  for (dir, archive) in [("a", "minisat-2.0.tar.gz"), ("b", "NuSMV-2.5.4.tar.gz")] {
    fs::create_dir_all(upstream.join(dir)).unwrap();
    fs::rename(upstream.join(archive), upstream.join(dir).join("src.tar.gz")).unwrap();
  }
  let config = fs::read_to_string(project.config_path())
    .unwrap()
    .replace("upstream/minisat-2.0.tar.gz", "upstream/a/src.tar.gz")
    .replace("upstream/NuSMV-2.5.4.tar.gz", "upstream/b/src.tar.gz");
  fs::write(project.config_path(), config).unwrap();

  let report = project.build(SolverSelection::Default).await;

  assert!(report.is_success(), "{:?}", report.failed);
  let layout = project.layout();
  assert!(layout.source_dir("minisat").join("Solver.h").is_file());
  assert!(layout.source_dir("nusmv").join("README").is_file());
  assert!(!layout.source_dir("nusmv").join("Solver.h").exists());
  assert!(layout.download_path("minisat", "src.tar.gz").is_file());
  assert!(layout.download_path("nusmv", "src.tar.gz").is_file());
  assert_eq!(project.core_library(), "nusmv minisat=1 zchaff=0\n");
}

#[tokio::test]
async fn second_build_runs_nothing_and_writes_nothing() {
  let project = Project::new();
  project.build(SolverSelection::Default).await;
  let sentinels = project.sentinels();
  assert_eq!(sentinels.len(), 6);

  let report = project.build(SolverSelection::Default).await;

  assert!(report.executed.is_empty());
  assert_eq!(report.up_to_date.len(), 7);
  assert_eq!(project.sentinels(), sentinels);
}

#[tokio::test]
async fn all_selection_links_both_solvers() {
  let project = Project::new();

  let report = project.build(SolverSelection::All).await;

  assert!(report.is_success(), "{:?}", report.failed);
  assert_eq!(project.core_library(), "nusmv minisat=1 zchaff=1\n");
  assert!(project.layout().artifact_dir("zchaff").join("lib/libsat.a").is_file());
}

#[tokio::test]
async fn selection_change_rebuilds_core_against_new_solvers() {
  let project = Project::new();
  project.build(SolverSelection::All).await;

  let report = project.build(SolverSelection::Default).await;

  assert_eq!(ids(&report.executed), vec!["nusmv:build", "requirements"]);
  assert_eq!(project.core_library(), "nusmv minisat=1 zchaff=0\n");
}

#[tokio::test]
async fn tampered_artifacts_are_rebuilt() {
  let project = Project::new();
  project.build(SolverSelection::Default).await;
  let library = project.layout().artifact_dir("minisat").join("lib/libminisat.a");
  fs::write(&library, "garbage").unwrap();

  let report = project.build(SolverSelection::Default).await;

  assert_eq!(ids(&report.executed), vec!["minisat:build", "nusmv:build", "requirements"]);
  assert_eq!(fs::read_to_string(&library).unwrap(), "minisat\n");
}

#[tokio::test]
async fn unmet_requirement_prevents_any_fetch() {
  let mut project = Project::new();
  project.required_tool = "nativedeps-test-no-such-tool".to_string();
  project.write_config();

  let report = project.build(SolverSelection::Default).await;

  let (id, err) = report.first_failure().unwrap();
  assert_eq!(id, &TargetId::Requirements);
  match err {
    ExecuteError::Action(ActionError::Requirements(RequirementError::Unmet { unmet })) => {
      assert_eq!(unmet.len(), 1);
      assert!(unmet[0].contains("needed by every build"));
    }
    other => panic!("unexpected error {other:?}"),
  }
  assert!(report.executed.is_empty());
  assert!(!project.layout().sources_dir().exists());
  assert!(!project.layout().downloads_dir().exists());
}

#[tokio::test]
async fn checksum_mismatch_is_fatal_and_leaves_no_tree() {
  let mut project = Project::new();
  project.core_sha256 = Some("0".repeat(64));
  project.write_config();

  let report = project.build(SolverSelection::Default).await;

  let (id, err) = report.first_failure().unwrap();
  assert_eq!(id, &TargetId::fetch("nusmv"));
  assert!(matches!(
    err,
    ExecuteError::Action(ActionError::Fetch(FetchError::ChecksumMismatch { .. }))
  ));
  let layout = project.layout();
  assert!(!layout.source_dir("nusmv").exists());
  assert!(!layout.sentinel_path("nusmv", Stage::Fetch).exists());
  assert_eq!(report.skipped[&TargetId::patch("nusmv")], SkipReason::FailedDependency(TargetId::fetch("nusmv")));
}

#[tokio::test]
async fn dirty_source_tree_must_be_cleaned() {
  let project = Project::new();
  let layout = project.layout();
  fs::create_dir_all(layout.source_dir("minisat")).unwrap();
  fs::write(layout.source_dir("minisat").join("leftover.o"), "").unwrap();

  let report = project.build(SolverSelection::Default).await;
  let (id, err) = report.first_failure().unwrap();
  assert_eq!(id, &TargetId::fetch("minisat"));
  assert!(matches!(
    err,
    ExecuteError::Action(ActionError::Fetch(FetchError::DirtyTree { .. }))
  ));

  let options = CleanOptions {
    components: vec!["minisat".to_string()],
    ..CleanOptions::default()
  };
  clean(&project.config(), &layout, &options).unwrap();

  let report = project.build(SolverSelection::Default).await;
  assert!(report.is_success(), "{:?}", report.failed);
}

#[tokio::test]
async fn reapplying_patches_equals_applying_once() {
  let mut project = Project::new();
  project.add_patch("01-fpic.patch", "fpic\n");
  project.add_patch("02-solvers.patch", "solvers\n");

  let report = project.realize_with(SolverSelection::Default, patching_runner()).await;
  assert!(report.is_success(), "{:?}", report.failed);
  let library = project.core_library();
  assert_eq!(library, "nusmv minisat=1 zchaff=0\nfpic\nsolvers\n");

  let layout = project.layout();
  fs::remove_file(layout.sentinel_path("nusmv", Stage::Patch)).unwrap();

  let report = project.realize_with(SolverSelection::Default, patching_runner()).await;
  assert_eq!(ids(&report.executed), vec!["nusmv:build", "nusmv:patch", "requirements"]);
  assert_eq!(
    report.outputs[&TargetId::patch("nusmv")].summary,
    "applied 0, already applied 2"
  );
  assert_eq!(project.core_library(), library);
}

#[tokio::test]
async fn patch_conflict_leaves_partial_marker() {
  let mut project = Project::new();
  project.add_patch("01-fpic.patch", "fpic\n");
  project.add_patch("02-broken.patch", "CONFLICT\n");
  project.add_patch("03-never.patch", "never\n");

  let report = project.realize_with(SolverSelection::Default, patching_runner()).await;

  let (id, err) = report.first_failure().unwrap();
  assert_eq!(id, &TargetId::patch("nusmv"));
  assert!(matches!(
    err,
    ExecuteError::Action(ActionError::Patch(PatchError::Conflict { .. }))
  ));
  assert_eq!(
    report.skipped[&TargetId::build("nusmv")],
    SkipReason::FailedDependency(TargetId::patch("nusmv"))
  );

  let layout = project.layout();
  let tree = layout.source_dir("nusmv");
  let ledger = PatchLedger::read(&tree).unwrap().unwrap();
  assert!(ledger.is_partial());
  assert_eq!(ledger.applied.len(), 1);
  assert_eq!(ledger.failed.unwrap().name, "patches/02-broken.patch");
  assert_eq!(fs::read_to_string(tree.join("patched.txt")).unwrap(), "fpic\n");

  let statuses = component_status(&project.config(), &layout, SolverSelection::Default).unwrap();
  let core = statuses.iter().find(|s| s.name == "nusmv").unwrap();
  assert_eq!(core.state, ComponentState::Fetched);
  assert!(core.patch_partial);
}

#[tokio::test]
async fn partial_tree_is_refused_until_cleaned() {
  let mut project = Project::new();
  project.add_patch("01-fpic.patch", "fpic\n");
  project.add_patch("02-broken.patch", "CONFLICT\n");
  project.realize_with(SolverSelection::Default, patching_runner()).await;

  project.add_patch("02-broken.patch", "fixed\n");
  let report = project.realize_with(SolverSelection::Default, patching_runner()).await;
  let (_, err) = report.first_failure().unwrap();
  assert!(matches!(
    err,
    ExecuteError::Action(ActionError::Patch(PatchError::PartialTree { .. }))
  ));

  let options = CleanOptions {
    components: vec!["nusmv".to_string()],
    keep_downloads: true,
    dry_run: false,
  };
  clean(&project.config(), &project.layout(), &options).unwrap();

  let report = project.realize_with(SolverSelection::Default, patching_runner()).await;
  assert!(report.is_success(), "{:?}", report.failed);
  assert_eq!(project.core_library(), "nusmv minisat=1 zchaff=0\nfpic\nfixed\n");
}
