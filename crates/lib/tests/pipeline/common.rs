//! Shared fixtures for pipeline tests.
//!
//! A [`Project`] is a temporary directory holding three tiny upstream
//! archives (two solvers and a core) reachable through `file://` URLs, a
//! `nativedeps.toml` describing them and a `work/` tree.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use flate2::Compression;
use flate2::write::GzEncoder;
use nativedeps_lib::action::patch::ToolOutcome;
use nativedeps_lib::action::{Action, ActionError, ActionOutput, ActionRunner, HostRunner, PatchTool};
use nativedeps_lib::config::{PipelineConfig, SolverSelection};
use nativedeps_lib::execute::{BuildReport, ExecuteConfig, TargetGraph, declare_targets, realize};
use nativedeps_lib::paths::Layout;
use nativedeps_lib::target::TargetId;
use tempfile::TempDir;

const MINISAT_BUILD: &str = "printf 'minisat\\n' > libminisat.a\n";

const ZCHAFF_BUILD: &str = "printf 'zchaff\\n' > libsat.a\n";

const NUSMV_BUILD: &str = r#"test -f "$DEP_MINISAT_LIB/libminisat.a" || exit 3
if [ -n "$WITH_ZCHAFF" ]; then test -f "$DEP_ZCHAFF_LIB/libsat.a" || exit 4; fi
printf 'nusmv minisat=%s zchaff=%s\n' "${WITH_MINISAT:-0}" "${WITH_ZCHAFF:-0}" > libnusmv.so
if [ -f patched.txt ]; then cat patched.txt >> libnusmv.so; fi
"#;

pub struct Project {
  pub temp: TempDir,
  /// Patch files of the core, relative to the project directory.
  pub patches: Vec<String>,
  /// Tool every build requires.
  pub required_tool: String,
  /// Pin for the core archive.
  pub core_sha256: Option<String>,
}

impl Project {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let upstream = temp.path().join("upstream");
    fs::create_dir_all(&upstream).unwrap();

    write_tar_gz(
      &upstream.join("minisat-2.0.tar.gz"),
      "minisat-2.0",
      &[("build.sh", MINISAT_BUILD), ("Solver.h", "class Solver;\n")],
    );
    write_zip(
      &upstream.join("zchaff-2007.zip"),
      "zchaff64",
      &[("build.sh", ZCHAFF_BUILD), ("SAT.h", "int sat(void);\n")],
    );
    write_tar_gz(
      &upstream.join("NuSMV-2.5.4.tar.gz"),
      "NuSMV-2.5.4",
      &[("build.sh", NUSMV_BUILD), ("README", "NuSMV\n")],
    );

    let project = Self {
      temp,
      patches: Vec::new(),
      required_tool: "sh".to_string(),
      core_sha256: None,
    };
    project.write_config();
    project
  }

  pub fn dir(&self) -> &Path {
    self.temp.path()
  }

  pub fn config_path(&self) -> PathBuf {
    self.dir().join("nativedeps.toml")
  }

  /// Write a patch file of the core and declare it.
  pub fn add_patch(&mut self, name: &str, content: &str) {
    let relative = format!("patches/{}", name);
    let path = self.dir().join(&relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    if !self.patches.contains(&relative) {
      self.patches.push(relative);
    }
    self.write_config();
  }

  /// Render `nativedeps.toml` from the current settings.
  pub fn write_config(&self) {
    let upstream = self.dir().join("upstream");
    let url = |file: &str| format!("file://{}", upstream.join(file).display());
    let patches = self
      .patches
      .iter()
      .map(|p| format!("\"{}\"", p))
      .collect::<Vec<_>>()
      .join(", ");
    let sha = self
      .core_sha256
      .as_ref()
      .map(|s| format!("sha256 = \"{}\"\n", s))
      .unwrap_or_default();

    let content = format!(
      r#"root = "work"

[[requirement]]
tool = "{tool}"
hint = "needed by every build"

[[component]]
name = "minisat"
role = "solver"
build = ["sh build.sh"]
[component.source]
url = "{minisat}"
[[component.artifact]]
path = "libminisat.a"
kind = "static-lib"
[[component.artifact]]
path = "Solver.h"
kind = "header"

[[component]]
name = "zchaff"
role = "solver"
optional = true
build = ["sh build.sh"]
[component.source]
url = "{zchaff}"
[[component.artifact]]
path = "libsat.a"
kind = "static-lib"
[[component.artifact]]
path = "SAT.h"
kind = "header"

[[component]]
name = "nusmv"
role = "core"
build = ["sh build.sh"]
patches = [{patches}]
[component.source]
url = "{nusmv}"
{sha}
[[component.artifact]]
path = "libnusmv.so"
kind = "shared-lib"
"#,
      tool = self.required_tool,
      minisat = url("minisat-2.0.tar.gz"),
      zchaff = url("zchaff-2007.zip"),
      nusmv = url("NuSMV-2.5.4.tar.gz"),
      patches = patches,
      sha = sha,
    );
    fs::write(self.config_path(), content).unwrap();
  }

  pub fn config(&self) -> PipelineConfig {
    PipelineConfig::load(&self.config_path()).unwrap()
  }

  pub fn layout(&self) -> Layout {
    let config = self.config();
    Layout::new(config.resolve_path(&config.root))
  }

  pub fn graph(&self, selection: SolverSelection) -> TargetGraph {
    declare_targets(&self.config(), &self.layout(), selection).unwrap()
  }

  /// Realize with `runner` and the default execute settings of these tests.
  pub async fn realize_with<R: ActionRunner>(&self, selection: SolverSelection, runner: Arc<R>) -> BuildReport {
    realize(&self.graph(selection), runner, &execute_config()).await.unwrap()
  }

  /// Realize on the host.
  pub async fn build(&self, selection: SolverSelection) -> BuildReport {
    self.realize_with(selection, Arc::new(HostRunner::new(2))).await
  }

  /// Content of the exported core library.
  pub fn core_library(&self) -> String {
    fs::read_to_string(self.layout().artifact_dir("nusmv").join("lib").join("libnusmv.so")).unwrap()
  }

  /// Name and bytes of every sentinel in the work tree.
  pub fn sentinels(&self) -> Vec<(String, Vec<u8>)> {
    let state = self.layout().state_dir();
    let mut sentinels: Vec<(String, Vec<u8>)> = fs::read_dir(&state)
      .unwrap()
      .filter_map(Result::ok)
      .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
      .map(|e| (e.file_name().to_string_lossy().into_owned(), fs::read(e.path()).unwrap()))
      .collect();
    sentinels.sort();
    sentinels
  }
}

pub fn execute_config() -> ExecuteConfig {
  ExecuteConfig {
    jobs: 2,
    keep_going: false,
  }
}

pub fn ids(list: &[TargetId]) -> Vec<String> {
  let mut ids: Vec<String> = list.iter().map(ToString::to_string).collect();
  ids.sort();
  ids
}

/// Target id a runner can tell from the action alone.
pub fn action_label(action: &Action) -> String {
  match action {
    Action::CheckRequirements(_) => TargetId::Requirements.to_string(),
    Action::Fetch(spec) => TargetId::fetch(&spec.component).to_string(),
    Action::ApplyPatches(set) => TargetId::patch(&set.component).to_string(),
    Action::Build(spec) => TargetId::build(&spec.component).to_string(),
  }
}

/// Runner that touches nothing and records `start:`/`end:` events.
#[derive(Default)]
pub struct FakeRunner {
  pub events: Mutex<Vec<String>>,
  /// Targets whose action fails.
  pub failing: HashSet<String>,
}

impl FakeRunner {
  pub fn failing(targets: &[&str]) -> Self {
    Self {
      events: Mutex::new(Vec::new()),
      failing: targets.iter().map(|t| t.to_string()).collect(),
    }
  }

  pub fn events(&self) -> Vec<String> {
    self.events.lock().unwrap().clone()
  }

  /// Targets whose action started.
  pub fn started(&self) -> Vec<String> {
    let mut started: Vec<String> = self
      .events()
      .iter()
      .filter_map(|e| e.strip_prefix("start:").map(str::to_string))
      .collect();
    started.sort();
    started
  }

  pub fn position(&self, event: &str) -> usize {
    self
      .events()
      .iter()
      .position(|e| e == event)
      .unwrap_or_else(|| panic!("no event {}", event))
  }
}

impl ActionRunner for FakeRunner {
  async fn run(&self, action: &Action) -> Result<ActionOutput, ActionError> {
    let label = action_label(action);
    self.events.lock().unwrap().push(format!("start:{}", label));
    tokio::task::yield_now().await;
    self.events.lock().unwrap().push(format!("end:{}", label));

    if self.failing.contains(&label) {
      return Err(ActionError::Other(format!("{} failed", label)));
    }
    Ok(ActionOutput::new(label))
  }
}

/// Host runner whose requirement check always passes, so tests with patches
/// do not depend on a host `patch` binary.
pub struct TrustingRunner(pub HostRunner);

impl ActionRunner for TrustingRunner {
  async fn run(&self, action: &Action) -> Result<ActionOutput, ActionError> {
    match action {
      Action::CheckRequirements(_) => Ok(ActionOutput::new("requirements assumed")),
      other => self.0.run(other).await,
    }
  }
}

/// Patch tool that appends each patch's content to `patched.txt` and
/// rejects patches containing `CONFLICT`.
pub struct AppendTool;

impl PatchTool for AppendTool {
  fn apply(&self, tree: &Path, patch: &Path, _strip: u32) -> std::io::Result<ToolOutcome> {
    let content = fs::read_to_string(patch)?;
    if content.contains("CONFLICT") {
      return Ok(ToolOutcome::Rejected("1 out of 1 hunk FAILED".to_string()));
    }
    let mut file = fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(tree.join("patched.txt"))?;
    file.write_all(content.as_bytes())?;
    Ok(ToolOutcome::Applied)
  }
}

pub fn patching_runner() -> Arc<TrustingRunner> {
  Arc::new(TrustingRunner(HostRunner::new(2).with_patch_tool(Arc::new(AppendTool))))
}

fn write_tar_gz(archive: &Path, top: &str, files: &[(&str, &str)]) {
  let encoder = GzEncoder::new(File::create(archive).unwrap(), Compression::default());
  let mut builder = tar::Builder::new(encoder);
  for (name, content) in files {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
      .append_data(&mut header, format!("{}/{}", top, name), content.as_bytes())
      .unwrap();
  }
  builder.into_inner().unwrap().finish().unwrap();
}

fn write_zip(archive: &Path, top: &str, files: &[(&str, &str)]) {
  let mut writer = zip::ZipWriter::new(File::create(archive).unwrap());
  let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
  for (name, content) in files {
    writer.start_file(format!("{}/{}", top, name), options).unwrap();
    writer.write_all(content.as_bytes()).unwrap();
  }
  writer.finish().unwrap();
}
