//! Shared test helpers for CLI integration tests.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

/// Build step of the optional solver; tests replace it to make it fail.
pub const ZCHAFF_STEP: &str = r#"printf "zchaff\n" > libsat.a"#;

/// Isolated test environment.
///
/// Each test gets its own directory holding upstream archives, a
/// `nativedeps.toml` that fetches them through `file://` URLs and the work
/// tree `work/`.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let env = Self { temp };

    let upstream = env.dir().join("upstream");
    fs::create_dir_all(&upstream).unwrap();
    write_tar_gz(&upstream.join("minisat-2.0.tar.gz"), "minisat-2.0", &[("Solver.h", "class Solver;\n")]);
    write_tar_gz(&upstream.join("zchaff-2007.tar.gz"), "zchaff64", &[("SAT.h", "int sat(void);\n")]);
    write_tar_gz(&upstream.join("NuSMV-2.5.4.tar.gz"), "NuSMV-2.5.4", &[("README", "NuSMV\n")]);

    env.write_config(&env.default_config());
    env
  }

  /// Canonical path of the test directory.
  pub fn dir(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap_or_else(|_| self.temp.path().to_path_buf())
  }

  pub fn config_path(&self) -> PathBuf {
    self.dir().join("nativedeps.toml")
  }

  /// Work tree declared by the configuration.
  pub fn root(&self) -> PathBuf {
    self.dir().join("work")
  }

  pub fn core_library(&self) -> PathBuf {
    self.root().join("artifacts/nusmv/lib/libnusmv.so")
  }

  pub fn default_config(&self) -> String {
    let url = |file: &str| format!("file://{}", self.dir().join("upstream").join(file).display());
    format!(
      r#"root = "work"

[[requirement]]
tool = "sh"
hint = "a POSIX shell runs the build steps"

[[component]]
name = "minisat"
role = "solver"
build = ['printf "minisat\n" > libminisat.a']
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
build = ['{zchaff_step}']
[component.source]
url = "{zchaff}"
[[component.artifact]]
path = "libsat.a"
kind = "static-lib"

[[component]]
name = "nusmv"
role = "core"
build = [
  'test -f "$DEP_MINISAT_LIB/libminisat.a"',
  'printf "nusmv minisat=%s zchaff=%s\n" "${{WITH_MINISAT:-0}}" "${{WITH_ZCHAFF:-0}}" > libnusmv.so',
]
[component.source]
url = "{nusmv}"
[[component.artifact]]
path = "libnusmv.so"
kind = "shared-lib"
"#,
      minisat = url("minisat-2.0.tar.gz"),
      zchaff = url("zchaff-2007.tar.gz"),
      nusmv = url("NuSMV-2.5.4.tar.gz"),
      zchaff_step = ZCHAFF_STEP,
    )
  }

  pub fn write_config(&self, content: &str) {
    fs::write(self.config_path(), content).unwrap();
  }

  /// Get a pre-configured Command for the nativedeps binary.
  ///
  /// Runs in the test directory with every `NATIVEDEPS_*` variable removed,
  /// so the configuration in the directory decides everything.
  pub fn cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("nativedeps");
    cmd
      .current_dir(self.dir())
      .env_remove("NATIVEDEPS_CONFIG")
      .env_remove("NATIVEDEPS_ROOT")
      .env_remove("NATIVEDEPS_SOLVERS")
      .env_remove("NATIVEDEPS_JOBS")
      .env_remove("RUST_LOG")
      .env("NO_COLOR", "1");
    cmd
  }

  /// Run a command with `--output json` and parse its stdout.
  pub fn json(&self, args: &[&str]) -> serde_json::Value {
    let output = self.cmd().args(["--output", "json"]).args(args).output().unwrap();
    serde_json::from_slice(&output.stdout)
      .unwrap_or_else(|e| panic!("invalid JSON from {:?}: {}\n{}", args, e, String::from_utf8_lossy(&output.stdout)))
  }
}

/// Sorted strings of a JSON array.
pub fn strings(value: &serde_json::Value) -> Vec<String> {
  let mut list: Vec<String> = value
    .as_array()
    .unwrap()
    .iter()
    .map(|v| v.as_str().unwrap().to_string())
    .collect();
  list.sort();
  list
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
