//! Shell command execution.
//!
//! Build steps and requirement commands run through the platform shell with
//! the caller's environment inherited, a fixed locale and
//! `SOURCE_DATE_EPOCH` for reproducible timestamps.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use super::patch::tail;
use crate::consts::{SOURCE_DATE_EPOCH, STDERR_TAIL_LINES};

#[derive(Debug, Error)]
pub enum CmdError {
  #[error("failed to spawn `{cmd}`: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  #[error("`{cmd}` exited with {}{}", exit_status(*code), stderr_suffix(stderr_tail))]
  Failed {
    cmd: String,
    code: Option<i32>,
    stderr_tail: String,
  },
}

fn exit_status(code: Option<i32>) -> String {
  match code {
    Some(code) => format!("status {}", code),
    None => "a signal".to_string(),
  }
}

fn stderr_suffix(tail: &str) -> String {
  if tail.is_empty() {
    String::new()
  } else {
    format!(":\n{}", tail)
  }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
  pub cmd: String,
  pub code: Option<i32>,
  pub success: bool,
  pub stdout: String,
  pub stderr: String,
}

impl CmdOutput {
  /// Turn a failed run into a [`CmdError::Failed`] carrying the stderr tail.
  pub fn check(self) -> Result<Self, CmdError> {
    if self.success {
      Ok(self)
    } else {
      Err(CmdError::Failed {
        stderr_tail: tail(&self.stderr, STDERR_TAIL_LINES),
        cmd: self.cmd,
        code: self.code,
      })
    }
  }
}

/// Run `cmd` through the shell in `cwd` with `env` added to the inherited
/// environment.
///
/// A non-zero exit is not an error here; see [`CmdOutput::check`].
pub async fn run_shell(
  cmd: &str,
  cwd: &Path,
  env: &BTreeMap<String, String>,
  shell: Option<&str>,
) -> Result<CmdOutput, CmdError> {
  let (shell_cmd, shell_args) = get_shell(shell);

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(cmd)
    .current_dir(cwd)
    .env("LC_ALL", "C")
    .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
    .envs(env)
    .kill_on_drop(true);

  debug!(cmd = %cmd, shell = %shell_cmd, cwd = %cwd.display(), "spawning process");

  let output = command.output().await.map_err(|source| CmdError::Spawn {
    cmd: cmd.to_string(),
    source,
  })?;

  Ok(CmdOutput {
    cmd: cmd.to_string(),
    code: output.status.code(),
    success: output.status.success(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  })
}

/// Shell program and the arguments that precede the command string.
///
/// Defaults to `/bin/sh -c` rather than `$SHELL`, whose profile files could
/// change the build environment.
pub fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
