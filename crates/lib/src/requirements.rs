//! Host requirement checks.
//!
//! Tools are resolved on `PATH` with `which`; command requirements must exit
//! successfully. Every requirement is checked so a single run reports all
//! that are missing.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::action::cmd::run_shell;
use crate::config::Requirement;

#[derive(Debug, Error)]
pub enum RequirementError {
  #[error("{} host requirement(s) not met:\n{}", unmet.len(), unmet.join("\n"))]
  Unmet { unmet: Vec<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementResult {
  pub requirement: Requirement,
  pub satisfied: bool,
  /// Resolved tool path, or why the requirement failed.
  pub detail: String,
}

impl RequirementResult {
  /// One-line explanation, including the hint for unmet requirements.
  pub fn message(&self) -> String {
    let mut message = format!("{}: {}", self.requirement.describe(), self.detail);
    if !self.satisfied
      && let Some(hint) = &self.requirement.hint
    {
      message.push_str(&format!(" ({})", hint));
    }
    message
  }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RequirementReport {
  pub results: Vec<RequirementResult>,
}

impl RequirementReport {
  pub fn all_satisfied(&self) -> bool {
    self.results.iter().all(|r| r.satisfied)
  }

  pub fn into_result(self) -> Result<Self, RequirementError> {
    if self.all_satisfied() {
      return Ok(self);
    }
    let unmet = self
      .results
      .iter()
      .filter(|r| !r.satisfied)
      .map(|r| format!("  - {}", r.message()))
      .collect();
    Err(RequirementError::Unmet { unmet })
  }
}

/// Check every requirement, in order.
pub async fn check_requirements(requirements: &[Requirement], shell: Option<&str>) -> RequirementReport {
  let mut results = Vec::with_capacity(requirements.len());

  for requirement in requirements {
    let (satisfied, detail) = match (&requirement.tool, &requirement.command) {
      (Some(tool), _) => check_tool(tool),
      (None, Some(command)) => check_command(command, shell).await,
      (None, None) => (false, "requirement names neither a tool nor a command".to_string()),
    };

    if satisfied {
      debug!(requirement = %requirement.describe(), detail = %detail, "requirement met");
    } else {
      warn!(requirement = %requirement.describe(), detail = %detail, "requirement not met");
    }

    results.push(RequirementResult {
      requirement: requirement.clone(),
      satisfied,
      detail,
    });
  }

  RequirementReport { results }
}

fn check_tool(tool: &str) -> (bool, String) {
  match which::which(tool) {
    Ok(path) => (true, display_path(path)),
    Err(_) => (false, "not found on PATH".to_string()),
  }
}

async fn check_command(command: &str, shell: Option<&str>) -> (bool, String) {
  let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
  match run_shell(command, &cwd, &BTreeMap::new(), shell).await {
    Ok(output) if output.success => (true, "ok".to_string()),
    Ok(output) => {
      let reason = output
        .stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| match output.code {
          Some(code) => format!("exited with status {}", code),
          None => "terminated by a signal".to_string(),
        });
      (false, reason)
    }
    Err(e) => (false, e.to_string()),
  }
}

fn display_path(path: PathBuf) -> String {
  path.display().to_string()
}
