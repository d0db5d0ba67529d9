//! Declares the target graph of a pipeline.
//!
//! ```text
//! requirements -> <c>:fetch -> <c>:patch -> <c>:build        (every component)
//!                                  <solver>:build -> <core>:build
//! ```
//!
//! Only components taking part under the solver selection are declared, so
//! an unselected optional solver contributes no targets at all.

use std::collections::BTreeMap;

use tracing::debug;

use super::dag::TargetGraph;
use super::types::ExecuteError;
use crate::action::fetch::archive_file_name;
use crate::action::{Action, BuildSpec, FetchSpec, PatchFile, PatchSet};
use crate::config::{ComponentConfig, ComponentRole, PipelineConfig, Requirement, SolverSelection};
use crate::paths::Layout;
use crate::target::{Stage, Target, TargetId};
use crate::util::hash::hash_file;

/// Build the target graph for `selection`.
pub fn declare_targets(
  config: &PipelineConfig,
  layout: &Layout,
  selection: SolverSelection,
) -> Result<TargetGraph, ExecuteError> {
  let components = config.participating(selection);
  let solvers: Vec<&ComponentConfig> = config.selected_solvers(selection);

  let mut targets = vec![Target::new(
    TargetId::Requirements,
    vec![],
    Action::CheckRequirements(requirements(config, &components, selection)),
  )?];

  for component in &components {
    targets.push(fetch_target(component, layout)?);
    targets.push(patch_target(config, component, layout)?);
    targets.push(build_target(component, &solvers, layout)?);
  }

  debug!(
    selection = %selection,
    components = components.len(),
    targets = targets.len(),
    "declared targets"
  );
  TargetGraph::new(targets)
}

fn requirements(
  config: &PipelineConfig,
  components: &[&ComponentConfig],
  selection: SolverSelection,
) -> Vec<Requirement> {
  let mut requirements = config.requirements_for(selection);

  let needs_patch = components.iter().any(|c| !c.patches.is_empty());
  let has_patch = requirements.iter().any(|r| r.tool.as_deref() == Some("patch"));
  if needs_patch && !has_patch {
    requirements.push(Requirement::tool("patch").with_hint("install GNU patch to apply source patches"));
  }

  requirements
}

fn fetch_target(component: &ComponentConfig, layout: &Layout) -> Result<Target, ExecuteError> {
  let name = &component.name;
  let spec = FetchSpec {
    component: name.clone(),
    source: component.source.clone(),
    download_path: layout.download_path(name, &archive_file_name(&component.source)),
    dest: layout.source_dir(name),
    staging: layout.staging_dir(name),
  };

  Ok(
    Target::new(TargetId::fetch(name), vec![TargetId::Requirements], Action::Fetch(spec))?
      .with_sentinel(layout.sentinel_path(name, Stage::Fetch)),
  )
}

fn patch_target(config: &PipelineConfig, component: &ComponentConfig, layout: &Layout) -> Result<Target, ExecuteError> {
  let name = &component.name;
  let patches = component
    .patches
    .iter()
    .map(|patch| {
      let path = config.resolve_path(patch);
      let sha256 = hash_file(&path)?;
      Ok(PatchFile {
        name: patch.display().to_string(),
        path,
        sha256,
      })
    })
    .collect::<Result<Vec<_>, ExecuteError>>()?;

  let set = PatchSet {
    component: name.clone(),
    tree: layout.source_dir(name),
    strip: component.patch_strip,
    patches,
  };

  Ok(
    Target::new(TargetId::patch(name), vec![TargetId::fetch(name)], Action::ApplyPatches(set))?
      .with_sentinel(layout.sentinel_path(name, Stage::Patch)),
  )
}

fn build_target(
  component: &ComponentConfig,
  solvers: &[&ComponentConfig],
  layout: &Layout,
) -> Result<Target, ExecuteError> {
  let name = &component.name;
  let src_dir = layout.source_dir(name);
  let out_dir = layout.artifact_dir(name);

  let mut env = BTreeMap::new();
  env.insert("NATIVEDEPS_ROOT".to_string(), layout.root().display().to_string());
  env.insert("SRC_DIR".to_string(), src_dir.display().to_string());
  env.insert("OUT_DIR".to_string(), out_dir.display().to_string());

  let mut prerequisites = vec![TargetId::patch(name)];

  if component.role == ComponentRole::Core {
    for solver in solvers {
      let var = solver.env_name();
      let dir = layout.artifact_dir(&solver.name);
      env.insert(format!("WITH_{}", var), "1".to_string());
      env.insert(format!("DEP_{}_LIB", var), dir.join("lib").display().to_string());
      env.insert(format!("DEP_{}_INCLUDE", var), dir.join("include").display().to_string());
      env.insert(format!("DEP_{}_DIR", var), dir.display().to_string());
      prerequisites.push(TargetId::build(&solver.name));
    }
  }

  env.extend(component.env.iter().map(|(k, v)| (k.clone(), v.clone())));

  let spec = BuildSpec {
    component: name.clone(),
    src_dir,
    out_dir: out_dir.clone(),
    steps: component.build.clone(),
    env,
    artifacts: component.artifacts.clone(),
    log_path: layout.log_path(name, Stage::Build),
  };

  Ok(
    Target::new(TargetId::build(name), prerequisites, Action::Build(spec))?
      .with_sentinel(layout.sentinel_path(name, Stage::Build))
      .with_output_dir(out_dir),
  )
}
