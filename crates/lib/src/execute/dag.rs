//! Target graph.
//!
//! Holds the declared targets with an edge from every prerequisite to its
//! dependent, and computes topological order and parallel execution waves.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::types::ExecuteError;
use crate::target::{Target, TargetId};

pub struct TargetGraph {
  graph: DiGraph<TargetId, ()>,
  nodes: HashMap<TargetId, NodeIndex>,
  targets: BTreeMap<TargetId, Target>,
}

impl TargetGraph {
  /// Build the graph from declared targets.
  ///
  /// Fails on duplicate ids, prerequisites that are not declared, and cycles.
  pub fn new(targets: Vec<Target>) -> Result<Self, ExecuteError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut by_id = BTreeMap::new();

    for target in targets {
      if nodes.contains_key(&target.id) {
        return Err(ExecuteError::DuplicateTarget(target.id));
      }
      let idx = graph.add_node(target.id.clone());
      nodes.insert(target.id.clone(), idx);
      by_id.insert(target.id.clone(), target);
    }

    for target in by_id.values() {
      let dependent = nodes[&target.id];
      for prereq in &target.prerequisites {
        let Some(&dep) = nodes.get(prereq) else {
          return Err(ExecuteError::UnknownPrerequisite {
            target: target.id.clone(),
            missing: prereq.clone(),
          });
        };
        graph.add_edge(dep, dependent, ());
      }
    }

    toposort(&graph, None).map_err(|_| ExecuteError::CycleDetected)?;

    Ok(Self {
      graph,
      nodes,
      targets: by_id,
    })
  }

  pub fn get(&self, id: &TargetId) -> Option<&Target> {
    self.targets.get(id)
  }

  /// Targets in id order.
  pub fn targets(&self) -> impl Iterator<Item = &Target> {
    self.targets.values()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  /// Direct prerequisites of a target, sorted.
  pub fn prerequisites(&self, id: &TargetId) -> Vec<TargetId> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Direct dependents of a target, sorted.
  pub fn dependents(&self, id: &TargetId) -> Vec<TargetId> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: &TargetId, direction: Direction) -> Vec<TargetId> {
    let Some(&idx) = self.nodes.get(id) else {
      return Vec::new();
    };
    let mut ids: Vec<TargetId> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect();
    ids.sort();
    ids.dedup();
    ids
  }

  /// All targets, prerequisites before dependents.
  pub fn topological(&self) -> Result<Vec<TargetId>, ExecuteError> {
    let sorted = toposort(&self.graph, None).map_err(|_| ExecuteError::CycleDetected)?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
  }

  /// Targets grouped into waves; every target's prerequisites are in earlier
  /// waves. Each wave is sorted by id.
  pub fn waves(&self) -> Result<Vec<Vec<TargetId>>, ExecuteError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[idx] == 0).copied().collect();
      if ready.is_empty() {
        return Err(ExecuteError::CycleDetected);
      }

      for &idx in &ready {
        remaining.remove(&idx);
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<TargetId> = ready.into_iter().map(|idx| self.graph[idx].clone()).collect();
      wave.sort();
      waves.push(wave);
    }

    Ok(waves)
  }
}
