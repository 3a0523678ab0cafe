//! Dependency graph over registered transforms.
//!
//! An edge runs from the transform that produced a stream to every transform
//! that consumes or references it. The graph is handed to an external
//! scheduler; nothing here runs transforms.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::stream::TransformId;

use super::types::RegisteredTransform;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("cycle detected between transforms")]
  CycleDetected,
}

pub struct TransformGraph {
  graph: DiGraph<TransformId, ()>,
  nodes: HashMap<TransformId, NodeIndex>,
}

impl TransformGraph {
  pub fn from_registrations(registrations: &[RegisteredTransform]) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for registered in registrations {
      nodes.insert(registered.id, graph.add_node(registered.id));
    }

    for registered in registrations {
      let dependent = nodes[&registered.id];
      for producer in registered.upstream() {
        // Producers outside this set were registered elsewhere.
        if let Some(&dependency) = nodes.get(&producer) {
          graph.update_edge(dependency, dependent, ());
        }
      }
    }

    let dag = Self { graph, nodes };
    toposort(&dag.graph, None).map_err(|_| GraphError::CycleDetected)?;
    Ok(dag)
  }

  /// Transforms in an order where producers come before consumers.
  pub fn topological(&self) -> Result<Vec<TransformId>, GraphError> {
    let sorted = toposort(&self.graph, None).map_err(|_| GraphError::CycleDetected)?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx]).collect())
  }

  /// Transforms whose output `id` reads.
  pub fn dependencies(&self, id: TransformId) -> Vec<TransformId> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Transforms reading the output of `id`.
  pub fn dependents(&self, id: TransformId) -> Vec<TransformId> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: TransformId, direction: Direction) -> Vec<TransformId> {
    let Some(&idx) = self.nodes.get(&id) else {
      return Vec::new();
    };
    let mut ids: Vec<TransformId> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|neighbor| self.graph[neighbor])
      .collect();
    ids.sort();
    ids
  }

  /// Groups of transforms that may run in parallel.
  ///
  /// Every transform's dependencies sit in earlier waves. Waves are sorted by
  /// registration order.
  pub fn waves(&self) -> Result<Vec<Vec<TransformId>>, GraphError> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let (ready, rest): (Vec<NodeIndex>, Vec<NodeIndex>) =
        remaining.into_iter().partition(|idx| in_degree[idx] == 0);

      if ready.is_empty() {
        return Err(GraphError::CycleDetected);
      }

      for &idx in &ready {
        for neighbor in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          if let Some(degree) = in_degree.get_mut(&neighbor) {
            *degree = degree.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<TransformId> = ready.into_iter().map(|idx| self.graph[idx]).collect();
      wave.sort();
      waves.push(wave);
      remaining = rest;
    }

    Ok(waves)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}
