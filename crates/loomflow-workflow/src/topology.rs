//! Reachability analysis over a runtime graph.
//!
//! Edge roles are computed once when a graph is built. An edge `s -> t` is
//! recursive when `s` can be reached from an entry but only through `t`
//! (self-loops included). Sources unreachable from every entry keep the
//! common role.

use std::collections::{HashMap, VecDeque};

use loomflow_config::NodeKind;

use crate::graph::{EdgeIndex, EdgeRole, NodeIndex, RuntimeGraph};

pub(crate) fn find_entries(graph: &RuntimeGraph) -> Vec<NodeIndex> {
  let designated: Vec<NodeIndex> = graph
    .node_indices()
    .filter(|&n| graph.node(n).def.is_designated_entry())
    .collect();

  if !designated.is_empty() {
    return designated;
  }

  graph
    .node_indices()
    .filter(|&n| graph.node(n).kind() == NodeKind::Tool)
    .collect()
}

pub(crate) fn assign_roles(graph: &mut RuntimeGraph) {
  if graph.entries.is_empty() {
    return;
  }

  let entries = graph.entries.clone();
  let from_entries = reachable(graph, &entries, None);
  let mut avoiding: HashMap<NodeIndex, Vec<bool>> = HashMap::new();

  let roles: Vec<EdgeRole> = graph
    .edges
    .iter()
    .map(|edge| {
      if edge.source == edge.target {
        return EdgeRole::Recursive;
      }
      if !from_entries[edge.source.0] {
        return EdgeRole::Common;
      }
      let seen = avoiding
        .entry(edge.target)
        .or_insert_with(|| reachable(graph, &entries, Some(edge.target)));
      if seen[edge.source.0] {
        EdgeRole::Common
      } else {
        EdgeRole::Recursive
      }
    })
    .collect();

  for (edge, role) in graph.edges.iter_mut().zip(roles) {
    edge.role = role;
  }
}

/// Forward reachability from `starts`, never entering `avoid`.
pub(crate) fn reachable(
  graph: &RuntimeGraph,
  starts: &[NodeIndex],
  avoid: Option<NodeIndex>,
) -> Vec<bool> {
  let mut seen = vec![false; graph.nodes.len()];
  let mut queue = VecDeque::new();

  for &start in starts {
    if Some(start) != avoid && !seen[start.0] {
      seen[start.0] = true;
      queue.push_back(start);
    }
  }

  while let Some(node) = queue.pop_front() {
    for &e in &graph.outgoing[node.0] {
      let next = graph.edges[e.0].target;
      if Some(next) == avoid || seen[next.0] {
        continue;
      }
      seen[next.0] = true;
      queue.push_back(next);
    }
  }

  seen
}

/// Backward reachability: every node with a path to `target`.
fn reaching(graph: &RuntimeGraph, target: NodeIndex) -> Vec<bool> {
  let mut seen = vec![false; graph.nodes.len()];
  let mut queue = VecDeque::from([target]);
  seen[target.0] = true;

  while let Some(node) = queue.pop_front() {
    for &e in &graph.incoming[node.0] {
      let prev = graph.edges[e.0].source;
      if !seen[prev.0] {
        seen[prev.0] = true;
        queue.push_back(prev);
      }
    }
  }

  seen
}

pub(crate) fn downstream_edges(graph: &RuntimeGraph, from: &[NodeIndex]) -> Vec<EdgeIndex> {
  let seen = reachable(graph, from, None);
  (0..graph.edges.len())
    .map(EdgeIndex)
    .filter(|e| seen[graph.edges[e.0].source.0])
    .collect()
}

pub(crate) fn cycle_region(graph: &RuntimeGraph, back_edge: EdgeIndex) -> Vec<EdgeIndex> {
  let closing = &graph.edges[back_edge.0];
  let forward = reachable(graph, &[closing.target], None);
  let backward = reaching(graph, closing.source);
  let inside = |n: NodeIndex| forward[n.0] && backward[n.0];

  (0..graph.edges.len())
    .map(EdgeIndex)
    .filter(|&e| e != back_edge)
    .filter(|e| {
      let edge = &graph.edges[e.0];
      inside(edge.source) && inside(edge.target)
    })
    .collect()
}
