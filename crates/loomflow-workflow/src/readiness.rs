//! The readiness rule.
//!
//! A node's readiness depends only on the statuses of its incoming edges:
//!
//! | incoming edges                          | readiness |
//! |-----------------------------------------|-----------|
//! | none                                    | run       |
//! | all skipped                             | skip      |
//! | none waiting, at least one active       | run       |
//! | anything else (some edge still waiting) | wait      |
//!
//! The rule is uniform across common and recursive edges. Edge roles only
//! decide what status an untaken back-edge starts from (see
//! [`RuntimeGraph::prime`]).
//!
//! When a graph has no entry node at all, reachability cannot be
//! established and every node classifies as run. This keeps entry-less
//! sub-graphs making progress.

use loomflow_config::EdgeStatus;
use tracing::trace;

use crate::graph::{EdgeIndex, EdgeRole, NodeIndex, RuntimeGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
  Run,
  Wait,
  Skip,
}

/// Incoming edges of a node split by role.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IncomingEdges {
  pub common: Vec<EdgeIndex>,
  pub recursive: Vec<EdgeIndex>,
}

pub fn partition(graph: &RuntimeGraph, node: NodeIndex) -> IncomingEdges {
  let mut parts = IncomingEdges::default();
  for &e in graph.incoming(node) {
    match graph.edge(e).role() {
      EdgeRole::Common => parts.common.push(e),
      EdgeRole::Recursive => parts.recursive.push(e),
    }
  }
  parts
}

pub fn classify(graph: &RuntimeGraph, node: NodeIndex) -> Readiness {
  let incoming = graph.incoming(node);

  if incoming.is_empty() {
    return Readiness::Run;
  }

  if !graph.has_entries() {
    trace!(node_id = %graph.node(node).node_id(), "no entry node, defaulting to run");
    return Readiness::Run;
  }

  let mut active = false;
  for &e in incoming {
    match graph.edge(e).status {
      EdgeStatus::Waiting => return Readiness::Wait,
      EdgeStatus::Active => active = true,
      EdgeStatus::Skipped => {}
    }
  }

  if active {
    Readiness::Run
  } else {
    Readiness::Skip
  }
}
