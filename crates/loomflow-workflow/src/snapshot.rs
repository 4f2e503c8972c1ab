//! Serializable edge and output state of a runtime graph.
//!
//! Snapshots are keyed by node ids and handles rather than arena indices so
//! they stay valid against a graph rebuilt from the same definition.

use loomflow_config::EdgeStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowError;
use crate::graph::RuntimeGraph;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeState {
  pub source: String,
  pub source_handle: String,
  pub target: String,
  pub target_handle: String,
  pub status: EdgeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutputState {
  pub node_id: String,
  pub key: String,
  pub value: Value,
}

impl RuntimeGraph {
  pub fn edge_states(&self) -> Vec<EdgeState> {
    self
      .edges
      .iter()
      .map(|edge| EdgeState {
        source: self.nodes[edge.source.0].def.node_id.clone(),
        source_handle: edge.source_handle.clone(),
        target: self.nodes[edge.target.0].def.node_id.clone(),
        target_handle: edge.target_handle.clone(),
        status: edge.status,
      })
      .collect()
  }

  /// Apply saved edge statuses. Every saved edge must exist in this graph.
  pub fn restore_edge_states(&mut self, states: &[EdgeState]) -> Result<(), WorkflowError> {
    for state in states {
      let unknown = || WorkflowError::UnknownSnapshotEdge {
        from: state.source.clone(),
        to: state.target.clone(),
      };

      let source = self.find(&state.source).ok_or_else(unknown)?;
      let target = self.find(&state.target).ok_or_else(unknown)?;
      let edge = self.outgoing[source.0]
        .iter()
        .copied()
        .find(|e| {
          let edge = &self.edges[e.0];
          edge.target == target
            && edge.source_handle == state.source_handle
            && edge.target_handle == state.target_handle
        })
        .ok_or_else(unknown)?;

      self.edges[edge.0].status = state.status;
    }
    Ok(())
  }

  /// Every output value produced so far, in node order.
  pub fn output_states(&self) -> Vec<NodeOutputState> {
    self
      .nodes
      .iter()
      .flat_map(|node| {
        node.outputs.iter().map(|(key, value)| NodeOutputState {
          node_id: node.def.node_id.clone(),
          key: key.clone(),
          value: value.clone(),
        })
      })
      .collect()
  }

  pub fn restore_outputs(&mut self, states: &[NodeOutputState]) -> Result<(), WorkflowError> {
    for state in states {
      let idx = self
        .find(&state.node_id)
        .ok_or_else(|| WorkflowError::NodeNotFound(state.node_id.clone()))?;
      self.nodes[idx.0]
        .outputs
        .insert(state.key.clone(), state.value.clone());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use loomflow_config::{EdgeDef, NodeDef, NodeKind};
  use serde_json::json;

  use super::*;

  fn graph() -> RuntimeGraph {
    RuntimeGraph::new(
      vec![
        NodeDef::new("start", NodeKind::WorkflowStart),
        NodeDef::new("ask", NodeKind::UserSelect),
        NodeDef::new("yes", NodeKind::Answer),
        NodeDef::new("no", NodeKind::Answer),
      ],
      &[
        EdgeDef::new("start", "ask"),
        EdgeDef::from_handle("ask", "yes", "yes"),
        EdgeDef::from_handle("ask", "no", "no"),
      ],
    )
    .unwrap()
  }

  #[test]
  fn test_edge_states_restore_onto_rebuilt_graph() {
    let mut original = graph();
    let e = original.find_edge("start", "ask").unwrap();
    original.set_status(e, EdgeStatus::Active);
    let e = original.find_edge("ask", "no").unwrap();
    original.set_status(e, EdgeStatus::Skipped);

    let saved = original.edge_states();
    let json = serde_json::to_value(&saved).unwrap();
    assert_eq!(json[1]["sourceHandle"], "yes");
    let parsed: Vec<EdgeState> = serde_json::from_value(json).unwrap();

    let mut rebuilt = graph();
    rebuilt.restore_edge_states(&parsed).unwrap();
    assert_eq!(rebuilt.edge_states(), saved);
  }

  #[test]
  fn test_restore_rejects_unknown_edge() {
    let mut g = graph();
    let result = g.restore_edge_states(&[EdgeState {
      source: "start".to_string(),
      source_handle: "source".to_string(),
      target: "yes".to_string(),
      target_handle: "target".to_string(),
      status: EdgeStatus::Active,
    }]);
    assert!(matches!(
      result,
      Err(WorkflowError::UnknownSnapshotEdge { from, to }) if from == "start" && to == "yes"
    ));
  }

  #[test]
  fn test_outputs_round_trip() {
    let mut g = graph();
    let start = g.find("start").unwrap();
    g.node_mut(start)
      .outputs
      .insert("userChatInput".to_string(), json!("hi"));

    let saved = g.output_states();
    let mut rebuilt = graph();
    rebuilt.restore_outputs(&saved).unwrap();
    assert_eq!(rebuilt.node(start).outputs["userChatInput"], json!("hi"));
  }
}
