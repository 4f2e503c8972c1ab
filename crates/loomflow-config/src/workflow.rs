use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::node::NodeDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDef {
  pub workflow_id: String,
  pub name: String,
  pub nodes: Vec<NodeDef>,
  pub edges: Vec<EdgeDef>,
}

impl WorkflowDef {
  pub fn node(&self, node_id: &str) -> Option<&NodeDef> {
    self.nodes.iter().find(|n| n.node_id == node_id)
  }

  /// Nodes belonging directly to the given loop node.
  pub fn children_of<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a NodeDef> + 'a {
    self
      .nodes
      .iter()
      .filter(move |n| n.parent_node_id.as_deref() == Some(parent))
  }
}
