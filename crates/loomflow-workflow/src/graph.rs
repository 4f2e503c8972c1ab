use std::collections::{HashMap, HashSet};

use loomflow_config::{EdgeDef, EdgeStatus, InputDef, InputValue, NodeDef, NodeKind, WorkflowDef};
use serde_json::{Map, Value};

use crate::error::WorkflowError;
use crate::topology;

/// Position of a node in a [`RuntimeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub(crate) usize);

impl NodeIndex {
  pub fn index(self) -> usize {
    self.0
  }
}

/// Position of an edge in a [`RuntimeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeIndex(pub(crate) usize);

impl EdgeIndex {
  pub fn index(self) -> usize {
    self.0
  }
}

/// Structural role of an edge relative to the graph's entry nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRole {
  /// The source is reachable from an entry without passing through the target.
  Common,
  /// Every path from an entry to the source passes back through the target.
  Recursive,
}

#[derive(Debug, Clone)]
pub struct RuntimeNode {
  pub def: NodeDef,
  /// Values produced by this node's handler during the run.
  pub outputs: Map<String, Value>,
}

impl RuntimeNode {
  pub fn node_id(&self) -> &str {
    &self.def.node_id
  }

  pub fn kind(&self) -> NodeKind {
    self.def.kind
  }

  /// Seed an input slot with a literal value, adding the slot if missing.
  pub fn set_input(&mut self, key: &str, value: Value) {
    match self.def.inputs.iter_mut().find(|i| i.key == key) {
      Some(input) => input.value = InputValue::Literal { value },
      None => self
        .def
        .inputs
        .push(InputDef::new(key, InputValue::Literal { value })),
    }
  }
}

#[derive(Debug, Clone)]
pub struct RuntimeEdge {
  pub source: NodeIndex,
  pub source_handle: String,
  pub target: NodeIndex,
  pub target_handle: String,
  pub status: EdgeStatus,
  pub(crate) role: EdgeRole,
}

impl RuntimeEdge {
  pub fn role(&self) -> EdgeRole {
    self.role
  }

  pub fn is_recursive(&self) -> bool {
    self.role == EdgeRole::Recursive
  }

  /// Status an undecided edge starts from: back-edges begin skipped so the
  /// cycle they close can be entered the first time.
  pub fn initial_status(&self) -> EdgeStatus {
    match self.role {
      EdgeRole::Common => EdgeStatus::Waiting,
      EdgeRole::Recursive => EdgeStatus::Skipped,
    }
  }
}

/// Arena-backed graph owned by one run (or one loop iteration).
///
/// Nodes and edges are stored in flat vectors and addressed by index, so
/// cycles never form ownership cycles. Edges are never removed during a run,
/// only re-labelled.
#[derive(Debug, Clone)]
pub struct RuntimeGraph {
  pub(crate) nodes: Vec<RuntimeNode>,
  pub(crate) index: HashMap<String, NodeIndex>,
  pub(crate) edges: Vec<RuntimeEdge>,
  pub(crate) incoming: Vec<Vec<EdgeIndex>>,
  pub(crate) outgoing: Vec<Vec<EdgeIndex>>,
  pub(crate) entries: Vec<NodeIndex>,
}

impl RuntimeGraph {
  /// Build a graph from node definitions and the edges between them.
  ///
  /// Tool-selection edges are dropped. Every remaining edge must reference
  /// known nodes. All edges start `waiting`; call [`RuntimeGraph::prime`]
  /// before a fresh run.
  pub fn new(nodes: Vec<NodeDef>, edges: &[EdgeDef]) -> Result<Self, WorkflowError> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
      if index.insert(node.node_id.clone(), NodeIndex(i)).is_some() {
        return Err(WorkflowError::DuplicateNode(node.node_id.clone()));
      }
    }

    let mut runtime_edges = Vec::with_capacity(edges.len());
    let mut incoming = vec![Vec::new(); nodes.len()];
    let mut outgoing = vec![Vec::new(); nodes.len()];

    for edge in edges.iter().filter(|e| e.is_control_flow()) {
      let (Some(&source), Some(&target)) = (index.get(&edge.source), index.get(&edge.target))
      else {
        return Err(WorkflowError::InvalidEdge {
          from: edge.source.clone(),
          to: edge.target.clone(),
        });
      };

      let id = EdgeIndex(runtime_edges.len());
      outgoing[source.0].push(id);
      incoming[target.0].push(id);
      runtime_edges.push(RuntimeEdge {
        source,
        source_handle: edge.source_handle.clone(),
        target,
        target_handle: edge.target_handle.clone(),
        status: EdgeStatus::Waiting,
        role: EdgeRole::Common,
      });
    }

    let mut graph = Self {
      nodes: nodes
        .into_iter()
        .map(|def| RuntimeNode {
          def,
          outputs: Map::new(),
        })
        .collect(),
      index,
      edges: runtime_edges,
      incoming,
      outgoing,
      entries: Vec::new(),
    };

    graph.entries = topology::find_entries(&graph);
    topology::assign_roles(&mut graph);

    Ok(graph)
  }

  /// Build the top-level graph of a workflow (nodes outside any loop body).
  pub fn from_workflow(def: &WorkflowDef) -> Result<Self, WorkflowError> {
    validate_edges(def)?;
    Self::scoped(def, None)
  }

  /// Build the body of a loop node: its child nodes and the edges among them.
  pub fn loop_body(def: &WorkflowDef, loop_node_id: &str) -> Result<Self, WorkflowError> {
    match def.node(loop_node_id) {
      None => return Err(WorkflowError::NodeNotFound(loop_node_id.to_string())),
      Some(node) if node.kind != NodeKind::Loop => {
        return Err(WorkflowError::NotALoop(loop_node_id.to_string()));
      }
      Some(_) => {}
    }
    validate_edges(def)?;
    Self::scoped(def, Some(loop_node_id))
  }

  fn scoped(def: &WorkflowDef, parent: Option<&str>) -> Result<Self, WorkflowError> {
    let nodes: Vec<NodeDef> = def
      .nodes
      .iter()
      .filter(|n| n.parent_node_id.as_deref() == parent)
      .cloned()
      .collect();

    let ids: HashSet<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
    let edges: Vec<EdgeDef> = def
      .edges
      .iter()
      .filter(|e| ids.contains(e.source.as_str()) && ids.contains(e.target.as_str()))
      .cloned()
      .collect();

    Self::new(nodes, &edges)
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + use<> {
    (0..self.nodes.len()).map(NodeIndex)
  }

  pub fn node(&self, idx: NodeIndex) -> &RuntimeNode {
    &self.nodes[idx.0]
  }

  pub fn node_mut(&mut self, idx: NodeIndex) -> &mut RuntimeNode {
    &mut self.nodes[idx.0]
  }

  pub fn find(&self, node_id: &str) -> Option<NodeIndex> {
    self.index.get(node_id).copied()
  }

  /// First node of the given kind, in definition order.
  pub fn find_kind(&self, kind: NodeKind) -> Option<NodeIndex> {
    self.node_indices().find(|&n| self.node(n).kind() == kind)
  }

  pub fn edge(&self, idx: EdgeIndex) -> &RuntimeEdge {
    &self.edges[idx.0]
  }

  pub fn edges(&self) -> &[RuntimeEdge] {
    &self.edges
  }

  /// First edge between two nodes, regardless of handles.
  pub fn find_edge(&self, from: &str, to: &str) -> Option<EdgeIndex> {
    let source = self.find(from)?;
    let target = self.find(to)?;
    self.outgoing[source.0]
      .iter()
      .copied()
      .find(|&e| self.edges[e.0].target == target)
  }

  pub fn incoming(&self, node: NodeIndex) -> &[EdgeIndex] {
    &self.incoming[node.0]
  }

  pub fn outgoing(&self, node: NodeIndex) -> &[EdgeIndex] {
    &self.outgoing[node.0]
  }

  /// Designated entry nodes. Tool nodes stand in when no node is of an entry
  /// kind or explicitly flagged.
  pub fn entries(&self) -> &[NodeIndex] {
    &self.entries
  }

  pub fn has_entries(&self) -> bool {
    !self.entries.is_empty()
  }

  pub fn is_entry(&self, node: NodeIndex) -> bool {
    self.entries.contains(&node)
  }

  /// Set an edge's status, returning whether it changed.
  pub fn set_status(&mut self, edge: EdgeIndex, status: EdgeStatus) -> bool {
    let current = &mut self.edges[edge.0].status;
    let changed = *current != status;
    *current = status;
    changed
  }

  /// Reset every edge to its initial status for a fresh traversal.
  pub fn prime(&mut self) {
    for edge in &mut self.edges {
      edge.status = edge.initial_status();
    }
  }

  /// Reset every edge reachable forward from `from` to its initial status.
  pub fn reset_downstream(&mut self, from: &[NodeIndex]) {
    for e in topology::downstream_edges(self, from) {
      let edge = &mut self.edges[e.0];
      edge.status = edge.initial_status();
    }
  }

  /// Edges lying inside the cycle closed by `back_edge`, excluding the
  /// back-edge itself.
  pub fn cycle_region(&self, back_edge: EdgeIndex) -> Vec<EdgeIndex> {
    topology::cycle_region(self, back_edge)
  }
}

fn validate_edges(def: &WorkflowDef) -> Result<(), WorkflowError> {
  let ids: HashSet<&str> = def.nodes.iter().map(|n| n.node_id.as_str()).collect();
  for edge in &def.edges {
    if !ids.contains(edge.source.as_str()) || !ids.contains(edge.target.as_str()) {
      return Err(WorkflowError::InvalidEdge {
        from: edge.source.clone(),
        to: edge.target.clone(),
      });
    }
  }
  Ok(())
}
