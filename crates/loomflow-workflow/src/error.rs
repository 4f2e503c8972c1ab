use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("duplicate node id: {0}")]
  DuplicateNode(String),

  #[error("edge references unknown node: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("node '{0}' is not a loop node")]
  NotALoop(String),

  #[error("snapshot edge not present in graph: from={from}, to={to}")]
  UnknownSnapshotEdge { from: String, to: String },
}
