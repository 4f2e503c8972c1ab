//! Runtime error types.

use loomflow_config::NodeKind;
use loomflow_workflow::WorkflowError;

use crate::result::{NodeResult, Usage};

/// Fatal conditions that end a run.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
  /// The run was cancelled by its caller.
  #[error("execution cancelled")]
  Cancelled,

  /// Malformed workflow or snapshot.
  #[error("invalid graph: {0}")]
  Graph(#[from] WorkflowError),

  /// Failed to resolve node inputs (template rendering or references).
  #[error("input resolution failed for node '{node_id}': {message}")]
  InputResolution { node_id: String, message: String },

  #[error("no handler registered for node '{node_id}' of kind {kind:?}")]
  MissingHandler { node_id: String, kind: NodeKind },

  /// A node handler failed and did not report the failure as output.
  #[error("node '{node_id}' failed: {message}")]
  Handler { node_id: String, message: String },

  #[error("loop node '{node_id}' needs an array input: {message}")]
  InvalidLoopInput { node_id: String, message: String },

  #[error("loop input has {count} items, exceeding the limit of {max}")]
  LoopLimitExceeded { count: usize, max: usize },

  #[error("nested run depth {depth} exceeds the limit of {max}")]
  DepthExceeded { depth: u32, max: u32 },

  #[error("task join error: {message}")]
  TaskJoin { message: String },
}

impl DispatchError {
  /// Cancellation is reported separately so callers can stay quiet about it.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, DispatchError::Cancelled)
  }
}

/// A failed run: the first fatal error plus everything accounted before it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
  pub error: DispatchError,
  /// Usage consumed before the failure. Still billable.
  pub usage: Usage,
  pub node_results: Vec<NodeResult>,
}

impl RunFailure {
  pub fn new(error: DispatchError) -> Self {
    Self {
      error,
      usage: Usage::default(),
      node_results: Vec::new(),
    }
  }

  pub fn is_cancelled(&self) -> bool {
    self.error.is_cancelled()
  }
}

impl From<DispatchError> for RunFailure {
  fn from(error: DispatchError) -> Self {
    Self::new(error)
  }
}

/// Error returned by a node handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
  /// An ordinary failure. Nodes with `catch_error` turn it into output.
  #[error("{message}")]
  Failed { message: String },

  /// A nested run failed. Its error and usage propagate unchanged.
  #[error(transparent)]
  Run(#[from] Box<RunFailure>),
}

impl HandlerError {
  pub fn failed(message: impl Into<String>) -> Self {
    HandlerError::Failed {
      message: message.into(),
    }
  }
}

impl From<DispatchError> for HandlerError {
  fn from(error: DispatchError) -> Self {
    HandlerError::Run(Box::new(RunFailure::new(error)))
  }
}

impl From<RunFailure> for HandlerError {
  fn from(failure: RunFailure) -> Self {
    HandlerError::Run(Box::new(failure))
  }
}
