//! The node handler contract.
//!
//! Every node kind is executed by a [`NodeHandler`] looked up in a
//! [`HandlerRegistry`] built at startup. Handlers receive their resolved
//! inputs plus a read-only view of the run and return a [`NodeOutcome`]
//! describing outputs, branch decisions, usage, and whether the run must
//! suspend.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use loomflow_config::{NodeDef, NodeKind, WorkflowDef};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::error::HandlerError;
use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::history::ChatItem;
use crate::interactive::Interaction;
use crate::result::{AssistantResponse, NodeResult, Usage, UsageItem};

#[async_trait]
pub trait NodeHandler: Send + Sync {
  async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, HandlerError>;
}

/// What a handler produced.
///
/// Outgoing edges whose source handle is listed in `skip_handles` are
/// skipped. Every other outgoing edge becomes active.
#[derive(Debug, Clone, Default)]
pub struct NodeOutcome {
  pub outputs: Map<String, Value>,
  pub skip_handles: Vec<String>,
  pub usage: Usage,
  pub assistant_responses: Vec<AssistantResponse>,
  pub new_variables: Map<String, Value>,
  /// Set to suspend the run. The node's outgoing edges are left untouched.
  pub interactive: Option<Interaction>,
  /// A failure reported as data. Routed to the catch handle when the node
  /// has `catch_error`.
  pub error: Option<String>,
  pub children: Vec<NodeResult>,
}

impl NodeOutcome {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_outputs(outputs: Map<String, Value>) -> Self {
    Self {
      outputs,
      ..Self::default()
    }
  }

  pub fn suspend(interaction: Interaction) -> Self {
    Self {
      interactive: Some(interaction),
      ..Self::default()
    }
  }

  pub fn output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.outputs.insert(key.into(), value.into());
    self
  }

  pub fn skip(mut self, handle: impl Into<String>) -> Self {
    self.skip_handles.push(handle.into());
    self
  }

  pub fn variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.new_variables.insert(key.into(), value.into());
    self
  }

  pub fn points(mut self, item: UsageItem) -> Self {
    self.usage.push(item);
    self
  }

  pub fn say(mut self, node_id: impl Into<String>, text: impl Into<String>) -> Self {
    self.assistant_responses.push(AssistantResponse {
      node_id: node_id.into(),
      text: text.into(),
    });
    self
  }
}

/// Everything a handler can see while it runs.
///
/// The variable map and history are snapshots taken at the start of the
/// pass. Writes go through [`NodeOutcome`] and are committed by the
/// dispatcher once the pass ends.
#[derive(Clone)]
pub struct NodeContext {
  pub execution_id: String,
  pub node: NodeDef,
  pub inputs: Map<String, Value>,
  pub variables: Arc<Map<String, Value>>,
  /// Outputs of every node visible to this run, keyed by node id.
  pub node_outputs: Arc<Map<String, Value>>,
  pub histories: Arc<Vec<ChatItem>>,
  pub query: Value,
  /// The stored prompt, answered, when this node is where the run resumes.
  pub resume: Option<Interaction>,
  pub workflow: Arc<WorkflowDef>,
  pub depth: u32,
  pub cancel: CancellationToken,
  pub(crate) dispatcher: Dispatcher,
  pub(crate) notifier: Arc<dyn ExecutionNotifier>,
}

impl NodeContext {
  pub fn node_id(&self) -> &str {
    &self.node.node_id
  }

  pub fn input(&self, key: &str) -> Option<&Value> {
    self.inputs.get(key).filter(|v| !v.is_null())
  }

  pub fn input_str(&self, key: &str) -> Option<&str> {
    self.input(key).and_then(Value::as_str)
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// The dispatcher running this node, for handlers that run sub-graphs.
  pub fn dispatcher(&self) -> &Dispatcher {
    &self.dispatcher
  }

  /// Stream partial text to observers without waiting on them.
  pub fn emit_text(&self, text: impl Into<String>) {
    self.notifier.notify(ExecutionEvent::StreamText {
      execution_id: self.execution_id.clone(),
      node_id: self.node.node_id.clone(),
      text: text.into(),
    });
  }
}

impl fmt::Debug for NodeContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeContext")
      .field("execution_id", &self.execution_id)
      .field("node_id", &self.node.node_id)
      .field("inputs", &self.inputs)
      .field("depth", &self.depth)
      .finish_non_exhaustive()
  }
}

/// Node kind to handler map.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
  handlers: HashMap<NodeKind, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, kind: NodeKind, handler: impl NodeHandler + 'static) -> &mut Self {
    self.handlers.insert(kind, Arc::new(handler));
    self
  }

  pub fn register_shared(&mut self, kind: NodeKind, handler: Arc<dyn NodeHandler>) -> &mut Self {
    self.handlers.insert(kind, handler);
    self
  }

  pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn NodeHandler>> {
    self.handlers.get(&kind).cloned()
  }

  pub fn contains(&self, kind: NodeKind) -> bool {
    self.handlers.contains_key(&kind)
  }
}

impl fmt::Debug for HandlerRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set().entries(self.handlers.keys()).finish()
  }
}
