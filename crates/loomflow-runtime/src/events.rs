//! Execution events and notifiers for observability.
//!
//! Events are emitted while a run executes so consumers can observe
//! progress, stream partial text to a client, or persist state. Streaming
//! text travels on this side channel and never blocks the pass loop.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run (top-level or loop iteration) has started.
  RunStarted { execution_id: String, depth: u32 },

  NodeStarted {
    execution_id: String,
    node_id: String,
  },

  NodeCompleted {
    execution_id: String,
    node_id: String,
    outputs: serde_json::Value,
  },

  /// A node was classified as skipped and its outgoing edges were skipped.
  NodeSkipped {
    execution_id: String,
    node_id: String,
  },

  NodeFailed {
    execution_id: String,
    node_id: String,
    error: String,
  },

  /// Partial text streamed by a handler.
  StreamText {
    execution_id: String,
    node_id: String,
    text: String,
  },

  /// The run stopped waiting for external input.
  RunSuspended {
    execution_id: String,
    entry_node_ids: Vec<String>,
  },

  RunCompleted { execution_id: String },

  RunFailed { execution_id: String, error: String },
}

/// Trait for receiving execution events.
///
/// The dispatcher calls `notify` for each event. Implementations decide
/// what to do with them (persist, broadcast, log, ignore).
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a pass. Event volume is a
  // handful per node plus streamed text.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
