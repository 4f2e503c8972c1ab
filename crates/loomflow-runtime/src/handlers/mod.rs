//! Handlers for the node kinds the engine runs itself.
//!
//! Start, loop, and interactive kinds are driven by engine state and ship
//! with the runtime. Everything else (model calls, HTTP, code, datasets) is
//! supplied by the embedder through [`HandlerRegistry::register`].

mod interactive;
mod loops;
mod passthrough;
mod start;

pub use interactive::{
  DESCRIPTION, FORM_INPUT_RESULT, SELECT_RESULT, USER_INPUT_FORMS, USER_SELECT_OPTIONS,
  UserInputHandler, UserSelectHandler,
};
pub use loops::{LoopEndHandler, LoopHandler, LoopStartHandler};
pub use passthrough::{PassthroughHandler, SKIP_HANDLES_INPUT, TEXT_INPUT};
pub use start::{StartHandler, USER_CHAT_INPUT};

use loomflow_config::NodeKind;

use crate::handler::HandlerRegistry;

impl HandlerRegistry {
  /// A registry with every built-in handler registered.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry
      .register(NodeKind::WorkflowStart, StartHandler)
      .register(NodeKind::SystemConfig, StartHandler)
      .register(NodeKind::PluginInput, StartHandler)
      .register(NodeKind::Loop, LoopHandler)
      .register(NodeKind::LoopStart, LoopStartHandler)
      .register(NodeKind::LoopEnd, LoopEndHandler)
      .register(NodeKind::UserSelect, UserSelectHandler)
      .register(NodeKind::UserInput, UserInputHandler);
    registry
  }
}
