//! Loomflow Runtime
//!
//! Executes workflow graphs by edge state. Every edge is waiting, active, or
//! skipped; a node runs once its incoming edges say so, and the statuses it
//! writes on its outgoing edges decide what runs next.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                           │
//! │  - start_run(graph, request) → RunOutcome                   │
//! │  - pass loop: classify, run concurrently, commit            │
//! │  - suspend / resume via InteractiveState                    │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HandlerRegistry                        │
//! │  - NodeKind → NodeHandler                                   │
//! │  - input resolution via minijinja                           │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LoopController                         │
//! │  - one nested run per element, sequential                   │
//! │  - nested suspension through LoopState                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use loomflow_runtime::{Dispatcher, HandlerRegistry, RunRequest, RuntimeConfig};
//!
//! let mut registry = HandlerRegistry::with_builtins();
//! registry.register(NodeKind::ChatNode, MyChatHandler::new(client));
//!
//! let dispatcher = Dispatcher::new(registry, RuntimeConfig::from_env());
//! let outcome = dispatcher
//!   .run_workflow(RunRequest::new(Arc::new(workflow)).with_query("hello"))
//!   .await?;
//!
//! if let Some(state) = outcome.interactive {
//!   // store `state`, ask the user, then resume with the answer filled in
//! }
//! ```

mod config;
mod dispatcher;
mod error;
mod events;
mod handler;
pub mod handlers;
mod history;
mod input;
mod interactive;
mod loop_controller;
mod result;

pub use config::{
  DEFAULT_MAX_DEPTH, DEFAULT_MAX_LOOP_TIMES, DEFAULT_MAX_RUN_TIMES, MAX_LOOP_TIMES_ENV,
  RuntimeConfig, max_loop_times,
};
pub use dispatcher::{Dispatcher, RunRequest};
pub use error::{DispatchError, HandlerError, RunFailure};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use handler::{HandlerRegistry, NodeContext, NodeHandler, NodeOutcome};
pub use history::{ChatItem, ChatRole, ChatValue, drop_interactive_turn, last_interactive};
pub use input::{format_value, resolve_inputs};
pub use interactive::{
  InputFormItem, Interaction, InteractiveState, LoopState, MAX_INTERACTIVE_DEPTH,
  UserInputParams, UserSelectOption, UserSelectParams,
};
pub use loop_controller::{
  LOOP_END_INPUT, LOOP_END_OUTPUT, LOOP_INPUT_ARRAY, LOOP_RESULT_ARRAY, LOOP_START_INDEX,
  LOOP_START_INPUT, LoopController, LoopOutcome, LoopRequest,
};
pub use result::{AssistantResponse, NodeResult, NodeStatus, RunOutcome, Usage, UsageItem};
