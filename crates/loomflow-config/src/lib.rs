//! Loomflow Config
//!
//! This crate contains the serializable workflow definition types for Loomflow.
//! These types describe a workflow as authored: nodes with typed input and
//! output slots, and handle-addressed edges between them.
//!
//! Definitions can be loaded from:
//! - JSON files (via CLI with `loomflow run workflow.json`)
//! - Any store that keeps workflows as JSON blobs
//!
//! The runtime turns a [`WorkflowDef`] into an indexed runtime graph and
//! schedules it by edge state.

mod edge;
mod enums;
mod input;
mod node;
mod workflow;

pub use edge::{
  CATCH_SOURCE_HANDLE, DEFAULT_SOURCE_HANDLE, DEFAULT_TARGET_HANDLE, EdgeDef,
  SELECTED_TOOLS_HANDLE,
};
pub use enums::{EdgeStatus, NodeKind, ValueType};
pub use input::InputValue;
pub use node::{InputDef, NodeDef, OutputDef};
pub use workflow::WorkflowDef;
