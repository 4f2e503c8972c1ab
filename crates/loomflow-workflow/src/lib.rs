//! Loomflow Workflow
//!
//! This crate provides the runtime graph for Loomflow and the pure readiness
//! rule that schedules it.
//!
//! Key differences from `loomflow-config`:
//! - Nodes and edges live in flat, index-addressed arenas so cycles are plain
//!   index references
//! - Every edge carries a live status (`waiting`, `active`, `skipped`)
//! - Edges are classified once as common inputs or loop-closing back-edges
//! - Edge state can be snapshotted and restored for suspended runs

mod error;
mod graph;
mod readiness;
mod snapshot;
mod topology;

pub use error::WorkflowError;
pub use graph::{EdgeIndex, EdgeRole, NodeIndex, RuntimeEdge, RuntimeGraph, RuntimeNode};
pub use readiness::{IncomingEdges, Readiness, classify, partition};
pub use snapshot::{EdgeState, NodeOutputState};
