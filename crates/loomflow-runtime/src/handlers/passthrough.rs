use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::handler::{NodeContext, NodeHandler, NodeOutcome};

/// Input listing source handles to skip.
pub const SKIP_HANDLES_INPUT: &str = "skipHandles";
/// Input streamed to observers and recorded as an assistant response.
pub const TEXT_INPUT: &str = "text";

/// Publishes its inputs as outputs.
///
/// Stands in for kinds whose real handler lives outside the engine, so a
/// workflow's control flow can be exercised without model or network access.
/// Branches are chosen through the `skipHandles` input.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughHandler;

#[async_trait]
impl NodeHandler for PassthroughHandler {
  async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    let mut outcome = NodeOutcome::with_outputs(ctx.inputs.clone());

    if let Some(Value::Array(handles)) = ctx.input(SKIP_HANDLES_INPUT) {
      outcome.skip_handles = handles
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    }

    if let Some(text) = ctx.input_str(TEXT_INPUT) {
      ctx.emit_text(text);
      outcome = outcome.say(ctx.node_id(), text);
    }

    Ok(outcome)
  }
}
