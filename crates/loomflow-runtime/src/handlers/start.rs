use async_trait::async_trait;

use crate::error::HandlerError;
use crate::handler::{NodeContext, NodeHandler, NodeOutcome};

/// Output carrying the user's query on entry nodes.
pub const USER_CHAT_INPUT: &str = "userChatInput";

/// Entry nodes publish their inputs, plus the query when one was given.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartHandler;

#[async_trait]
impl NodeHandler for StartHandler {
  async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    let mut outputs = ctx.inputs.clone();
    if !ctx.query.is_null() {
      outputs
        .entry(USER_CHAT_INPUT)
        .or_insert_with(|| ctx.query.clone());
    }
    Ok(NodeOutcome::with_outputs(outputs))
  }
}
