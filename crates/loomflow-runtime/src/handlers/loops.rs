use async_trait::async_trait;
use loomflow_workflow::RuntimeGraph;
use serde_json::Value;

use crate::error::{DispatchError, HandlerError};
use crate::handler::{NodeContext, NodeHandler, NodeOutcome};
use crate::interactive::Interaction;
use crate::loop_controller::{
  LOOP_END_INPUT, LOOP_END_OUTPUT, LOOP_INPUT_ARRAY, LOOP_RESULT_ARRAY, LOOP_START_INDEX,
  LOOP_START_INPUT, LoopController, LoopRequest,
};

/// Runs the loop body once per element of `loopInputArray`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopHandler;

#[async_trait]
impl NodeHandler for LoopHandler {
  async fn execute(&self, mut ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    let node_id = ctx.node_id().to_string();
    let items = match ctx.inputs.get(LOOP_INPUT_ARRAY) {
      Some(Value::Array(items)) => items.clone(),
      other => {
        return Err(
          DispatchError::InvalidLoopInput {
            node_id,
            message: format!("'{LOOP_INPUT_ARRAY}' is {}", describe(other)),
          }
          .into(),
        );
      }
    };

    let body = RuntimeGraph::loop_body(&ctx.workflow, &node_id).map_err(DispatchError::from)?;
    let resume = match ctx.resume.take() {
      Some(Interaction::LoopInteractive(state)) => Some(state),
      _ => None,
    };

    let dispatcher = ctx.dispatcher().clone();
    let request = LoopRequest {
      node_id,
      items,
      body,
      resume,
      max_iterations: dispatcher.config().max_loop_iterations,
      workflow: ctx.workflow.clone(),
      variables: (*ctx.variables).clone(),
      histories: (*ctx.histories).clone(),
      query: ctx.query.clone(),
      outer_outputs: (*ctx.node_outputs).clone(),
      cancel: ctx.cancel.clone(),
      depth: ctx.depth,
    };
    let looped = LoopController::new(dispatcher).run_loop(request).await?;

    let mut outcome = NodeOutcome {
      usage: looped.usage,
      assistant_responses: looped.assistant_responses,
      new_variables: looped.new_variables,
      children: looped.node_results,
      ..NodeOutcome::default()
    };
    match looped.interactive {
      Some(state) => outcome.interactive = Some(Interaction::LoopInteractive(state)),
      None => {
        outcome
          .outputs
          .insert(LOOP_RESULT_ARRAY.to_string(), Value::Array(looped.results));
      }
    }
    Ok(outcome)
  }
}

fn describe(value: Option<&Value>) -> &'static str {
  match value {
    None | Some(Value::Null) => "missing",
    Some(Value::Bool(_)) => "a boolean",
    Some(Value::Number(_)) => "a number",
    Some(Value::String(_)) => "a string",
    Some(Value::Object(_)) => "an object",
    Some(Value::Array(_)) => "an array",
  }
}

/// Publishes the element and 1-based index seeded for this iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStartHandler;

#[async_trait]
impl NodeHandler for LoopStartHandler {
  async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    let value = |key: &str| ctx.inputs.get(key).cloned().unwrap_or(Value::Null);
    Ok(
      NodeOutcome::new()
        .output(LOOP_START_INPUT, value(LOOP_START_INPUT))
        .output(LOOP_START_INDEX, value(LOOP_START_INDEX)),
    )
  }
}

/// Publishes the iteration's result.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopEndHandler;

#[async_trait]
impl NodeHandler for LoopEndHandler {
  async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    let value = ctx
      .inputs
      .get(LOOP_END_INPUT)
      .cloned()
      .unwrap_or(Value::Null);
    Ok(NodeOutcome::new().output(LOOP_END_OUTPUT, value))
  }
}
