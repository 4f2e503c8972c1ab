//! Sequential iteration of a loop body.
//!
//! Each element of the input array gets a fresh copy of the body graph and
//! its own nested run. Iterations never overlap. An iteration that suspends
//! stops the loop and is reported as a [`LoopState`], which carries the
//! results gathered so far and the iteration's own suspended state.

use std::sync::Arc;

use loomflow_config::{NodeKind, WorkflowDef};
use loomflow_workflow::RuntimeGraph;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::dispatcher::{Dispatcher, RunRequest};
use crate::error::{DispatchError, RunFailure};
use crate::history::ChatItem;
use crate::interactive::LoopState;
use crate::result::{AssistantResponse, NodeResult, NodeStatus, RunOutcome, Usage};

/// Input slot of a loop node holding the array to iterate.
pub const LOOP_INPUT_ARRAY: &str = "loopInputArray";
/// Output slot of a loop node holding one result per iteration.
pub const LOOP_RESULT_ARRAY: &str = "loopArray";
/// Slots the loop start node is seeded with for each iteration.
pub const LOOP_START_INPUT: &str = "loopStartInput";
pub const LOOP_START_INDEX: &str = "loopStartIndex";
pub const LOOP_END_INPUT: &str = "loopEndInput";
/// Output slot of the loop end node read back as the iteration result.
pub const LOOP_END_OUTPUT: &str = "loopOutputValue";

#[derive(Debug, Clone)]
pub struct LoopRequest {
  /// The loop node driving the iteration.
  pub node_id: String,
  pub items: Vec<Value>,
  /// Body graph, copied fresh for every iteration.
  pub body: RuntimeGraph,
  pub resume: Option<LoopState>,
  pub max_iterations: usize,
  pub workflow: Arc<WorkflowDef>,
  pub variables: Map<String, Value>,
  pub histories: Vec<ChatItem>,
  pub query: Value,
  pub outer_outputs: Map<String, Value>,
  pub cancel: CancellationToken,
  /// Depth of the run the loop node belongs to.
  pub depth: u32,
}

#[derive(Debug, Clone, Default)]
pub struct LoopOutcome {
  /// One value per completed iteration, in input order.
  pub results: Vec<Value>,
  pub usage: Usage,
  pub assistant_responses: Vec<AssistantResponse>,
  pub new_variables: Map<String, Value>,
  pub node_results: Vec<NodeResult>,
  /// Set when an iteration suspended. `results` is empty in that case and
  /// the partial results live in the state.
  pub interactive: Option<LoopState>,
}

#[derive(Debug, Clone)]
pub struct LoopController {
  dispatcher: Dispatcher,
}

impl LoopController {
  pub fn new(dispatcher: Dispatcher) -> Self {
    Self { dispatcher }
  }

  #[instrument(
    name = "loop_run",
    skip_all,
    fields(node_id = %request.node_id, items = request.items.len())
  )]
  pub async fn run_loop(&self, request: LoopRequest) -> Result<LoopOutcome, RunFailure> {
    let LoopRequest {
      node_id,
      items,
      body,
      resume,
      max_iterations,
      workflow,
      mut variables,
      histories,
      query,
      outer_outputs,
      cancel,
      depth,
    } = request;

    if items.len() > max_iterations {
      error!(
        node_id = %node_id,
        count = items.len(),
        max = max_iterations,
        "loop_limit_exceeded"
      );
      return Err(
        DispatchError::LoopLimitExceeded {
          count: items.len(),
          max: max_iterations,
        }
        .into(),
      );
    }

    let items: Vec<Value> = items.into_iter().filter(|v| !v.is_null()).collect();
    let (start_index, mut resumed_child, mut results) = match resume {
      Some(state) => (
        state.current_index,
        state.children_response.map(|child| *child),
        state.loop_result,
      ),
      None => (0, None, Vec::new()),
    };
    if resumed_child.is_some() && start_index >= items.len() {
      error!(
        node_id = %node_id,
        index = start_index,
        items = items.len(),
        "loop_resume_out_of_range"
      );
      return Err(
        DispatchError::InvalidLoopInput {
          node_id,
          message: format!(
            "resumed at item {} but the input has {} items",
            start_index,
            items.len()
          ),
        }
        .into(),
      );
    }
    let loop_start = body.find_kind(NodeKind::LoopStart);
    let mut outcome = LoopOutcome::default();

    for (index, item) in items.into_iter().enumerate().skip(start_index) {
      if cancel.is_cancelled() {
        info!(node_id = %node_id, index, "loop cancelled");
        return Err(RunFailure {
          error: DispatchError::Cancelled,
          usage: outcome.usage,
          node_results: outcome.node_results,
        });
      }

      let mut graph = body.clone();
      let mut run = RunRequest {
        workflow: workflow.clone(),
        variables: variables.clone(),
        histories: histories.clone(),
        query: query.clone(),
        outer_outputs: outer_outputs.clone(),
        resume: None,
        cancel: cancel.clone(),
        depth: depth + 1,
      };

      match resumed_child.take() {
        Some(child) => {
          debug!(node_id = %node_id, index, "resuming suspended iteration");
          run.resume = Some(child);
        }
        None => {
          debug!(node_id = %node_id, index, "loop_iteration");
          if let Some(start) = loop_start {
            let node = graph.node_mut(start);
            node.set_input(LOOP_START_INPUT, item);
            node.set_input(LOOP_START_INDEX, Value::from(index + 1));
          }
        }
      }

      let iteration = match self.dispatcher.start_run(graph, run).await {
        Ok(iteration) => iteration,
        Err(mut failure) => {
          outcome.usage.extend(failure.usage);
          outcome.node_results.append(&mut failure.node_results);
          failure.usage = outcome.usage;
          failure.node_results = outcome.node_results;
          return Err(failure);
        }
      };

      let value = iteration_result(&iteration);
      let RunOutcome {
        node_results,
        usage,
        assistant_responses,
        new_variables,
        interactive,
        ..
      } = iteration;

      outcome.usage.extend(usage);
      outcome.assistant_responses.extend(assistant_responses);
      outcome.node_results.extend(node_results);
      for (key, value) in new_variables {
        variables.insert(key.clone(), value.clone());
        outcome.new_variables.insert(key, value);
      }

      if let Some(child) = interactive {
        info!(node_id = %node_id, index, "loop_suspended");
        outcome.interactive = Some(LoopState {
          current_index: index,
          loop_result: results,
          children_response: Some(Box::new(child)),
        });
        return Ok(outcome);
      }

      results.push(value);
    }

    debug!(node_id = %node_id, iterations = results.len(), "loop_completed");
    outcome.results = results;
    Ok(outcome)
  }
}

/// The value the loop end node produced in this iteration, or null.
fn iteration_result(iteration: &RunOutcome) -> Value {
  iteration
    .node_results
    .iter()
    .rev()
    .find(|r| r.kind == NodeKind::LoopEnd && r.status == NodeStatus::Completed)
    .and_then(|r| r.outputs.get(LOOP_END_OUTPUT).cloned())
    .unwrap_or(Value::Null)
}
