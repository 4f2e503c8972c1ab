//! Integration tests for loop nodes and the loop controller.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loomflow_config::{EdgeDef, InputValue, NodeDef, NodeKind, WorkflowDef};
use loomflow_runtime::{
  DispatchError, Dispatcher, HandlerError, HandlerRegistry, Interaction, InteractiveState,
  LoopController, LoopRequest, LoopState, NodeContext, NodeHandler, NodeOutcome, NodeStatus,
  RunRequest, RuntimeConfig, UsageItem, UserSelectParams,
};
use loomflow_workflow::RuntimeGraph;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

/// Doubles its `x` input, charging one point per call.
#[derive(Clone, Default)]
struct Doubler {
  seen: Arc<Mutex<Vec<Value>>>,
}

impl Doubler {
  fn calls(&self) -> usize {
    self.seen.lock().unwrap().len()
  }
}

#[async_trait]
impl NodeHandler for Doubler {
  async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    let x = ctx.inputs.get("x").cloned().unwrap_or(Value::Null);
    self.seen.lock().unwrap().push(x.clone());
    let n = x
      .as_i64()
      .ok_or_else(|| HandlerError::failed(format!("not a number: {x}")))?;
    Ok(
      NodeOutcome::new()
        .output("y", n * 2)
        .variable("last", n)
        .points(UsageItem {
          node_id: ctx.node_id().to_string(),
          module_name: "double".to_string(),
          total_points: 1.0,
          tokens: 0,
        }),
    )
  }
}

/// Sends the second iteration through a confirmation prompt.
struct Gate;

#[async_trait]
impl NodeHandler for Gate {
  async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    if ctx.inputs.get("index") == Some(&json!(2)) {
      Ok(NodeOutcome::new().skip("plain"))
    } else {
      Ok(NodeOutcome::new().skip("ask"))
    }
  }
}

fn dispatcher(doubler: &Doubler, config: RuntimeConfig) -> Dispatcher {
  let mut registry = HandlerRegistry::with_builtins();
  registry
    .register(NodeKind::Code, doubler.clone())
    .register(NodeKind::IfElse, Gate)
    .register(NodeKind::Answer, PublishInputs);
  Dispatcher::new(registry, config)
}

struct PublishInputs;

#[async_trait]
impl NodeHandler for PublishInputs {
  async fn execute(&self, ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    Ok(NodeOutcome::with_outputs(ctx.inputs.clone()))
  }
}

fn workflow(nodes: Vec<NodeDef>, edges: Vec<EdgeDef>) -> Arc<WorkflowDef> {
  Arc::new(WorkflowDef {
    workflow_id: "loop-workflow".to_string(),
    name: "Loop Workflow".to_string(),
    nodes,
    edges,
  })
}

fn loop_node(id: &str, items: Value) -> NodeDef {
  NodeDef::new(id, NodeKind::Loop).with_input("loopInputArray", InputValue::literal(items))
}

/// start -> loop -> after, with a body of loopStart -> double -> loopEnd.
fn create_doubling_workflow(items: Value) -> Arc<WorkflowDef> {
  workflow(
    vec![
      NodeDef::new("start", NodeKind::WorkflowStart),
      loop_node("loop", items),
      NodeDef::new("ls", NodeKind::LoopStart).with_parent("loop"),
      NodeDef::new("double", NodeKind::Code)
        .with_parent("loop")
        .with_input("x", InputValue::reference("ls", "loopStartInput")),
      NodeDef::new("le", NodeKind::LoopEnd)
        .with_parent("loop")
        .with_input("loopEndInput", InputValue::reference("double", "y")),
      NodeDef::new("after", NodeKind::Answer)
        .with_input("arr", InputValue::reference("loop", "loopArray")),
    ],
    vec![
      EdgeDef::new("start", "loop"),
      EdgeDef::new("loop", "after"),
      EdgeDef::new("ls", "double"),
      EdgeDef::new("double", "le"),
    ],
  )
}

#[tokio::test]
async fn test_loop_collects_one_result_per_item() {
  let doubler = Doubler::default();
  let outcome = dispatcher(&doubler, RuntimeConfig::default())
    .run_workflow(RunRequest::new(create_doubling_workflow(json!([1, 2, 3]))))
    .await
    .unwrap();

  let looped = outcome.result("loop").unwrap();
  assert_eq!(looped.outputs["loopArray"], json!([2, 4, 6]));
  assert_eq!(looped.children.len(), 9);
  assert_eq!(outcome.usage.total_points(), 3.0);
  assert_eq!(outcome.variables["last"], json!(3));
  assert_eq!(
    outcome.result("after").unwrap().outputs["arr"],
    json!([2, 4, 6])
  );
  assert_eq!(doubler.calls(), 3);
}

#[tokio::test]
async fn test_loop_skips_null_items() {
  let doubler = Doubler::default();
  let outcome = dispatcher(&doubler, RuntimeConfig::default())
    .run_workflow(RunRequest::new(create_doubling_workflow(json!([1, null, 5]))))
    .await
    .unwrap();

  assert_eq!(
    outcome.result("loop").unwrap().outputs["loopArray"],
    json!([2, 10])
  );
}

#[tokio::test]
async fn test_loop_over_cap_fails_before_any_iteration() {
  let doubler = Doubler::default();
  let config = RuntimeConfig {
    max_loop_iterations: 2,
    ..RuntimeConfig::default()
  };

  let failure = dispatcher(&doubler, config)
    .run_workflow(RunRequest::new(create_doubling_workflow(json!([1, 2, 3]))))
    .await
    .unwrap_err();

  assert!(matches!(
    failure.error,
    DispatchError::LoopLimitExceeded { count: 3, max: 2 }
  ));
  assert_eq!(doubler.calls(), 0);
  assert!(
    failure
      .node_results
      .iter()
      .any(|r| r.node_id == "loop" && r.status == NodeStatus::Failed)
  );
}

#[tokio::test]
async fn test_loop_input_must_be_an_array() {
  let doubler = Doubler::default();
  let failure = dispatcher(&doubler, RuntimeConfig::default())
    .run_workflow(RunRequest::new(create_doubling_workflow(json!("nope"))))
    .await
    .unwrap_err();

  match failure.error {
    DispatchError::InvalidLoopInput { node_id, message } => {
      assert_eq!(node_id, "loop");
      assert!(message.contains("a string"));
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn test_body_failure_keeps_usage_of_earlier_iterations() {
  let doubler = Doubler::default();
  let failure = dispatcher(&doubler, RuntimeConfig::default())
    .run_workflow(RunRequest::new(create_doubling_workflow(json!([1, 2, "x"]))))
    .await
    .unwrap_err();

  assert!(matches!(
    failure.error,
    DispatchError::Handler { ref node_id, .. } if node_id == "double"
  ));
  assert_eq!(failure.usage.total_points(), 2.0);
}

/// Body: loopStart -> gate; gate routes item 2 through a prompt before
/// doubling.
fn create_gated_workflow() -> Arc<WorkflowDef> {
  workflow(
    vec![
      NodeDef::new("start", NodeKind::WorkflowStart),
      loop_node("loop", json!([1, 2, 3])),
      NodeDef::new("ls", NodeKind::LoopStart).with_parent("loop"),
      NodeDef::new("gate", NodeKind::IfElse)
        .with_parent("loop")
        .with_input("index", InputValue::reference("ls", "loopStartIndex")),
      NodeDef::new("ask", NodeKind::UserSelect)
        .with_parent("loop")
        .with_input(
          "userSelectOptions",
          InputValue::literal(json!([{ "key": "go", "value": "Go" }])),
        ),
      NodeDef::new("double", NodeKind::Code)
        .with_parent("loop")
        .with_input("x", InputValue::reference("ls", "loopStartInput")),
      NodeDef::new("le", NodeKind::LoopEnd)
        .with_parent("loop")
        .with_input("loopEndInput", InputValue::reference("double", "y")),
      NodeDef::new("after", NodeKind::Answer)
        .with_input("arr", InputValue::reference("loop", "loopArray")),
    ],
    vec![
      EdgeDef::new("start", "loop"),
      EdgeDef::new("loop", "after"),
      EdgeDef::new("ls", "gate"),
      EdgeDef::from_handle("gate", "plain", "double"),
      EdgeDef::from_handle("gate", "ask", "ask"),
      EdgeDef::from_handle("ask", "go", "double"),
      EdgeDef::new("double", "le"),
    ],
  )
}

#[tokio::test]
async fn test_suspension_inside_body_resumes_in_place() {
  let doubler = Doubler::default();
  let dispatcher = dispatcher(&doubler, RuntimeConfig::default());
  let wf = create_gated_workflow();

  let first = dispatcher
    .run_workflow(RunRequest::new(wf.clone()))
    .await
    .unwrap();

  let mut state = first.interactive.clone().unwrap();
  assert_eq!(state.entry_node_ids, vec!["loop"]);
  match &state.interaction {
    Interaction::LoopInteractive(LoopState {
      current_index,
      loop_result,
      children_response: Some(child),
    }) => {
      assert_eq!(*current_index, 1);
      assert_eq!(loop_result, &vec![json!(2)]);
      assert_eq!(child.entry_node_ids, vec!["ask"]);
    }
    other => panic!("expected a loop suspension, got {other:?}"),
  }
  assert_eq!(doubler.calls(), 1);
  assert!(first.result("after").is_none());

  assert!(matches!(
    state.deepest().interaction,
    Interaction::UserSelect(_)
  ));
  assert!(state.answer_select("Go"));

  let resumed = dispatcher
    .run_workflow(RunRequest::new(wf).with_resume(state))
    .await
    .unwrap();

  assert!(!resumed.is_suspended());
  assert_eq!(
    resumed.result("loop").unwrap().outputs["loopArray"],
    json!([2, 4, 6])
  );
  assert_eq!(
    resumed.result("after").unwrap().outputs["arr"],
    json!([2, 4, 6])
  );
  assert_eq!(doubler.calls(), 3);
  assert_eq!(*doubler.seen.lock().unwrap(), vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn test_run_loop_resumes_from_saved_index() {
  let doubler = Doubler::default();
  let dispatcher = dispatcher(&doubler, RuntimeConfig::default());
  let wf = create_doubling_workflow(json!([]));

  let request = LoopRequest {
    node_id: "loop".to_string(),
    items: vec![json!(1), json!(2), json!(3), json!(4)],
    body: RuntimeGraph::loop_body(&wf, "loop").unwrap(),
    resume: Some(LoopState {
      current_index: 2,
      loop_result: vec![json!(10), json!(20)],
      children_response: None,
    }),
    max_iterations: 50,
    workflow: wf,
    variables: Map::new(),
    histories: Vec::new(),
    query: Value::Null,
    outer_outputs: Map::new(),
    cancel: CancellationToken::new(),
    depth: 0,
  };

  let outcome = LoopController::new(dispatcher)
    .run_loop(request)
    .await
    .unwrap();

  assert_eq!(
    outcome.results,
    vec![json!(10), json!(20), json!(6), json!(8)]
  );
  assert!(outcome.interactive.is_none());
  assert_eq!(doubler.calls(), 2);
  assert_eq!(outcome.usage.total_points(), 2.0);
  assert_eq!(outcome.new_variables["last"], json!(4));
}

#[tokio::test]
async fn test_run_loop_rejects_saved_index_past_the_input() {
  let doubler = Doubler::default();
  let dispatcher = dispatcher(&doubler, RuntimeConfig::default());
  let wf = create_doubling_workflow(json!([]));

  let suspended_iteration = InteractiveState {
    entry_node_ids: vec!["double".to_string()],
    pending_node_ids: vec![],
    activated_node_ids: vec![],
    memory_edges: vec![],
    node_outputs: vec![],
    interaction: Interaction::UserSelect(UserSelectParams::default()),
  };
  let request = LoopRequest {
    node_id: "loop".to_string(),
    items: vec![json!(1), json!(2)],
    body: RuntimeGraph::loop_body(&wf, "loop").unwrap(),
    resume: Some(LoopState {
      current_index: 4,
      loop_result: vec![json!(2), json!(4), json!(6), json!(8)],
      children_response: Some(Box::new(suspended_iteration)),
    }),
    max_iterations: 50,
    workflow: wf,
    variables: Map::new(),
    histories: Vec::new(),
    query: Value::Null,
    outer_outputs: Map::new(),
    cancel: CancellationToken::new(),
    depth: 0,
  };

  let failure = LoopController::new(dispatcher)
    .run_loop(request)
    .await
    .unwrap_err();

  match failure.error {
    DispatchError::InvalidLoopInput { node_id, message } => {
      assert_eq!(node_id, "loop");
      assert!(message.contains("2 items"));
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(doubler.calls(), 0);
}

#[tokio::test]
async fn test_run_loop_stops_when_cancelled() {
  let doubler = Doubler::default();
  let dispatcher = dispatcher(&doubler, RuntimeConfig::default());
  let wf = create_doubling_workflow(json!([]));
  let cancel = CancellationToken::new();
  cancel.cancel();

  let request = LoopRequest {
    node_id: "loop".to_string(),
    items: vec![json!(1)],
    body: RuntimeGraph::loop_body(&wf, "loop").unwrap(),
    resume: None,
    max_iterations: 50,
    workflow: wf,
    variables: Map::new(),
    histories: Vec::new(),
    query: Value::Null,
    outer_outputs: Map::new(),
    cancel,
    depth: 0,
  };

  let failure = LoopController::new(dispatcher)
    .run_loop(request)
    .await
    .unwrap_err();
  assert!(failure.is_cancelled());
  assert_eq!(doubler.calls(), 0);
}

/// outer loop over two items, each running an inner loop whose body asks.
fn create_nested_workflow() -> Arc<WorkflowDef> {
  workflow(
    vec![
      NodeDef::new("start", NodeKind::WorkflowStart),
      loop_node("outer", json!([1, 2])),
      NodeDef::new("ols", NodeKind::LoopStart).with_parent("outer"),
      loop_node("inner", json!(["only"])).with_parent("outer"),
      NodeDef::new("ole", NodeKind::LoopEnd)
        .with_parent("outer")
        .with_input("loopEndInput", InputValue::reference("inner", "loopArray")),
      NodeDef::new("ils", NodeKind::LoopStart).with_parent("inner"),
      NodeDef::new("ask", NodeKind::UserSelect)
        .with_parent("inner")
        .with_input(
          "userSelectOptions",
          InputValue::literal(json!([
            { "key": "yes", "value": "Yes" },
            { "key": "no", "value": "No" },
          ])),
        ),
      NodeDef::new("ile", NodeKind::LoopEnd)
        .with_parent("inner")
        .with_input("loopEndInput", InputValue::reference("ask", "selectResult")),
    ],
    vec![
      EdgeDef::new("start", "outer"),
      EdgeDef::new("ols", "inner"),
      EdgeDef::new("inner", "ole"),
      EdgeDef::new("ils", "ask"),
      EdgeDef::from_handle("ask", "yes", "ile"),
      EdgeDef::from_handle("ask", "no", "ile"),
    ],
  )
}

#[tokio::test]
async fn test_nested_loop_suspension_round_trips() {
  let doubler = Doubler::default();
  let dispatcher = dispatcher(&doubler, RuntimeConfig::default());
  let wf = create_nested_workflow();

  let mut state = dispatcher
    .run_workflow(RunRequest::new(wf.clone()))
    .await
    .unwrap()
    .interactive
    .unwrap();
  assert!(state.is_pending());
  assert_eq!(state.deepest().entry_node_ids, vec!["ask"]);
  assert!(state.answer_select("Yes"));

  // Through JSON, the way a caller would store it between requests.
  let stored = serde_json::to_value(&state).unwrap();
  let state = serde_json::from_value(stored).unwrap();

  // The second outer iteration asks again.
  let second = dispatcher
    .run_workflow(RunRequest::new(wf.clone()).with_resume(state))
    .await
    .unwrap();
  let mut state = second.interactive.unwrap();
  match &state.interaction {
    Interaction::LoopInteractive(LoopState {
      current_index,
      loop_result,
      ..
    }) => {
      assert_eq!(*current_index, 1);
      assert_eq!(loop_result, &vec![json!(["Yes"])]);
    }
    other => panic!("expected a loop suspension, got {other:?}"),
  }
  assert!(state.answer_select("No"));

  let done = dispatcher
    .run_workflow(RunRequest::new(wf).with_resume(state))
    .await
    .unwrap();

  assert!(!done.is_suspended());
  assert_eq!(
    done.result("outer").unwrap().outputs["loopArray"],
    json!([["Yes"], ["No"]])
  );
}
