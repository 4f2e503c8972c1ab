//! The execution dispatcher.
//!
//! A run is a sequence of passes. Each pass:
//! 1. checks for cancellation
//! 2. classifies every node whose incoming edges changed since it was last
//!    looked at, collecting the runnable and the skipped ones
//! 3. runs the runnable handlers concurrently against a snapshot of the
//!    variables and node outputs
//! 4. commits outputs, variables, usage, and edge writes in node order
//!
//! A node only runs when it classifies as runnable *and* one of its incoming
//! edges was activated since it last ran, so a node inside a cycle runs once
//! per traversal. A skipped node forces its outgoing edges to skipped; targets
//! are only re-examined when that actually changes an edge, which keeps skip
//! propagation finite on cyclic graphs.
//!
//! Activating a back-edge re-enters its cycle: every edge inside the cycle
//! that was not written in the current pass returns to its initial status so
//! the next traversal joins on fresh decisions.
//!
//! The run ends at a fixpoint (nothing left to examine), when a handler asks
//! to suspend, on the first fatal error, or when the run budget is spent.
//! A suspension records the pending nodes alongside the suspended ones, so
//! work finished by siblings in the same pass carries on after resume.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use loomflow_config::{CATCH_SOURCE_HANDLE, EdgeStatus, WorkflowDef};
use loomflow_workflow::{EdgeIndex, NodeIndex, Readiness, RuntimeGraph, WorkflowError, classify};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::RuntimeConfig;
use crate::error::{DispatchError, HandlerError, RunFailure};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::handler::{HandlerRegistry, NodeContext, NodeOutcome};
use crate::history::{self, ChatItem};
use crate::input::{format_value, resolve_inputs};
use crate::interactive::{Interaction, InteractiveState};
use crate::result::{AssistantResponse, NodeResult, NodeStatus, RunOutcome, Usage};

/// A request to run (or resume) a graph.
#[derive(Debug, Clone)]
pub struct RunRequest {
  /// The definition the graph was built from. Loop nodes build their bodies
  /// from it.
  pub workflow: Arc<WorkflowDef>,
  pub variables: Map<String, Value>,
  pub histories: Vec<ChatItem>,
  pub query: Value,
  /// Outputs of nodes outside the graph that its inputs may reference.
  pub outer_outputs: Map<String, Value>,
  /// Continue a suspended run from this state instead of starting fresh.
  pub resume: Option<InteractiveState>,
  pub cancel: CancellationToken,
  /// Nesting depth. Zero for a top-level run.
  pub depth: u32,
}

impl RunRequest {
  pub fn new(workflow: Arc<WorkflowDef>) -> Self {
    Self {
      workflow,
      variables: Map::new(),
      histories: Vec::new(),
      query: Value::Null,
      outer_outputs: Map::new(),
      resume: None,
      cancel: CancellationToken::new(),
      depth: 0,
    }
  }

  pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
    self.variables = variables;
    self
  }

  pub fn with_histories(mut self, histories: Vec<ChatItem>) -> Self {
    self.histories = histories;
    self
  }

  pub fn with_query(mut self, query: impl Into<Value>) -> Self {
    self.query = query.into();
    self
  }

  pub fn with_resume(mut self, state: InteractiveState) -> Self {
    self.resume = Some(state);
    self
  }

  pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }
}

/// Drives runs over runtime graphs. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
  inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
  registry: HandlerRegistry,
  config: RuntimeConfig,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl Dispatcher {
  pub fn new(registry: HandlerRegistry, config: RuntimeConfig) -> Self {
    Self::with_notifier(registry, config, Arc::new(NoopNotifier))
  }

  pub fn with_notifier(
    registry: HandlerRegistry,
    config: RuntimeConfig,
    notifier: Arc<dyn ExecutionNotifier>,
  ) -> Self {
    Self {
      inner: Arc::new(DispatcherInner {
        registry,
        config,
        notifier,
      }),
    }
  }

  pub fn config(&self) -> &RuntimeConfig {
    &self.inner.config
  }

  pub fn registry(&self) -> &HandlerRegistry {
    &self.inner.registry
  }

  pub(crate) fn notifier(&self) -> Arc<dyn ExecutionNotifier> {
    self.inner.notifier.clone()
  }

  /// Build the top-level graph of `request.workflow` and run it.
  pub async fn run_workflow(&self, request: RunRequest) -> Result<RunOutcome, RunFailure> {
    let graph = RuntimeGraph::from_workflow(&request.workflow).map_err(DispatchError::from)?;
    self.start_run(graph, request).await
  }

  /// Run a graph until it finishes, suspends, or fails.
  #[instrument(
    name = "run",
    skip_all,
    fields(depth = request.depth, resumed = request.resume.is_some())
  )]
  pub async fn start_run(
    &self,
    graph: RuntimeGraph,
    request: RunRequest,
  ) -> Result<RunOutcome, RunFailure> {
    Run::prepare(self.clone(), graph, request)?.execute().await
  }
}

impl fmt::Debug for Dispatcher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Dispatcher")
      .field("registry", &self.inner.registry)
      .field("config", &self.inner.config)
      .finish_non_exhaustive()
  }
}

/// A handler that returned, with what it was given.
struct Finished {
  idx: NodeIndex,
  inputs: Map<String, Value>,
  result: Result<NodeOutcome, HandlerError>,
  elapsed: Duration,
}

/// State of one run. Owns its graph exclusively.
struct Run {
  dispatcher: Dispatcher,
  execution_id: String,
  graph: RuntimeGraph,
  workflow: Arc<WorkflowDef>,
  variables: Map<String, Value>,
  new_variables: Map<String, Value>,
  histories: Arc<Vec<ChatItem>>,
  query: Value,
  outer_outputs: Map<String, Value>,
  cancel: CancellationToken,
  depth: u32,
  /// Nodes to classify in the next pass.
  candidates: Vec<bool>,
  /// Nodes with an incoming edge activated since they last ran.
  activated: Vec<bool>,
  /// Nodes to run in the next pass without classification.
  forced: Vec<bool>,
  /// The answered prompt and the node it belongs to.
  resume_with: Option<(NodeIndex, Interaction)>,
  usage: Usage,
  node_results: Vec<NodeResult>,
  assistant_responses: Vec<AssistantResponse>,
  run_times_left: usize,
}

impl Run {
  fn prepare(
    dispatcher: Dispatcher,
    mut graph: RuntimeGraph,
    request: RunRequest,
  ) -> Result<Self, RunFailure> {
    let config = dispatcher.config();
    if request.depth > config.max_depth {
      return Err(
        DispatchError::DepthExceeded {
          depth: request.depth,
          max: config.max_depth,
        }
        .into(),
      );
    }

    for idx in graph.node_indices() {
      let node = graph.node(idx);
      if !dispatcher.registry().contains(node.kind()) {
        return Err(
          DispatchError::MissingHandler {
            node_id: node.node_id().to_string(),
            kind: node.kind(),
          }
          .into(),
        );
      }
    }

    let count = graph.node_count();
    let mut forced = vec![false; count];
    let mut candidates = vec![false; count];
    let mut activated = vec![false; count];
    let mut histories = request.histories;
    let mut resume_with = None;

    match request.resume {
      Some(state) => {
        graph
          .restore_outputs(&state.node_outputs)
          .map_err(DispatchError::from)?;
        graph
          .restore_edge_states(&state.memory_edges)
          .map_err(DispatchError::from)?;

        let find_all = |ids: &[String]| {
          ids
            .iter()
            .map(|id| {
              graph
                .find(id)
                .ok_or_else(|| DispatchError::from(WorkflowError::NodeNotFound(id.clone())))
            })
            .collect::<Result<Vec<_>, _>>()
        };
        let entries = find_all(&state.entry_node_ids)?;
        let pending = find_all(&state.pending_node_ids)?;
        let waiting = find_all(&state.activated_node_ids)?;

        graph.reset_downstream(&entries);
        for entry in &entries {
          forced[entry.index()] = true;
        }
        for idx in pending {
          candidates[idx.index()] = true;
        }
        for idx in waiting {
          activated[idx.index()] = true;
        }
        resume_with = entries.first().map(|&first| (first, state.interaction));

        if request.depth == 0 {
          history::drop_interactive_turn(&mut histories);
        }
      }
      None => {
        graph.prime();
        let mut entries = graph.entries().to_vec();
        if entries.is_empty() {
          entries = graph
            .node_indices()
            .filter(|&n| graph.incoming(n).is_empty())
            .collect();
          warn!(
            sources = entries.len(),
            "graph has no entry node, starting from source nodes"
          );
        }
        for entry in entries {
          forced[entry.index()] = true;
        }
      }
    }

    let run_times_left = config.max_run_times;
    Ok(Self {
      dispatcher,
      execution_id: uuid::Uuid::new_v4().to_string(),
      graph,
      workflow: request.workflow,
      variables: request.variables,
      new_variables: Map::new(),
      histories: Arc::new(histories),
      query: request.query,
      outer_outputs: request.outer_outputs,
      cancel: request.cancel,
      depth: request.depth,
      candidates,
      activated,
      forced,
      resume_with,
      usage: Usage::default(),
      node_results: Vec::new(),
      assistant_responses: Vec::new(),
      run_times_left,
    })
  }

  async fn execute(mut self) -> Result<RunOutcome, RunFailure> {
    info!(
      execution_id = %self.execution_id,
      depth = self.depth,
      nodes = self.graph.node_count(),
      "run_started"
    );
    self.notify(ExecutionEvent::RunStarted {
      execution_id: self.execution_id.clone(),
      depth: self.depth,
    });

    loop {
      if self.cancel.is_cancelled() {
        warn!(execution_id = %self.execution_id, "run cancelled");
        return Err(self.fail(DispatchError::Cancelled));
      }

      let (to_run, to_skip) = self.select_pass();
      if to_run.is_empty() && to_skip.is_empty() {
        break;
      }

      let mut written = HashSet::new();
      let mut suspended = Vec::new();

      if !to_run.is_empty() {
        if to_run.len() > self.run_times_left {
          warn!(
            execution_id = %self.execution_id,
            pending = to_run.len(),
            "run budget exhausted, stopping"
          );
          break;
        }
        self.run_times_left -= to_run.len();

        let finished = self.run_nodes(&to_run).await?;
        suspended = self.commit(finished, &mut written)?;
      }

      for idx in to_skip {
        self.skip_node(idx, &mut written);
      }

      if !suspended.is_empty() {
        return Ok(self.suspend(suspended));
      }
    }

    info!(
      execution_id = %self.execution_id,
      nodes_executed = self.node_results.len(),
      "run_completed"
    );
    self.notify(ExecutionEvent::RunCompleted {
      execution_id: self.execution_id.clone(),
    });
    Ok(self.into_outcome(None))
  }

  /// Classify pending nodes into the ones to run and the ones to skip.
  fn select_pass(&mut self) -> (Vec<NodeIndex>, Vec<NodeIndex>) {
    let mut run = Vec::new();
    let mut skip = Vec::new();

    for idx in self.graph.node_indices() {
      let i = idx.index();
      if std::mem::take(&mut self.forced[i]) {
        self.candidates[i] = false;
        self.activated[i] = false;
        run.push(idx);
        continue;
      }
      if !std::mem::take(&mut self.candidates[i]) {
        continue;
      }

      match classify(&self.graph, idx) {
        Readiness::Run if self.activated[i] => {
          self.activated[i] = false;
          run.push(idx);
        }
        Readiness::Run => {
          trace!(node_id = %self.graph.node(idx).node_id(), "runnable without new activation");
        }
        Readiness::Wait => {}
        Readiness::Skip => {
          self.activated[i] = false;
          skip.push(idx);
        }
      }
    }

    (run, skip)
  }

  /// Outputs visible to handlers, keyed by node id.
  fn visible_outputs(&self) -> Map<String, Value> {
    let mut outputs = self.outer_outputs.clone();
    for idx in self.graph.node_indices() {
      let node = self.graph.node(idx);
      if !node.outputs.is_empty() {
        outputs.insert(
          node.node_id().to_string(),
          Value::Object(node.outputs.clone()),
        );
      }
    }
    outputs
  }

  async fn run_nodes(&mut self, nodes: &[NodeIndex]) -> Result<Vec<Finished>, RunFailure> {
    let variables = Arc::new(self.variables.clone());
    let node_outputs = Arc::new(self.visible_outputs());
    let mut handles: Vec<JoinHandle<Finished>> = Vec::with_capacity(nodes.len());

    for &idx in nodes {
      if self.cancel.is_cancelled() {
        handles.iter().for_each(|h| h.abort());
        warn!(execution_id = %self.execution_id, "run cancelled before node start");
        return Err(self.fail(DispatchError::Cancelled));
      }

      let node = self.graph.node(idx);
      let def = node.def.clone();
      let handler = self.dispatcher.registry().get(def.kind);
      let inputs = resolve_inputs(node, &node_outputs, &variables);

      let (handler, inputs) = match (handler, inputs) {
        (Some(handler), Ok(inputs)) => (handler, inputs),
        (None, _) => {
          handles.iter().for_each(|h| h.abort());
          return Err(self.fail(DispatchError::MissingHandler {
            node_id: def.node_id,
            kind: def.kind,
          }));
        }
        (_, Err(e)) => {
          handles.iter().for_each(|h| h.abort());
          return Err(self.fail(e));
        }
      };

      let resume = if self
        .resume_with
        .as_ref()
        .is_some_and(|(target, _)| *target == idx)
      {
        self.resume_with.take().map(|(_, interaction)| interaction)
      } else {
        None
      };

      info!(
        execution_id = %self.execution_id,
        node_id = %def.node_id,
        kind = ?def.kind,
        resumed = resume.is_some(),
        "node_started"
      );
      self.notify(ExecutionEvent::NodeStarted {
        execution_id: self.execution_id.clone(),
        node_id: def.node_id.clone(),
      });

      let ctx = NodeContext {
        execution_id: self.execution_id.clone(),
        node: def,
        inputs: inputs.clone(),
        variables: variables.clone(),
        node_outputs: node_outputs.clone(),
        histories: self.histories.clone(),
        query: self.query.clone(),
        resume,
        workflow: self.workflow.clone(),
        depth: self.depth,
        cancel: self.cancel.clone(),
        dispatcher: self.dispatcher.clone(),
        notifier: self.dispatcher.notifier(),
      };

      handles.push(tokio::spawn(async move {
        let started = Instant::now();
        let result = handler.execute(ctx).await;
        Finished {
          idx,
          inputs,
          result,
          elapsed: started.elapsed(),
        }
      }));
    }

    let mut running: FuturesUnordered<JoinHandle<Finished>> = handles.into_iter().collect();
    let mut finished = Vec::with_capacity(nodes.len());
    let cancel = self.cancel.clone();

    loop {
      tokio::select! {
        biased;
        next = running.next() => match next {
          Some(Ok(done)) => finished.push(done),
          Some(Err(e)) => {
            running.iter().for_each(|h| h.abort());
            self.salvage(finished);
            return Err(self.fail(DispatchError::TaskJoin {
              message: e.to_string(),
            }));
          }
          None => break,
        },
        _ = cancel.cancelled() => {
          running.iter().for_each(|h| h.abort());
          warn!(
            execution_id = %self.execution_id,
            finished = finished.len(),
            aborted = running.len(),
            "run cancelled during node execution"
          );
          self.salvage(finished);
          return Err(self.fail(DispatchError::Cancelled));
        }
      }
    }

    finished.sort_by_key(|f| f.idx);
    Ok(finished)
  }

  /// Account for handlers that returned before the run was cut short. Their
  /// usage and results are kept; their outputs and edge writes are not.
  fn salvage(&mut self, mut finished: Vec<Finished>) {
    finished.sort_by_key(|f| f.idx);
    for Finished {
      idx,
      inputs,
      result,
      elapsed,
    } in finished
    {
      match result {
        Ok(mut outcome) => {
          self.usage.extend(std::mem::take(&mut outcome.usage));
          let status = if outcome.interactive.is_some() {
            NodeStatus::Suspended
          } else {
            NodeStatus::Completed
          };
          let node = self.graph.node(idx);
          self.node_results.push(NodeResult {
            node_id: node.node_id().to_string(),
            name: node.def.name.clone(),
            kind: node.kind(),
            status,
            inputs,
            outputs: outcome.outputs,
            error: outcome.error,
            running_time_ms: millis(elapsed),
            children: outcome.children,
          });
        }
        Err(HandlerError::Failed { message }) => {
          self.record_failure(idx, inputs, &message, elapsed, Vec::new());
        }
        Err(HandlerError::Run(nested)) => {
          let RunFailure {
            error,
            usage,
            node_results,
          } = *nested;
          self.usage.extend(usage);
          self.record_failure(idx, inputs, &error.to_string(), elapsed, node_results);
        }
      }
    }
  }

  /// Apply the results of a pass. Returns the nodes that asked to suspend.
  fn commit(
    &mut self,
    finished: Vec<Finished>,
    written: &mut HashSet<EdgeIndex>,
  ) -> Result<Vec<(NodeIndex, Interaction)>, RunFailure> {
    let mut failure = None;
    let mut suspended = Vec::new();

    for Finished {
      idx,
      inputs,
      result,
      elapsed,
    } in finished
    {
      let catch_error = self.graph.node(idx).def.catch_error;

      let mut outcome = match result {
        Ok(outcome) => outcome,
        Err(HandlerError::Failed { message }) if catch_error => {
          warn!(
            execution_id = %self.execution_id,
            node_id = %self.graph.node(idx).node_id(),
            error = %message,
            "node error routed to catch handle"
          );
          let mut caught = NodeOutcome::new().output("error", message.clone());
          caught.error = Some(message);
          caught
        }
        Err(HandlerError::Failed { message }) => {
          self.record_failure(idx, inputs, &message, elapsed, Vec::new());
          if failure.is_none() {
            failure = Some(DispatchError::Handler {
              node_id: self.graph.node(idx).node_id().to_string(),
              message,
            });
          }
          continue;
        }
        Err(HandlerError::Run(nested)) => {
          let RunFailure {
            error,
            usage,
            node_results,
          } = *nested;
          self.usage.extend(usage);
          self.record_failure(idx, inputs, &error.to_string(), elapsed, node_results);
          if failure.is_none() {
            failure = Some(error);
          }
          continue;
        }
      };

      match outcome.interactive.take() {
        Some(interaction) => {
          self.absorb(&mut outcome);
          let node = self.graph.node(idx);
          info!(
            execution_id = %self.execution_id,
            node_id = %node.node_id(),
            "node_suspended"
          );
          self.node_results.push(NodeResult {
            node_id: node.node_id().to_string(),
            name: node.def.name.clone(),
            kind: node.kind(),
            status: NodeStatus::Suspended,
            inputs,
            outputs: outcome.outputs,
            error: None,
            running_time_ms: millis(elapsed),
            children: outcome.children,
          });
          suspended.push((idx, interaction));
        }
        None => self.complete(idx, inputs, outcome, elapsed, written),
      }
    }

    match failure {
      Some(error) => Err(self.fail(error)),
      None => Ok(suspended),
    }
  }

  fn complete(
    &mut self,
    idx: NodeIndex,
    inputs: Map<String, Value>,
    mut outcome: NodeOutcome,
    elapsed: Duration,
    written: &mut HashSet<EdgeIndex>,
  ) {
    let node = self.graph.node(idx);
    let node_id = node.node_id().to_string();
    let name = node.def.name.clone();
    let kind = node.kind();
    let catch_error = node.def.catch_error;

    for output in node.def.outputs.iter().filter(|o| o.required) {
      if outcome.outputs.contains_key(&output.key) {
        continue;
      }
      if let Some(default) = &output.default_value {
        outcome.outputs.insert(
          output.key.clone(),
          format_value(default.clone(), output.value_type),
        );
      }
    }

    self.graph.node_mut(idx).outputs = outcome.outputs.clone();
    self.absorb(&mut outcome);

    let outgoing = self.graph.outgoing(idx).to_vec();
    let mut skip: HashSet<String> = outcome.skip_handles.into_iter().collect();
    if catch_error {
      if outcome.error.is_some() {
        skip.extend(
          outgoing
            .iter()
            .map(|&e| &self.graph.edge(e).source_handle)
            .filter(|h| h.as_str() != CATCH_SOURCE_HANDLE)
            .cloned(),
        );
      } else {
        skip.insert(CATCH_SOURCE_HANDLE.to_string());
      }
    }

    for e in outgoing {
      let status = if skip.contains(&self.graph.edge(e).source_handle) {
        EdgeStatus::Skipped
      } else {
        EdgeStatus::Active
      };
      self.write_edge(e, status, written);
    }

    info!(
      execution_id = %self.execution_id,
      node_id = %node_id,
      running_time_ms = millis(elapsed),
      "node_completed"
    );
    self.notify(ExecutionEvent::NodeCompleted {
      execution_id: self.execution_id.clone(),
      node_id: node_id.clone(),
      outputs: Value::Object(outcome.outputs.clone()),
    });

    self.node_results.push(NodeResult {
      node_id,
      name,
      kind,
      status: NodeStatus::Completed,
      inputs,
      outputs: outcome.outputs,
      error: outcome.error,
      running_time_ms: millis(elapsed),
      children: outcome.children,
    });
  }

  /// Fold a handler's usage, messages, and variable writes into the run.
  fn absorb(&mut self, outcome: &mut NodeOutcome) {
    self.usage.extend(std::mem::take(&mut outcome.usage));
    self
      .assistant_responses
      .append(&mut outcome.assistant_responses);
    for (key, value) in std::mem::take(&mut outcome.new_variables) {
      self.variables.insert(key.clone(), value.clone());
      self.new_variables.insert(key, value);
    }
  }

  fn skip_node(&mut self, idx: NodeIndex, written: &mut HashSet<EdgeIndex>) {
    let node_id = self.graph.node(idx).node_id().to_string();
    debug!(execution_id = %self.execution_id, node_id = %node_id, "node_skipped");
    self.notify(ExecutionEvent::NodeSkipped {
      execution_id: self.execution_id.clone(),
      node_id,
    });

    for e in self.graph.outgoing(idx).to_vec() {
      self.write_edge(e, EdgeStatus::Skipped, written);
    }
  }

  fn write_edge(&mut self, e: EdgeIndex, status: EdgeStatus, written: &mut HashSet<EdgeIndex>) {
    let changed = self.graph.set_status(e, status);
    written.insert(e);

    let edge = self.graph.edge(e);
    let target = edge.target.index();
    let recursive = edge.is_recursive();

    match status {
      EdgeStatus::Active => {
        self.candidates[target] = true;
        self.activated[target] = true;
        if recursive {
          self.reenter_cycle(e, written);
        }
      }
      EdgeStatus::Skipped if changed => self.candidates[target] = true,
      _ => {}
    }
  }

  fn reenter_cycle(&mut self, back_edge: EdgeIndex, written: &HashSet<EdgeIndex>) {
    for inner in self.graph.cycle_region(back_edge) {
      if written.contains(&inner) {
        continue;
      }
      let initial = self.graph.edge(inner).initial_status();
      self.graph.set_status(inner, initial);
    }
  }

  fn record_failure(
    &mut self,
    idx: NodeIndex,
    inputs: Map<String, Value>,
    message: &str,
    elapsed: Duration,
    children: Vec<NodeResult>,
  ) {
    let node = self.graph.node(idx);
    error!(
      execution_id = %self.execution_id,
      node_id = %node.node_id(),
      error = %message,
      "node_failed"
    );
    self.notify(ExecutionEvent::NodeFailed {
      execution_id: self.execution_id.clone(),
      node_id: node.node_id().to_string(),
      error: message.to_string(),
    });
    self.node_results.push(NodeResult {
      node_id: node.node_id().to_string(),
      name: node.def.name.clone(),
      kind: node.kind(),
      status: NodeStatus::Failed,
      inputs,
      outputs: Map::new(),
      error: Some(message.to_string()),
      running_time_ms: millis(elapsed),
      children,
    });
  }

  fn suspend(self, suspended: Vec<(NodeIndex, Interaction)>) -> RunOutcome {
    let entry_node_ids: Vec<String> = suspended
      .iter()
      .map(|(idx, _)| self.graph.node(*idx).node_id().to_string())
      .collect();

    let is_entry = |idx: NodeIndex| suspended.iter().any(|(s, _)| *s == idx);
    let flagged = |flags: &[bool]| -> Vec<String> {
      self
        .graph
        .node_indices()
        .filter(|&idx| flags[idx.index()] && !is_entry(idx))
        .map(|idx| self.graph.node(idx).node_id().to_string())
        .collect()
    };
    let pending_node_ids = flagged(&self.candidates);
    let activated_node_ids = flagged(&self.activated);

    if suspended.len() > 1 {
      warn!(
        execution_id = %self.execution_id,
        nodes = ?entry_node_ids,
        "several nodes suspended in one pass, keeping the first prompt"
      );
    }

    let interactive = suspended
      .into_iter()
      .next()
      .map(|(_, interaction)| InteractiveState {
        entry_node_ids: entry_node_ids.clone(),
        pending_node_ids,
        activated_node_ids,
        memory_edges: self.graph.edge_states(),
        node_outputs: self.graph.output_states(),
        interaction,
      });

    info!(
      execution_id = %self.execution_id,
      entry_node_ids = ?entry_node_ids,
      "run_suspended"
    );
    self.notify(ExecutionEvent::RunSuspended {
      execution_id: self.execution_id.clone(),
      entry_node_ids,
    });

    self.into_outcome(interactive)
  }

  fn fail(&mut self, error: DispatchError) -> RunFailure {
    if error.is_cancelled() {
      info!(execution_id = %self.execution_id, "run_cancelled");
    } else {
      error!(execution_id = %self.execution_id, error = %error, "run_failed");
    }
    self.notify(ExecutionEvent::RunFailed {
      execution_id: self.execution_id.clone(),
      error: error.to_string(),
    });

    RunFailure {
      error,
      usage: std::mem::take(&mut self.usage),
      node_results: std::mem::take(&mut self.node_results),
    }
  }

  fn into_outcome(self, interactive: Option<InteractiveState>) -> RunOutcome {
    RunOutcome {
      execution_id: self.execution_id,
      node_results: self.node_results,
      usage: self.usage,
      assistant_responses: self.assistant_responses,
      variables: self.variables,
      new_variables: self.new_variables,
      interactive,
    }
  }

  fn notify(&self, event: ExecutionEvent) {
    self.dispatcher.inner.notifier.notify(event);
  }
}

fn millis(elapsed: Duration) -> u64 {
  u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
