use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use loomflow_config::{NodeKind, WorkflowDef};
use loomflow_runtime::{
  ChatItem, Dispatcher, HandlerRegistry, InteractiveState, NodeHandler, RunRequest, RuntimeConfig,
  handlers::PassthroughHandler, last_interactive,
};
use loomflow_workflow::RuntimeGraph;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Loomflow - an edge-state workflow runner
#[derive(Parser)]
#[command(name = "loomflow")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check that a workflow and all of its loop bodies build
  Validate {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,
  },

  /// Run a workflow. Variables are read as a JSON object from stdin.
  Run {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// The user query handed to entry nodes
    #[arg(long)]
    query: Option<String>,
  },

  /// Resume a suspended run from its saved state
  Resume {
    /// Path to the workflow file (JSON)
    workflow_file: PathBuf,

    /// Path to the suspension document printed by a previous run
    #[arg(long, required_unless_present = "history", conflicts_with = "history")]
    state: Option<PathBuf>,

    /// Path to a chat history (JSON array) whose last assistant turn holds
    /// the pending prompt
    #[arg(long)]
    history: Option<PathBuf>,

    /// Answer a select prompt with this option value
    #[arg(long, conflicts_with = "input")]
    select: Option<String>,

    /// Answer a form prompt with this JSON object
    #[arg(long)]
    input: Option<String>,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Validate { workflow_file }) => validate(&workflow_file)?,
    Some(Commands::Run {
      workflow_file,
      query,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run_async(workflow_file, query, None).await })?;
    }
    Some(Commands::Resume {
      workflow_file,
      state,
      history,
      select,
      input,
    }) => {
      let (state, histories) = match (state, history) {
        (Some(path), _) => (load_state(&path)?, Vec::new()),
        (None, Some(path)) => load_history(&path)?,
        (None, None) => bail!("pass --state or --history"),
      };
      let state = answer(state, select, input)?;
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run_async(workflow_file, None, Some((state, histories))).await })?;
    }
    None => {
      println!("loomflow - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_workflow(workflow_file: &Path) -> Result<WorkflowDef> {
  let content = std::fs::read_to_string(workflow_file)
    .with_context(|| format!("failed to read workflow file: {}", workflow_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse workflow file: {}", workflow_file.display()))
}

fn validate(workflow_file: &Path) -> Result<()> {
  let workflow = load_workflow(workflow_file)?;
  let graph = RuntimeGraph::from_workflow(&workflow).context("invalid workflow graph")?;
  describe("workflow", &graph);

  for node in workflow.nodes.iter().filter(|n| n.kind == NodeKind::Loop) {
    let body = RuntimeGraph::loop_body(&workflow, &node.node_id)
      .with_context(|| format!("invalid body for loop '{}'", node.node_id))?;
    describe(&node.node_id, &body);
  }

  eprintln!("Workflow '{}' is valid", workflow.name);
  Ok(())
}

fn describe(scope: &str, graph: &RuntimeGraph) {
  let back_edges = graph.edges().iter().filter(|e| e.is_recursive()).count();
  eprintln!(
    "{}: {} nodes, {} edges ({} loop-closing), {} entries",
    scope,
    graph.node_count(),
    graph.edges().len(),
    back_edges,
    graph.entries().len()
  );
}

fn load_state(state_file: &Path) -> Result<InteractiveState> {
  let content = std::fs::read_to_string(state_file)
    .with_context(|| format!("failed to read state file: {}", state_file.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse state file: {}", state_file.display()))
}

/// The pending prompt left in a chat history, along with the history itself.
/// The answered turn is trimmed by the run.
fn load_history(history_file: &Path) -> Result<(InteractiveState, Vec<ChatItem>)> {
  let content = std::fs::read_to_string(history_file)
    .with_context(|| format!("failed to read history file: {}", history_file.display()))?;
  let histories: Vec<ChatItem> = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse history file: {}", history_file.display()))?;

  let Some(state) = last_interactive(&histories).cloned() else {
    bail!("the last assistant turn has no pending prompt");
  };
  Ok((state, histories))
}

fn answer(
  mut state: InteractiveState,
  select: Option<String>,
  input: Option<String>,
) -> Result<InteractiveState> {
  if let Some(value) = select {
    if !state.answer_select(value) {
      bail!("the pending prompt is not a select");
    }
  }
  if let Some(raw) = input {
    let answers: Map<String, Value> =
      serde_json::from_str(&raw).context("failed to parse --input as a JSON object")?;
    if !state.submit_input(answers) {
      bail!("the pending prompt is not a form");
    }
  }
  if state.is_pending() {
    bail!("the pending prompt has no answer; pass --select or --input");
  }

  Ok(state)
}

/// Built-in handlers, with a passthrough for every kind the engine does not
/// run itself.
fn registry() -> HandlerRegistry {
  let mut registry = HandlerRegistry::with_builtins();
  let passthrough: Arc<dyn NodeHandler> = Arc::new(PassthroughHandler);
  for kind in NodeKind::ALL {
    if !registry.contains(kind) {
      registry.register_shared(kind, passthrough.clone());
    }
  }
  registry
}

async fn run_async(
  workflow_file: PathBuf,
  query: Option<String>,
  resume: Option<(InteractiveState, Vec<ChatItem>)>,
) -> Result<()> {
  let workflow = load_workflow(&workflow_file)?;
  eprintln!("Loaded workflow: {}", workflow.name);

  let variables = read_variables_from_stdin()?;

  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("interrupt received, cancelling run");
      on_signal.cancel();
    }
  });

  let mut request = RunRequest::new(Arc::new(workflow))
    .with_variables(variables)
    .with_cancel(cancel);
  if let Some(query) = query {
    request = request.with_query(query);
  }
  if let Some((state, histories)) = resume {
    request = request.with_resume(state).with_histories(histories);
  }

  let dispatcher = Dispatcher::new(registry(), RuntimeConfig::from_env());
  let outcome = dispatcher
    .run_workflow(request)
    .await
    .context("workflow execution failed")?;

  eprintln!("Execution finished: {}", outcome.execution_id);
  eprintln!("Nodes executed: {}", outcome.node_results.len());
  if outcome.is_suspended() {
    eprintln!("Run suspended; save the `interactive` document to resume");
  }

  println!("{}", serde_json::to_string_pretty(&outcome)?);

  Ok(())
}

fn read_variables_from_stdin() -> Result<Map<String, Value>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(Map::new());
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read variables from stdin")?;

  if input.trim().is_empty() {
    Ok(Map::new())
  } else {
    serde_json::from_str(&input).context("failed to parse variables JSON from stdin")
  }
}
