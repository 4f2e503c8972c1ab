use loomflow_config::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::interactive::InteractiveState;

/// Points consumed by one node execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageItem {
  pub node_id: String,
  pub module_name: String,
  pub total_points: f64,
  #[serde(default)]
  pub tokens: u64,
}

/// Usage accumulated over a run, including nested loop iterations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
  pub items: Vec<UsageItem>,
}

impl Usage {
  pub fn push(&mut self, item: UsageItem) {
    self.items.push(item);
  }

  pub fn extend(&mut self, other: Usage) {
    self.items.extend(other.items);
  }

  pub fn total_points(&self) -> f64 {
    self.items.iter().map(|i| i.total_points).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

/// A user-visible message produced by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantResponse {
  pub node_id: String,
  pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Completed,
  Failed,
  Suspended,
}

/// Record of one node execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
  pub node_id: String,
  pub name: String,
  pub kind: NodeKind,
  pub status: NodeStatus,
  #[serde(default)]
  pub inputs: Map<String, Value>,
  #[serde(default)]
  pub outputs: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub running_time_ms: u64,
  /// Executions inside this node's loop body.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub children: Vec<NodeResult>,
}

/// Result of a run that finished or suspended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
  pub execution_id: String,
  /// Node executions in commit order.
  pub node_results: Vec<NodeResult>,
  pub usage: Usage,
  pub assistant_responses: Vec<AssistantResponse>,
  /// The variable map after the run.
  pub variables: Map<String, Value>,
  /// Variables written by handlers during this run.
  pub new_variables: Map<String, Value>,
  /// Present when the run suspended waiting for input.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub interactive: Option<InteractiveState>,
}

impl RunOutcome {
  pub fn is_suspended(&self) -> bool {
    self.interactive.is_some()
  }

  /// Latest outputs of every completed node, keyed by node id.
  pub fn final_outputs(&self) -> Map<String, Value> {
    let mut outputs = Map::new();
    for result in &self.node_results {
      if result.status == NodeStatus::Completed {
        outputs.insert(result.node_id.clone(), Value::Object(result.outputs.clone()));
      }
    }
    outputs
  }

  /// The most recent execution of a node.
  pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
    self.node_results.iter().rev().find(|r| r.node_id == node_id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn result(node_id: &str, status: NodeStatus, outputs: Value) -> NodeResult {
    NodeResult {
      node_id: node_id.to_string(),
      name: node_id.to_string(),
      kind: NodeKind::Code,
      status,
      inputs: Map::new(),
      outputs: outputs.as_object().cloned().unwrap_or_default(),
      error: None,
      running_time_ms: 0,
      children: Vec::new(),
    }
  }

  #[test]
  fn test_usage_totals_across_items() {
    let mut usage = Usage::default();
    usage.push(UsageItem {
      node_id: "a".to_string(),
      module_name: "a".to_string(),
      total_points: 1.5,
      tokens: 10,
    });
    let mut nested = Usage::default();
    nested.push(UsageItem {
      total_points: 2.0,
      ..UsageItem::default()
    });
    usage.extend(nested);
    assert_eq!(usage.total_points(), 3.5);
  }

  #[test]
  fn test_final_outputs_keep_latest_completed() {
    let outcome = RunOutcome {
      execution_id: "exec".to_string(),
      node_results: vec![
        result("a", NodeStatus::Completed, json!({"n": 1})),
        result("a", NodeStatus::Completed, json!({"n": 2})),
        result("b", NodeStatus::Suspended, json!({})),
      ],
      usage: Usage::default(),
      assistant_responses: vec![],
      variables: Map::new(),
      new_variables: Map::new(),
      interactive: None,
    };

    let outputs = outcome.final_outputs();
    assert_eq!(outputs["a"], json!({"n": 2}));
    assert!(!outputs.contains_key("b"));
    assert_eq!(outcome.result("a").unwrap().outputs["n"], json!(2));
  }
}
