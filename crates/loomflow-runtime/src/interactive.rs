//! Suspension documents.
//!
//! When a handler needs a human, the run stops and hands back an
//! [`InteractiveState`]. The caller stores it, fills in the answer, and
//! passes it back to resume. The document is plain tagged JSON:
//!
//! ```json
//! {
//!   "entryNodeIds": ["ask"],
//!   "memoryEdges": [{ "source": "start", "sourceHandle": "source", "target": "ask", "targetHandle": "target", "status": "active" }],
//!   "nodeOutputs": [{ "nodeId": "start", "key": "userChatInput", "value": "hi" }],
//!   "interaction": { "type": "userSelect", "params": { "options": [{ "key": "yes", "value": "Yes" }], "userSelectVal": null } }
//! }
//! ```
//!
//! A suspension inside a loop body nests: the loop node's interaction is
//! `loopInteractive`, whose `childrenResponse` is the body's own document.

use loomflow_config::ValueType;
use loomflow_workflow::{EdgeState, NodeOutputState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bound on loop nesting followed when looking for the innermost prompt.
pub const MAX_INTERACTIVE_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveState {
  /// Nodes to run first when resuming.
  pub entry_node_ids: Vec<String>,
  /// Nodes whose incoming edges were written but that had not been examined
  /// yet. Work finished alongside the suspended nodes continues from here.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub pending_node_ids: Vec<String>,
  /// Nodes holding an unconsumed activation at suspension.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub activated_node_ids: Vec<String>,
  /// Edge statuses at the moment of suspension.
  pub memory_edges: Vec<EdgeState>,
  /// Outputs produced before suspension.
  #[serde(default)]
  pub node_outputs: Vec<NodeOutputState>,
  pub interaction: Interaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "camelCase")]
pub enum Interaction {
  UserSelect(UserSelectParams),
  UserInput(UserInputParams),
  LoopInteractive(LoopState),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSelectOption {
  /// Outgoing handle taken when this option is chosen.
  pub key: String,
  pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSelectParams {
  #[serde(default)]
  pub description: String,
  pub options: Vec<UserSelectOption>,
  #[serde(default)]
  pub user_select_val: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFormItem {
  pub key: String,
  #[serde(default)]
  pub label: String,
  #[serde(default)]
  pub value_type: ValueType,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputParams {
  #[serde(default)]
  pub description: String,
  pub input_form: Vec<InputFormItem>,
  #[serde(default)]
  pub submitted: bool,
  #[serde(default)]
  pub answers: Map<String, Value>,
}

/// Progress of a loop node across suspensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
  /// Index of the iteration that suspended.
  pub current_index: usize,
  /// Results of the iterations before `current_index`.
  #[serde(default)]
  pub loop_result: Vec<Value>,
  /// The suspended iteration's own state.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub children_response: Option<Box<InteractiveState>>,
}

impl InteractiveState {
  /// The innermost suspension, following nested loop interactions.
  pub fn deepest(&self) -> &InteractiveState {
    let mut current = self;
    for _ in 0..MAX_INTERACTIVE_DEPTH {
      match &current.interaction {
        Interaction::LoopInteractive(LoopState {
          children_response: Some(child),
          ..
        }) => current = child.as_ref(),
        _ => break,
      }
    }
    current
  }

  /// Whether the innermost prompt still needs an answer.
  pub fn is_pending(&self) -> bool {
    match &self.deepest().interaction {
      Interaction::UserSelect(params) => params.user_select_val.is_none(),
      Interaction::UserInput(params) => !params.submitted,
      Interaction::LoopInteractive(_) => true,
    }
  }

  /// Record the chosen option on the innermost select prompt.
  ///
  /// Returns `false` when the innermost prompt is not a select.
  pub fn answer_select(&mut self, value: impl Into<String>) -> bool {
    let value = value.into();
    self.visit_deepest(0, move |state| match &mut state.interaction {
      Interaction::UserSelect(params) => {
        params.user_select_val = Some(value);
        true
      }
      _ => false,
    })
  }

  /// Submit answers to the innermost form prompt.
  ///
  /// Returns `false` when the innermost prompt is not a form.
  pub fn submit_input(&mut self, answers: Map<String, Value>) -> bool {
    self.visit_deepest(0, move |state| match &mut state.interaction {
      Interaction::UserInput(params) => {
        params.answers = answers;
        params.submitted = true;
        true
      }
      _ => false,
    })
  }

  fn visit_deepest<R>(&mut self, depth: usize, f: impl FnOnce(&mut InteractiveState) -> R) -> R {
    if depth < MAX_INTERACTIVE_DEPTH {
      if let Interaction::LoopInteractive(LoopState {
        children_response: Some(child),
        ..
      }) = &mut self.interaction
      {
        return child.visit_deepest(depth + 1, f);
      }
    }
    f(self)
  }
}

#[cfg(test)]
mod tests {
  use loomflow_config::EdgeStatus;
  use serde_json::json;

  use super::*;

  fn select_state() -> InteractiveState {
    InteractiveState {
      entry_node_ids: vec!["ask".to_string()],
      pending_node_ids: vec![],
      activated_node_ids: vec![],
      memory_edges: vec![EdgeState {
        source: "start".to_string(),
        source_handle: "source".to_string(),
        target: "ask".to_string(),
        target_handle: "target".to_string(),
        status: EdgeStatus::Active,
      }],
      node_outputs: vec![],
      interaction: Interaction::UserSelect(UserSelectParams {
        description: "Continue?".to_string(),
        options: vec![
          UserSelectOption {
            key: "yes".to_string(),
            value: "Yes".to_string(),
          },
          UserSelectOption {
            key: "no".to_string(),
            value: "No".to_string(),
          },
        ],
        user_select_val: None,
      }),
    }
  }

  fn nested(child: InteractiveState, index: usize) -> InteractiveState {
    InteractiveState {
      entry_node_ids: vec!["loop".to_string()],
      pending_node_ids: vec![],
      activated_node_ids: vec![],
      memory_edges: vec![],
      node_outputs: vec![],
      interaction: Interaction::LoopInteractive(LoopState {
        current_index: index,
        loop_result: vec![json!(index)],
        children_response: Some(Box::new(child)),
      }),
    }
  }

  #[test]
  fn test_document_shape() {
    let json = serde_json::to_value(select_state()).unwrap();
    assert_eq!(json["entryNodeIds"], json!(["ask"]));
    assert_eq!(json["memoryEdges"][0]["status"], "active");
    assert_eq!(json["interaction"]["type"], "userSelect");
    assert_eq!(json["interaction"]["params"]["options"][1]["key"], "no");
  }

  #[test]
  fn test_nested_state_survives_json() {
    let state = nested(nested(select_state(), 3), 1);
    let text = serde_json::to_string(&state).unwrap();
    let parsed: InteractiveState = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, state);

    let json: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["interaction"]["type"], "loopInteractive");
    assert_eq!(json["interaction"]["params"]["currentIndex"], 1);
    assert_eq!(
      json["interaction"]["params"]["childrenResponse"]["interaction"]["params"]["currentIndex"],
      3
    );
  }

  #[test]
  fn test_answer_reaches_innermost_prompt() {
    let mut state = nested(nested(select_state(), 0), 2);
    assert!(state.is_pending());
    assert!(state.answer_select("Yes"));
    assert!(!state.is_pending());

    match &state.deepest().interaction {
      Interaction::UserSelect(params) => {
        assert_eq!(params.user_select_val.as_deref(), Some("Yes"))
      }
      other => panic!("unexpected interaction: {:?}", other),
    }
  }

  #[test]
  fn test_submit_input_rejects_select_prompt() {
    let mut state = select_state();
    assert!(!state.submit_input(Map::new()));
    assert!(state.is_pending());
  }
}
