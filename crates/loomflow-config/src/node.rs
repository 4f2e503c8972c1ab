use serde::{Deserialize, Serialize};

use crate::enums::{NodeKind, ValueType};
use crate::input::InputValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDef {
  pub key: String,
  #[serde(default)]
  pub value_type: ValueType,
  #[serde(default)]
  pub value: InputValue,
  #[serde(default)]
  pub required: bool,
}

impl InputDef {
  pub fn new(key: impl Into<String>, value: InputValue) -> Self {
    Self {
      key: key.into(),
      value_type: ValueType::Any,
      value,
      required: false,
    }
  }

  pub fn typed(mut self, value_type: ValueType) -> Self {
    self.value_type = value_type;
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDef {
  pub key: String,
  #[serde(default)]
  pub value_type: ValueType,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_value: Option<serde_json::Value>,
  #[serde(default)]
  pub required: bool,
}

impl OutputDef {
  pub fn new(key: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      value_type: ValueType::Any,
      default_value: None,
      required: false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  #[serde(default)]
  pub name: String,
  pub kind: NodeKind,
  /// Explicitly marks the node as a run entry regardless of its kind.
  #[serde(default)]
  pub is_entry: bool,
  /// Turns handler failures into typed error output on the catch handle.
  #[serde(default)]
  pub catch_error: bool,
  /// Owning loop node when this node belongs to a loop body.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_node_id: Option<String>,
  #[serde(default)]
  pub inputs: Vec<InputDef>,
  #[serde(default)]
  pub outputs: Vec<OutputDef>,
}

impl NodeDef {
  pub fn new(node_id: impl Into<String>, kind: NodeKind) -> Self {
    let node_id = node_id.into();
    Self {
      name: node_id.clone(),
      node_id,
      kind,
      is_entry: false,
      catch_error: false,
      parent_node_id: None,
      inputs: Vec::new(),
      outputs: Vec::new(),
    }
  }

  pub fn with_input(mut self, key: impl Into<String>, value: InputValue) -> Self {
    self.inputs.push(InputDef::new(key, value));
    self
  }

  pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
    self.parent_node_id = Some(parent.into());
    self
  }

  pub fn input(&self, key: &str) -> Option<&InputDef> {
    self.inputs.iter().find(|i| i.key == key)
  }

  /// A node is a designated entry when flagged or of an entry kind.
  pub fn is_designated_entry(&self) -> bool {
    self.is_entry || self.kind.is_entry_kind()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_node_def_defaults() {
    let node: NodeDef = serde_json::from_value(json!({
      "node_id": "ask",
      "kind": "userSelect",
    }))
    .unwrap();
    assert!(!node.is_entry);
    assert!(node.inputs.is_empty());
    assert!(!node.is_designated_entry());
  }

  #[test]
  fn test_node_def_inputs_keep_order() {
    let node: NodeDef = serde_json::from_value(json!({
      "node_id": "http",
      "kind": "httpRequest",
      "inputs": [
        { "key": "url", "value": { "type": "literal", "value": "https://example.com" } },
        { "key": "body", "value_type": "object", "value": { "type": "reference", "node_id": "start", "output_key": "payload" } },
      ],
    }))
    .unwrap();
    let keys: Vec<_> = node.inputs.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, vec!["url", "body"]);
    assert_eq!(node.inputs[1].value_type, ValueType::Object);
    assert_eq!(
      node.inputs[1].value,
      InputValue::reference("start", "payload")
    );
  }

  #[test]
  fn test_flagged_node_is_entry() {
    let mut node = NodeDef::new("answer", NodeKind::Answer);
    assert!(!node.is_designated_entry());
    node.is_entry = true;
    assert!(node.is_designated_entry());
  }
}
