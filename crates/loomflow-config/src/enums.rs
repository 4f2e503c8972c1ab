use serde::{Deserialize, Serialize};

/// The closed set of node kinds a workflow may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
  WorkflowStart,
  SystemConfig,
  PluginInput,
  Tool,
  LoopStart,
  LoopEnd,
  Loop,
  IfElse,
  ClassifyQuestion,
  UserSelect,
  UserInput,
  ChatNode,
  Answer,
  HttpRequest,
  DatasetSearch,
  Code,
  TextEditor,
  VariableUpdate,
  PluginOutput,
}

impl NodeKind {
  pub const ALL: [NodeKind; 19] = [
    NodeKind::WorkflowStart,
    NodeKind::SystemConfig,
    NodeKind::PluginInput,
    NodeKind::Tool,
    NodeKind::LoopStart,
    NodeKind::LoopEnd,
    NodeKind::Loop,
    NodeKind::IfElse,
    NodeKind::ClassifyQuestion,
    NodeKind::UserSelect,
    NodeKind::UserInput,
    NodeKind::ChatNode,
    NodeKind::Answer,
    NodeKind::HttpRequest,
    NodeKind::DatasetSearch,
    NodeKind::Code,
    NodeKind::TextEditor,
    NodeKind::VariableUpdate,
    NodeKind::PluginOutput,
  ];

  /// Kinds that start a run (or a loop iteration) without any incoming edge.
  pub fn is_entry_kind(&self) -> bool {
    matches!(
      self,
      NodeKind::WorkflowStart | NodeKind::SystemConfig | NodeKind::PluginInput | NodeKind::LoopStart
    )
  }
}

/// Control-flow state carried by an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
  #[default]
  Waiting,
  Active,
  Skipped,
}

/// Declared type of an input or output slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
  #[default]
  Any,
  String,
  Number,
  Boolean,
  Object,
  ArrayString,
  ArrayNumber,
  ArrayBoolean,
  ArrayObject,
  ArrayAny,
  ChatHistory,
}

impl ValueType {
  pub fn is_array(&self) -> bool {
    matches!(
      self,
      ValueType::ArrayString
        | ValueType::ArrayNumber
        | ValueType::ArrayBoolean
        | ValueType::ArrayObject
        | ValueType::ArrayAny
        | ValueType::ChatHistory
    )
  }

  /// The element type of an array type, `None` for scalars.
  pub fn element(&self) -> Option<ValueType> {
    match self {
      ValueType::ArrayString => Some(ValueType::String),
      ValueType::ArrayNumber => Some(ValueType::Number),
      ValueType::ArrayBoolean => Some(ValueType::Boolean),
      ValueType::ArrayObject | ValueType::ChatHistory => Some(ValueType::Object),
      ValueType::ArrayAny => Some(ValueType::Any),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_node_kind_wire_names() {
    let kind: NodeKind = serde_json::from_str("\"workflowStart\"").unwrap();
    assert_eq!(kind, NodeKind::WorkflowStart);
    assert_eq!(
      serde_json::to_string(&NodeKind::ClassifyQuestion).unwrap(),
      "\"classifyQuestion\""
    );
  }

  #[test]
  fn test_entry_kinds() {
    assert!(NodeKind::WorkflowStart.is_entry_kind());
    assert!(NodeKind::LoopStart.is_entry_kind());
    assert!(!NodeKind::Tool.is_entry_kind());
    assert!(!NodeKind::Answer.is_entry_kind());
  }

  #[test]
  fn test_array_value_types() {
    assert!(ValueType::ArrayNumber.is_array());
    assert_eq!(ValueType::ArrayNumber.element(), Some(ValueType::Number));
    assert_eq!(ValueType::String.element(), None);
    let parsed: ValueType = serde_json::from_str("\"arrayString\"").unwrap();
    assert_eq!(parsed, ValueType::ArrayString);
  }
}
