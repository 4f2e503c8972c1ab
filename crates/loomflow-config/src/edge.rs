use serde::{Deserialize, Serialize};

/// Handle used by ordinary outgoing edges.
pub const DEFAULT_SOURCE_HANDLE: &str = "source";
/// Handle used by ordinary incoming edges.
pub const DEFAULT_TARGET_HANDLE: &str = "target";
/// Outgoing handle taken when a `catch_error` node fails.
pub const CATCH_SOURCE_HANDLE: &str = "source_catch";
/// Tool-selection wiring. Not control flow.
pub const SELECTED_TOOLS_HANDLE: &str = "selectedTools";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
  pub source: String,
  #[serde(default = "default_source_handle")]
  pub source_handle: String,
  pub target: String,
  #[serde(default = "default_target_handle")]
  pub target_handle: String,
}

impl EdgeDef {
  /// An edge between the default handles of two nodes.
  pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      source: source.into(),
      source_handle: default_source_handle(),
      target: target.into(),
      target_handle: default_target_handle(),
    }
  }

  /// An edge leaving a specific source handle.
  pub fn from_handle(
    source: impl Into<String>,
    source_handle: impl Into<String>,
    target: impl Into<String>,
  ) -> Self {
    Self {
      source_handle: source_handle.into(),
      ..Self::new(source, target)
    }
  }

  /// Whether the edge carries control flow. Tool-selection edges only wire
  /// a tool into its caller and never gate scheduling.
  pub fn is_control_flow(&self) -> bool {
    self.source_handle != SELECTED_TOOLS_HANDLE && self.target_handle != SELECTED_TOOLS_HANDLE
  }
}

fn default_source_handle() -> String {
  DEFAULT_SOURCE_HANDLE.to_string()
}

fn default_target_handle() -> String {
  DEFAULT_TARGET_HANDLE.to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_handles_default_when_omitted() {
    let edge: EdgeDef = serde_json::from_str(r#"{"source":"a","target":"b"}"#).unwrap();
    assert_eq!(edge, EdgeDef::new("a", "b"));
  }

  #[test]
  fn test_tool_selection_edges_are_not_control_flow() {
    let edge = EdgeDef::from_handle("agent", SELECTED_TOOLS_HANDLE, "search");
    assert!(!edge.is_control_flow());
    assert!(EdgeDef::new("a", "b").is_control_flow());
  }
}
