//! Input value sources for node input slots.
//!
//! An input slot is filled from one of four sources when its node is about to
//! run:
//!
//! ```json
//! { "type": "literal", "value": 42 }
//! { "type": "reference", "node_id": "search", "output_key": "answer" }
//! { "type": "variable", "key": "userName" }
//! { "type": "template", "template": "Hello {{ userName | title }}!" }
//! ```
//!
//! Templates are rendered by minijinja against the run's variables, with
//! finished node outputs available under `nodes.<node_id>.<key>`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputValue {
  Literal {
    #[serde(default)]
    value: serde_json::Value,
  },
  Template {
    template: String,
  },
  Reference {
    node_id: String,
    output_key: String,
  },
  Variable {
    key: String,
  },
}

impl InputValue {
  pub fn literal(value: impl Into<serde_json::Value>) -> Self {
    InputValue::Literal {
      value: value.into(),
    }
  }

  pub fn reference(node_id: impl Into<String>, output_key: impl Into<String>) -> Self {
    InputValue::Reference {
      node_id: node_id.into(),
      output_key: output_key.into(),
    }
  }
}

impl Default for InputValue {
  fn default() -> Self {
    InputValue::Literal {
      value: serde_json::Value::Null,
    }
  }
}
