//! Input resolution using references, variables, and minijinja templates.
//!
//! Resolves a node's input slots right before it runs, then coerces each value
//! to the slot's declared [`ValueType`].
//!
//! # Flow
//! 1. Source lookup: literal, variable, `[node_id, output_key]` reference, or
//!    rendered template
//! 2. Type formatting: strings parse into numbers, booleans, objects, and
//!    arrays; scalars wrap into arrays; structured values stringify
//!
//! # Template context
//! Variables sit at the top level and finished node outputs under `nodes`:
//! ```json
//! { "greeting": "Hello {{ userName }}!", "summary": "{{ nodes.search.answer }}" }
//! ```

use loomflow_config::{InputValue, ValueType};
use loomflow_workflow::RuntimeNode;
use minijinja::Environment;
use serde_json::{Map, Number, Value};

use crate::error::DispatchError;

/// Resolve every input slot of `node`.
///
/// `node_outputs` maps node ids to the object of outputs each has produced.
pub fn resolve_inputs(
  node: &RuntimeNode,
  node_outputs: &Map<String, Value>,
  variables: &Map<String, Value>,
) -> Result<Map<String, Value>, DispatchError> {
  let node_id = node.node_id();
  let error = |message: String| DispatchError::InputResolution {
    node_id: node_id.to_string(),
    message,
  };

  let env = Environment::new();
  let mut context = None;
  let mut resolved = Map::new();

  for input in &node.def.inputs {
    let raw = match &input.value {
      InputValue::Literal { value } => value.clone(),

      InputValue::Variable { key } => variables.get(key).cloned().unwrap_or(Value::Null),

      InputValue::Reference {
        node_id: source,
        output_key,
      } => {
        let outputs = node_outputs.get(source).ok_or_else(|| {
          error(format!(
            "input '{}' references node '{}' which has no outputs",
            input.key, source
          ))
        })?;
        outputs.get(output_key).cloned().unwrap_or(Value::Null)
      }

      InputValue::Template { template } => {
        let ctx = context.get_or_insert_with(|| template_context(node_outputs, variables));
        let rendered = env
          .render_str(template, ctx.clone())
          .map_err(|e| error(format!("failed to resolve input '{}': {}", input.key, e)))?;
        Value::String(rendered)
      }
    };

    let value = format_value(raw, input.value_type);
    if input.required && value.is_null() {
      return Err(error(format!("required input '{}' is empty", input.key)));
    }
    resolved.insert(input.key.clone(), value);
  }

  Ok(resolved)
}

fn template_context(
  node_outputs: &Map<String, Value>,
  variables: &Map<String, Value>,
) -> minijinja::Value {
  let mut ctx = variables.clone();
  ctx.insert("nodes".to_string(), Value::Object(node_outputs.clone()));
  minijinja::Value::from_serialize(&ctx)
}

/// Coerce a value to a declared type. Null passes through untouched and
/// values that cannot be coerced are kept as they are, except numbers,
/// which become null.
pub fn format_value(value: Value, value_type: ValueType) -> Value {
  if value.is_null() {
    return value;
  }

  match value_type {
    ValueType::Any => value,

    ValueType::String => match value {
      Value::String(_) => value,
      other => Value::String(other.to_string()),
    },

    ValueType::Number => match value {
      Value::Number(_) => value,
      Value::String(s) => parse_number(s.trim()),
      Value::Bool(b) => Value::from(i64::from(b)),
      _ => Value::Null,
    },

    ValueType::Boolean => match value {
      Value::Bool(_) => value,
      Value::String(s) => Value::Bool(s.trim().eq_ignore_ascii_case("true")),
      Value::Number(n) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
      _ => Value::Bool(true),
    },

    ValueType::Object => match value {
      Value::String(s) => match serde_json::from_str::<Value>(&s) {
        Ok(parsed @ Value::Object(_)) => parsed,
        _ => Value::String(s),
      },
      other => other,
    },

    ValueType::ArrayString
    | ValueType::ArrayNumber
    | ValueType::ArrayBoolean
    | ValueType::ArrayObject
    | ValueType::ArrayAny
    | ValueType::ChatHistory => match value {
      Value::Array(_) => value,
      Value::String(s) => match serde_json::from_str::<Value>(&s) {
        Ok(parsed @ Value::Array(_)) => parsed,
        _ => Value::Array(vec![Value::String(s)]),
      },
      other => Value::Array(vec![other]),
    },
  }
}

fn parse_number(s: &str) -> Value {
  if let Ok(n) = s.parse::<i64>() {
    return Value::from(n);
  }
  s.parse::<f64>()
    .ok()
    .and_then(Number::from_f64)
    .map(Value::Number)
    .unwrap_or(Value::Null)
}
