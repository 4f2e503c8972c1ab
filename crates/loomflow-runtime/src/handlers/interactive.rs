use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::HandlerError;
use crate::handler::{NodeContext, NodeHandler, NodeOutcome};
use crate::input::format_value;
use crate::interactive::{
  InputFormItem, Interaction, UserInputParams, UserSelectOption, UserSelectParams,
};

pub const DESCRIPTION: &str = "description";
pub const USER_SELECT_OPTIONS: &str = "userSelectOptions";
pub const SELECT_RESULT: &str = "selectResult";
pub const USER_INPUT_FORMS: &str = "userInputForms";
pub const FORM_INPUT_RESULT: &str = "formInputResult";

fn parse_input<T: DeserializeOwned>(ctx: &NodeContext, key: &str) -> Result<Vec<T>, HandlerError> {
  match ctx.input(key) {
    Some(value) => serde_json::from_value(value.clone())
      .map_err(|e| HandlerError::failed(format!("invalid '{key}': {e}"))),
    None => Ok(Vec::new()),
  }
}

/// Asks the user to pick one option. Each option's key is a source handle;
/// the handles of the options not picked are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserSelectHandler;

#[async_trait]
impl NodeHandler for UserSelectHandler {
  async fn execute(&self, mut ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    let options: Vec<UserSelectOption> = parse_input(&ctx, USER_SELECT_OPTIONS)?;

    let selected = match ctx.resume.take() {
      Some(Interaction::UserSelect(UserSelectParams {
        user_select_val: Some(selected),
        ..
      })) => selected,
      _ => {
        return Ok(NodeOutcome::suspend(Interaction::UserSelect(
          UserSelectParams {
            description: ctx.input_str(DESCRIPTION).unwrap_or_default().to_string(),
            options,
            user_select_val: None,
          },
        )));
      }
    };

    let chosen = options
      .iter()
      .find(|o| o.value == selected)
      .ok_or_else(|| HandlerError::failed(format!("'{selected}' is not one of the offered options")))?;

    let mut outcome = NodeOutcome::new().output(SELECT_RESULT, selected.clone());
    outcome.skip_handles = options
      .iter()
      .filter(|o| o.key != chosen.key)
      .map(|o| o.key.clone())
      .collect();
    Ok(outcome)
  }
}

/// Asks the user to fill a form. Each answer becomes an output named after
/// its form key; `formInputResult` holds them all.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserInputHandler;

#[async_trait]
impl NodeHandler for UserInputHandler {
  async fn execute(&self, mut ctx: NodeContext) -> Result<NodeOutcome, HandlerError> {
    let form: Vec<InputFormItem> = parse_input(&ctx, USER_INPUT_FORMS)?;

    let answers = match ctx.resume.take() {
      Some(Interaction::UserInput(UserInputParams {
        submitted: true,
        answers,
        ..
      })) => answers,
      _ => {
        return Ok(NodeOutcome::suspend(Interaction::UserInput(UserInputParams {
          description: ctx.input_str(DESCRIPTION).unwrap_or_default().to_string(),
          input_form: form,
          submitted: false,
          answers: Map::new(),
        })));
      }
    };

    let mut outcome = NodeOutcome::new();
    let mut result = Map::new();
    for item in &form {
      let value = answers
        .get(&item.key)
        .filter(|v| !v.is_null())
        .or(item.default_value.as_ref())
        .cloned()
        .map(|v| format_value(v, item.value_type))
        .unwrap_or(Value::Null);
      if item.required && value.is_null() {
        return Err(HandlerError::failed(format!(
          "form field '{}' is required",
          item.key
        )));
      }
      result.insert(item.key.clone(), value.clone());
      outcome.outputs.insert(item.key.clone(), value);
    }
    outcome
      .outputs
      .insert(FORM_INPUT_RESULT.to_string(), Value::Object(result));
    Ok(outcome)
  }
}
