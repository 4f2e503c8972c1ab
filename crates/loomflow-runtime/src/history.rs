//! Conversation history helpers.
//!
//! A suspended run leaves its prompt as the last assistant turn. On resume
//! that turn has been answered and is dropped before the run continues.

use serde::{Deserialize, Serialize};

use crate::interactive::{Interaction, InteractiveState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  Human,
  Ai,
  System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatValue {
  Text { content: String },
  Interactive { interactive: InteractiveState },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatItem {
  pub role: ChatRole,
  pub value: Vec<ChatValue>,
}

impl ChatItem {
  pub fn text(role: ChatRole, content: impl Into<String>) -> Self {
    Self {
      role,
      value: vec![ChatValue::Text {
        content: content.into(),
      }],
    }
  }

  fn trailing_interactive(&self) -> Option<&InteractiveState> {
    if self.role != ChatRole::Ai {
      return None;
    }
    match self.value.last() {
      Some(ChatValue::Interactive { interactive }) => Some(interactive),
      _ => None,
    }
  }
}

/// The still-unanswered prompt left by the last assistant turn, if any.
///
/// Turns after the last assistant turn (typically the human reply) are
/// ignored.
pub fn last_interactive(histories: &[ChatItem]) -> Option<&InteractiveState> {
  let state = histories
    .iter()
    .rev()
    .find(|item| item.role == ChatRole::Ai)?
    .trailing_interactive()?;
  let pending = match &state.interaction {
    Interaction::LoopInteractive(_) => true,
    Interaction::UserSelect(params) => params.user_select_val.is_none(),
    Interaction::UserInput(params) => !params.submitted,
  };
  pending.then_some(state)
}

/// Remove the last assistant turn that ended in a prompt, and anything
/// after it. Returns whether a turn was removed.
pub fn drop_interactive_turn(histories: &mut Vec<ChatItem>) -> bool {
  match histories
    .iter()
    .rposition(|item| item.trailing_interactive().is_some())
  {
    Some(pos) => {
      histories.truncate(pos);
      true
    }
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use crate::interactive::{UserInputParams, UserSelectParams};

  use super::*;

  fn prompt(interaction: Interaction) -> ChatItem {
    ChatItem {
      role: ChatRole::Ai,
      value: vec![
        ChatValue::Text {
          content: "Please choose".to_string(),
        },
        ChatValue::Interactive {
          interactive: InteractiveState {
            entry_node_ids: vec!["ask".to_string()],
            pending_node_ids: vec![],
            activated_node_ids: vec![],
            memory_edges: vec![],
            node_outputs: vec![],
            interaction,
          },
        },
      ],
    }
  }

  #[test]
  fn test_unanswered_select_is_pending() {
    let histories = vec![
      ChatItem::text(ChatRole::Human, "hi"),
      prompt(Interaction::UserSelect(UserSelectParams::default())),
    ];
    assert!(last_interactive(&histories).is_some());
  }

  #[test]
  fn test_submitted_form_is_not_pending() {
    let histories = vec![prompt(Interaction::UserInput(UserInputParams {
      submitted: true,
      ..UserInputParams::default()
    }))];
    assert!(last_interactive(&histories).is_none());
  }

  #[test]
  fn test_prompt_found_behind_human_reply() {
    let histories = vec![
      prompt(Interaction::UserSelect(UserSelectParams::default())),
      ChatItem::text(ChatRole::Human, "Yes"),
    ];
    let state = last_interactive(&histories).unwrap();
    assert_eq!(state.entry_node_ids, vec!["ask"]);
  }

  #[test]
  fn test_only_last_assistant_turn_counts() {
    let histories = vec![
      prompt(Interaction::UserSelect(UserSelectParams::default())),
      ChatItem::text(ChatRole::Human, "Yes"),
      ChatItem::text(ChatRole::Ai, "Done"),
    ];
    assert!(last_interactive(&histories).is_none());
  }

  #[test]
  fn test_drop_interactive_turn() {
    let mut histories = vec![
      ChatItem::text(ChatRole::Human, "hi"),
      prompt(Interaction::UserSelect(UserSelectParams::default())),
    ];
    assert!(drop_interactive_turn(&mut histories));
    assert_eq!(histories, vec![ChatItem::text(ChatRole::Human, "hi")]);
    assert!(!drop_interactive_turn(&mut histories));
  }
}
