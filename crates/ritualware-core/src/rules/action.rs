//! Action definitions for the condition engine.
//!
//! Actions define what happens when a condition's test passes. Each variant
//! carries only the payload it needs.

use serde::{Deserialize, Serialize};

/// A side effect applied by the [`ActionExecutor`](super::ActionExecutor).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Credit the subject with system-issued tokens.
    Reward { amount: u64 },

    /// Debit the subject; fails if the balance does not cover it.
    Penalty { amount: u64 },

    /// Add a task (by index) to the subject's unlocked set.
    UnlockTask { task_index: usize },

    /// Queue a message for the subject.
    #[serde(alias = "notification")]
    Notify { message: String },
}

impl Action {
    /// Get a human-readable description of this action
    pub fn description(&self) -> String {
        match self {
            Action::Reward { amount } => format!("Reward {amount} tokens"),
            Action::Penalty { amount } => format!("Deduct {amount} tokens"),
            Action::UnlockTask { task_index } => format!("Unlock task #{}", task_index + 1),
            Action::Notify { message } => format!("Notify: {message}"),
        }
    }

    /// Get the type name of this action
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Reward { .. } => "reward",
            Action::Penalty { .. } => "penalty",
            Action::UnlockTask { .. } => "unlock_task",
            Action::Notify { .. } => "notify",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serialize() {
        let action = Action::Reward { amount: 5 };
        let toml = toml::to_string(&action).unwrap();
        assert!(toml.contains(r#"type = "reward""#));
        assert!(toml.contains("amount = 5"));
    }

    #[test]
    fn test_action_deserialize_alias() {
        let action: Action =
            serde_json::from_str(r#"{"type": "notification", "message": "well done"}"#).unwrap();
        assert_eq!(action, Action::Notify { message: "well done".into() });
    }

    #[test]
    fn test_action_description() {
        assert_eq!(Action::UnlockTask { task_index: 0 }.description(), "Unlock task #1");
        assert_eq!(Action::Penalty { amount: 3 }.description(), "Deduct 3 tokens");
    }
}
