//! Action execution logging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Action, TriggerKind};

/// Result of executing a single action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Trigger whose condition produced this action (`None` for base rewards)
    pub trigger: Option<TriggerKind>,
    /// The action that was executed
    pub action: Action,
    /// Execution status
    pub status: ExecutionStatus,
    /// Ledger transaction id, for monetary actions that reached the ledger
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Status of action execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Action executed successfully
    Success,
    /// Action failed; earlier and later actions are unaffected
    Failed {
        /// Human-readable reason for failure
        reason: String,
        /// Whether this action can be retried
        retriable: bool,
    },
    /// Action was not applied (dry run, or already applied by an earlier attempt)
    Skipped {
        /// Human-readable reason for skip
        reason: String,
    },
}

/// Log of one evaluation batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    /// When this batch ran
    pub executed_at: DateTime<Utc>,
    /// Results of all executed actions, in execution order
    pub results: Vec<ActionResult>,
}

impl ActionLog {
    /// Create a new action log
    pub fn new(results: Vec<ActionResult>) -> Self {
        Self {
            executed_at: Utc::now(),
            results,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Append another batch, keeping this log's timestamp.
    pub fn extend(&mut self, other: ActionLog) {
        self.results.extend(other.results);
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Get the number of successful actions
    pub fn success_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ExecutionStatus::Success))
            .count()
    }

    /// Get the number of failed actions
    pub fn failure_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ExecutionStatus::Failed { .. }))
            .count()
    }

    /// Get the number of skipped actions
    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, ExecutionStatus::Skipped { .. }))
            .count()
    }

    /// Actions in execution order.
    pub fn actions(&self) -> Vec<Action> {
        self.results.iter().map(|r| r.action.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: ExecutionStatus) -> ActionResult {
        ActionResult {
            trigger: Some(TriggerKind::Completion),
            action: Action::Reward { amount: 1 },
            status,
            transaction_id: None,
        }
    }

    #[test]
    fn test_action_log_counts() {
        let log = ActionLog::new(vec![
            result(ExecutionStatus::Success),
            result(ExecutionStatus::Failed {
                reason: "error".to_string(),
                retriable: false,
            }),
            result(ExecutionStatus::Skipped {
                reason: "dry-run mode".to_string(),
            }),
        ]);

        assert_eq!(log.success_count(), 1);
        assert_eq!(log.failure_count(), 1);
        assert_eq!(log.skipped_count(), 1);
    }

    #[test]
    fn test_extend_preserves_order() {
        let mut log = ActionLog::new(vec![result(ExecutionStatus::Success)]);
        let mut later = result(ExecutionStatus::Success);
        later.action = Action::Penalty { amount: 2 };
        log.extend(ActionLog::new(vec![later]));

        assert_eq!(
            log.actions(),
            vec![Action::Reward { amount: 1 }, Action::Penalty { amount: 2 }]
        );
    }
}
