//! Condition evaluation.
//!
//! Matches a fired trigger against a ritual's conditions and returns the
//! actions that qualify. Evaluation only reads; applying the actions is the
//! [`ActionExecutor`](super::ActionExecutor)'s job.

use std::sync::Arc;

use crate::error::{CoreError, EntityKind, Result, StoreError};
use crate::ritual::{ritual_key, Ritual};
use crate::rules::{Action, Trigger};
use crate::storage::LedgerStore;

/// Evaluates triggers against stored rituals and returns matching actions
#[derive(Clone)]
pub struct ConditionEvaluator {
    store: Arc<dyn LedgerStore>,
}

impl ConditionEvaluator {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Load the ritual and evaluate `trigger` against its conditions.
    ///
    /// # Errors
    /// `NotFound(Ritual)` if the ritual does not exist.
    pub fn evaluate(&self, ritual_id: &str, subject_id: &str, trigger: &Trigger) -> Result<Vec<Action>> {
        let doc = self
            .store
            .read(&ritual_key(ritual_id))?
            .ok_or_else(|| CoreError::not_found(EntityKind::Ritual, ritual_id))?;
        let ritual: Ritual = serde_json::from_value(doc.body).map_err(StoreError::from)?;

        let actions = Self::matching_actions(&ritual, trigger);
        tracing::debug!(
            ritual_id,
            subject_id,
            trigger = %trigger.kind,
            value = %trigger.value,
            matched = actions.len(),
            "conditions evaluated"
        );
        Ok(actions)
    }

    /// Pure part of evaluation: every action of every passing condition,
    /// in ritual-conditions order and then action order. No deduplication.
    ///
    /// Conditions listening for other triggers are never tested. A condition
    /// that cannot be tested (unknown operator, operand kinds that do not
    /// compare) is logged and skipped so it cannot block the others.
    pub fn matching_actions(ritual: &Ritual, trigger: &Trigger) -> Vec<Action> {
        let mut actions = Vec::new();

        for (index, condition) in ritual.conditions.iter().enumerate() {
            if !condition.listens_for(&trigger.kind) {
                continue;
            }
            match condition.test(&trigger.value) {
                Ok(true) => actions.extend(condition.actions.iter().cloned()),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(
                        ritual_id = %ritual.id,
                        condition = index,
                        "skipping invalid condition: {err}"
                    );
                }
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ritual::RitualStatus;
    use crate::rules::{Condition, Operator, Scalar, TriggerKind};
    use chrono::Utc;

    fn ritual_with(conditions: Vec<Condition>) -> Ritual {
        Ritual {
            id: "r1".into(),
            owner_id: "owner".into(),
            subject_id: "pet".into(),
            title: "test".into(),
            description: String::new(),
            status: RitualStatus::Active,
            current_task_index: 0,
            conditions,
            tasks: vec![],
            created_at: Utc::now(),
        }
    }

    fn cond(trigger: TriggerKind, operator: Operator, comparand: Scalar, actions: Vec<Action>) -> Condition {
        Condition { trigger, operator, comparand, actions }
    }

    #[test]
    fn test_matching_conditions_contribute_all_actions_in_order() {
        let ritual = ritual_with(vec![
            cond(
                TriggerKind::Completion,
                Operator::Eq,
                Scalar::Number(0),
                vec![Action::Reward { amount: 5 }, Action::Notify { message: "first".into() }],
            ),
            cond(
                TriggerKind::Completion,
                Operator::Gte,
                Scalar::Number(0),
                vec![Action::Reward { amount: 5 }],
            ),
            cond(
                TriggerKind::Completion,
                Operator::Gt,
                Scalar::Number(0),
                vec![Action::Penalty { amount: 1 }],
            ),
        ]);

        let actions = ConditionEvaluator::matching_actions(&ritual, &Trigger::completion(0));
        assert_eq!(
            actions,
            vec![
                Action::Reward { amount: 5 },
                Action::Notify { message: "first".into() },
                Action::Reward { amount: 5 },
            ]
        );
    }

    #[test]
    fn test_completion_condition_never_fires_for_mood() {
        let ritual = ritual_with(vec![cond(
            TriggerKind::Completion,
            Operator::Eq,
            Scalar::Text("0".into()),
            vec![Action::Reward { amount: 5 }],
        )]);

        let actions = ConditionEvaluator::matching_actions(&ritual, &Trigger::mood("0"));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_invalid_conditions_are_skipped_not_fatal() {
        let ritual = ritual_with(vec![
            cond(
                TriggerKind::Mood,
                Operator::Unknown("~=".into()),
                Scalar::Text("happy".into()),
                vec![Action::Reward { amount: 1 }],
            ),
            cond(
                TriggerKind::Mood,
                Operator::Gt,
                Scalar::Text("happy".into()),
                vec![Action::Reward { amount: 2 }],
            ),
            cond(
                TriggerKind::Mood,
                Operator::Eq,
                Scalar::Text("happy".into()),
                vec![Action::Reward { amount: 3 }],
            ),
        ]);

        let actions = ConditionEvaluator::matching_actions(&ritual, &Trigger::mood("happy"));
        assert_eq!(actions, vec![Action::Reward { amount: 3 }]);
    }

    #[test]
    fn test_ritual_completion_trigger() {
        let ritual = ritual_with(vec![cond(
            TriggerKind::RitualCompletion,
            Operator::Eq,
            Scalar::Flag(true),
            vec![Action::Notify { message: "all done".into() }],
        )]);

        assert_eq!(
            ConditionEvaluator::matching_actions(&ritual, &Trigger::ritual_completion()).len(),
            1
        );
        assert!(ConditionEvaluator::matching_actions(&ritual, &Trigger::completion(0)).is_empty());
    }

    #[test]
    fn test_evaluate_missing_ritual() {
        let store = Arc::new(crate::storage::SqliteStore::open_memory().unwrap());
        let evaluator = ConditionEvaluator::new(store);
        let err = evaluator.evaluate("nope", "pet", &Trigger::completion(0)).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: EntityKind::Ritual, .. }));
    }
}
