//! Action execution.
//!
//! Applies the actions produced by the condition evaluator and logs results.
//! Monetary actions go through the [`TokenLedger`]; everything else is a
//! single atomic document write.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{CoreError, EntityKind, Result};
use crate::ledger::{TokenLedger, TransactionReceipt, TransactionRequest};
use crate::notifications::NotificationQueue;
use crate::ritual::{assignment_key, Assignment};
use crate::rules::log::{ActionLog, ActionResult, ExecutionStatus};
use crate::rules::{Action, TriggerKind};
use crate::storage::{atomically, LedgerStore, Plan, RetryPolicy};

/// Where a batch of actions runs and how its entries are keyed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub ritual_id: String,
    pub subject_id: String,
    /// Trigger that produced the batch, recorded on every result
    pub trigger: Option<TriggerKind>,
    /// With a scope, action `i` of the batch is keyed `"{scope}:{i}"` and
    /// re-running the batch applies nothing twice.
    pub replay_scope: Option<String>,
}

impl ExecutionContext {
    pub fn new(ritual_id: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            ritual_id: ritual_id.into(),
            subject_id: subject_id.into(),
            trigger: None,
            replay_scope: None,
        }
    }

    pub fn triggered_by(mut self, trigger: TriggerKind) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn scoped(mut self, scope: impl Into<String>) -> Self {
        self.replay_scope = Some(scope.into());
        self
    }

    fn key_for(&self, position: usize) -> Option<String> {
        self.replay_scope.as_ref().map(|scope| format!("{scope}:{position}"))
    }
}

/// What a single applied action changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEffect {
    Transaction(TransactionReceipt),
    Unlocked { task_index: usize, newly_unlocked: bool },
    Notified { notification_id: String, replayed: bool },
}

impl ActionEffect {
    /// True when the action had already been applied under the same key.
    pub fn replayed(&self) -> bool {
        match self {
            ActionEffect::Transaction(receipt) => receipt.replayed,
            ActionEffect::Unlocked { .. } => false,
            ActionEffect::Notified { replayed, .. } => *replayed,
        }
    }

    fn transaction_id(&self) -> Option<String> {
        match self {
            ActionEffect::Transaction(receipt) => Some(receipt.transaction_id.clone()),
            _ => None,
        }
    }
}

/// Executes actions and logs results
#[derive(Clone)]
pub struct ActionExecutor {
    store: Arc<dyn LedgerStore>,
    ledger: TokenLedger,
    notifications: NotificationQueue,
    policy: RetryPolicy,
    /// Whether to actually execute actions (false for dry-run)
    dry_run: bool,
}

impl ActionExecutor {
    pub fn new(store: Arc<dyn LedgerStore>, ledger: TokenLedger, policy: RetryPolicy) -> Self {
        let notifications = NotificationQueue::new(Arc::clone(&store), policy.clone());
        Self {
            store,
            ledger,
            notifications,
            policy,
            dry_run: false,
        }
    }

    /// Same executor, but batches only report what they would have done.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Apply one action for a subject within a ritual.
    ///
    /// # Errors
    /// Ledger failures propagate unchanged: `InsufficientBalance` for a
    /// penalty the subject cannot cover, `NotFound(Account)` for a missing
    /// account. `unlock_task` needs the subject's assignment for this ritual.
    pub fn execute(
        &self,
        action: &Action,
        ritual_id: &str,
        subject_id: &str,
        idempotency_key: Option<String>,
    ) -> Result<ActionEffect> {
        match action {
            Action::Reward { amount } => {
                let mut request = TransactionRequest::reward(subject_id, *amount)
                    .related_to("ritual", ritual_id)
                    .described(action.description());
                request.idempotency_key = idempotency_key;
                Ok(ActionEffect::Transaction(self.ledger.apply(request)?))
            }
            Action::Penalty { amount } => {
                let mut request = TransactionRequest::penalty(subject_id, *amount)
                    .related_to("ritual", ritual_id)
                    .described(action.description());
                request.idempotency_key = idempotency_key;
                Ok(ActionEffect::Transaction(self.ledger.apply(request)?))
            }
            Action::UnlockTask { task_index } => self.unlock(ritual_id, subject_id, *task_index),
            Action::Notify { message } => {
                let (notification_id, replayed) =
                    self.notifications
                        .enqueue(subject_id, message, ritual_id, idempotency_key)?;
                Ok(ActionEffect::Notified { notification_id, replayed })
            }
        }
    }

    fn unlock(&self, ritual_id: &str, subject_id: &str, task_index: usize) -> Result<ActionEffect> {
        let key = assignment_key(subject_id);
        atomically(self.store.as_ref(), &[key.clone()], &self.policy, |snap| {
            let mut assignment: Assignment = snap
                .get(&key)?
                .filter(|a: &Assignment| a.ritual_id == ritual_id)
                .ok_or_else(|| CoreError::not_found(EntityKind::Assignment, subject_id))?;

            if assignment.unlocked_tasks.contains(&task_index) {
                return Ok(Plan::new(ActionEffect::Unlocked { task_index, newly_unlocked: false }));
            }
            assignment.unlocked_tasks.insert(task_index);
            assignment.last_updated = Utc::now();
            Ok(Plan::new(ActionEffect::Unlocked { task_index, newly_unlocked: true })
                .put(key.clone(), &assignment)?)
        })
    }

    /// Execute a batch of actions in order and return the log.
    ///
    /// A failing action is recorded and the batch moves on; nothing already
    /// applied is rolled back.
    pub fn execute_batch(&self, actions: &[Action], ctx: &ExecutionContext) -> ActionLog {
        let mut results = Vec::with_capacity(actions.len());

        for (position, action) in actions.iter().enumerate() {
            results.push(self.execute_action(action, ctx, position));
        }

        ActionLog::new(results)
    }

    fn execute_action(&self, action: &Action, ctx: &ExecutionContext, position: usize) -> ActionResult {
        let result = |status, transaction_id| ActionResult {
            trigger: ctx.trigger.clone(),
            action: action.clone(),
            status,
            transaction_id,
        };

        if self.dry_run {
            return result(
                ExecutionStatus::Skipped {
                    reason: "dry-run mode".to_string(),
                },
                None,
            );
        }

        match self.execute(action, &ctx.ritual_id, &ctx.subject_id, ctx.key_for(position)) {
            Ok(effect) if effect.replayed() => result(
                ExecutionStatus::Skipped {
                    reason: "already applied".to_string(),
                },
                effect.transaction_id(),
            ),
            Ok(effect) => result(ExecutionStatus::Success, effect.transaction_id()),
            Err(err) => {
                tracing::warn!(
                    ritual_id = %ctx.ritual_id,
                    subject_id = %ctx.subject_id,
                    action = action.type_name(),
                    position,
                    "action failed: {err}"
                );
                result(
                    ExecutionStatus::Failed {
                        reason: err.to_string(),
                        retriable: err.is_retriable(),
                    },
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use std::collections::BTreeSet;

    fn setup() -> (Arc<SqliteStore>, TokenLedger, ActionExecutor) {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let ledger = TokenLedger::new(store.clone(), RetryPolicy::default());
        ledger.open_account("pet").unwrap();
        let executor = ActionExecutor::new(store.clone(), ledger.clone(), RetryPolicy::default());
        (store, ledger, executor)
    }

    fn seed_assignment(store: &SqliteStore) {
        let assignment = Assignment {
            ritual_id: "r1".into(),
            subject_id: "pet".into(),
            owner_id: "owner".into(),
            current_task_index: 0,
            status: crate::ritual::RitualStatus::Active,
            unlocked_tasks: BTreeSet::new(),
            started_at: Utc::now(),
            last_updated: Utc::now(),
        };
        atomically(store, &[assignment_key("pet")], &RetryPolicy::default(), |_| {
            Plan::new(()).put(assignment_key("pet"), &assignment)
        })
        .unwrap();
    }

    #[test]
    fn test_executor_dry_run_skips() {
        let (_, ledger, executor) = setup();
        let executor = executor.dry_run();
        let ctx = ExecutionContext::new("r1", "pet");

        let log = executor.execute_batch(&[Action::Reward { amount: 5 }], &ctx);
        assert_eq!(log.results.len(), 1);
        assert!(matches!(log.results[0].status, ExecutionStatus::Skipped { .. }));
        assert_eq!(ledger.balance("pet").unwrap(), 0);
    }

    #[test]
    fn test_failure_does_not_stop_the_batch() {
        let (_, ledger, executor) = setup();
        let ctx = ExecutionContext::new("r1", "pet").triggered_by(TriggerKind::Completion);

        let log = executor.execute_batch(
            &[Action::Penalty { amount: 50 }, Action::Reward { amount: 5 }],
            &ctx,
        );
        assert!(matches!(
            log.results[0].status,
            ExecutionStatus::Failed { retriable: false, .. }
        ));
        assert_eq!(log.results[1].status, ExecutionStatus::Success);
        assert_eq!(log.results[1].trigger, Some(TriggerKind::Completion));
        assert!(log.results[1].transaction_id.is_some());
        assert_eq!(ledger.balance("pet").unwrap(), 5);
    }

    #[test]
    fn test_scoped_batch_replays_as_skipped() {
        let (_, ledger, executor) = setup();
        let ctx = ExecutionContext::new("r1", "pet").scoped("r1:pet:0:completion");
        let actions = [Action::Reward { amount: 5 }, Action::Notify { message: "well done".into() }];

        let first = executor.execute_batch(&actions, &ctx);
        let second = executor.execute_batch(&actions, &ctx);

        assert_eq!(first.success_count(), 2);
        assert_eq!(second.skipped_count(), 2);
        assert_eq!(ledger.balance("pet").unwrap(), 5);
        assert_eq!(
            second.results[0].transaction_id.as_deref(),
            Some("r1:pet:0:completion:0")
        );
    }

    #[test]
    fn test_unlock_task_is_a_set_union() {
        let (store, _, executor) = setup();
        seed_assignment(&store);

        let first = executor
            .execute(&Action::UnlockTask { task_index: 2 }, "r1", "pet", None)
            .unwrap();
        let again = executor
            .execute(&Action::UnlockTask { task_index: 2 }, "r1", "pet", None)
            .unwrap();
        assert_eq!(first, ActionEffect::Unlocked { task_index: 2, newly_unlocked: true });
        assert_eq!(again, ActionEffect::Unlocked { task_index: 2, newly_unlocked: false });

        let stored: Assignment =
            serde_json::from_value(store.read(&assignment_key("pet")).unwrap().unwrap().body).unwrap();
        assert_eq!(stored.unlocked_tasks, BTreeSet::from([2]));
    }

    #[test]
    fn test_unlock_without_assignment_fails() {
        let (_, _, executor) = setup();
        let err = executor
            .execute(&Action::UnlockTask { task_index: 1 }, "r1", "pet", None)
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: EntityKind::Assignment, .. }));
    }

    #[test]
    fn test_notify_queues_for_subject() {
        let (store, _, executor) = setup();
        executor
            .execute(&Action::Notify { message: "kneel".into() }, "r1", "pet", None)
            .unwrap();
        let pending = NotificationQueue::new(store, RetryPolicy::default()).pending("pet").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].related_id, "r1");
    }
}
