//! Task progression state machine.
//!
//! An assignment moves `Active(0) -> Active(1) -> ... -> Completed`, one step
//! per accepted completion. The step itself (task state, both progress
//! pointers, the completion record and the evidence) commits as one unit,
//! guarded by the version check on the ritual and assignment documents.
//! Rewards and condition actions run afterwards, keyed by the completion so
//! that [`TaskProgression::replay_completion`] can finish an interrupted call
//! without paying twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, EntityKind, Result, ValidationError};
use crate::ritual::{assignment_key, read_doc, ritual_key, Assignment, Evidence, Ritual, RitualStatus, TaskStatus};
use crate::rules::{
    Action, ActionExecutor, ActionLog, ActionResult, ConditionEvaluator, ExecutionContext, Trigger,
    TriggerKind,
};
use crate::storage::{atomically, collections, DocKey, LedgerStore, Plan, RetryPolicy};

/// Durable marker that a task step was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub ritual_id: String,
    pub subject_id: String,
    pub task_index: usize,
    pub task_id: String,
    pub token_reward: u64,
    pub next_task_index: usize,
    pub ritual_completed: bool,
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn key(&self) -> String {
        completion_id(&self.ritual_id, &self.subject_id, self.task_index)
    }
}

/// Evidence stored with a completion; never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub task_id: String,
    pub subject_id: String,
    pub ritual_id: String,
    pub evidence: Evidence,
    pub submitted_at: DateTime<Utc>,
}

/// What a completion did, for the transport to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub ritual_id: String,
    pub subject_id: String,
    pub task_index: usize,
    pub next_task_index: usize,
    pub is_complete: bool,
    /// The task's own reward, when it has one
    pub base_reward: Option<ActionResult>,
    /// Condition-triggered actions; the base reward is not repeated here
    pub actions_executed: ActionLog,
}

pub fn completion_id(ritual_id: &str, subject_id: &str, task_index: usize) -> String {
    format!("{ritual_id}:{subject_id}:{task_index}")
}

fn completion_key(id: &str) -> DocKey {
    DocKey::new(collections::COMPLETIONS, id)
}

fn evidence_key(task_id: &str, subject_id: &str) -> DocKey {
    DocKey::new(collections::TASK_EVIDENCE, format!("{task_id}:{subject_id}"))
}

/// `StaleTask` unless `task_index` is the assignment's open current task.
fn stale_submission(ritual_id: &str, assignment: &Assignment, task_index: usize) -> Option<CoreError> {
    (assignment.is_complete() || assignment.current_task_index != task_index).then(|| {
        CoreError::StaleTask {
            ritual_id: ritual_id.to_string(),
            submitted: task_index,
            current: assignment.current_task_index,
        }
    })
}

#[derive(Clone)]
pub struct TaskProgression {
    store: Arc<dyn LedgerStore>,
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
    policy: RetryPolicy,
}

impl TaskProgression {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        evaluator: ConditionEvaluator,
        executor: ActionExecutor,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            evaluator,
            executor,
            policy,
        }
    }

    /// Accept a completion of the subject's current task.
    ///
    /// Commits the step, then applies the task's base reward, then runs
    /// `completion` conditions and, when this was the last task,
    /// `ritual_completion` conditions. Failed actions are reported in the
    /// outcome and never undo the step.
    ///
    /// # Errors
    /// `NotFound` for a missing ritual or assignment, `StaleTask` when
    /// `task_index` is not the current task (including a lost race against
    /// a concurrent completion), `Validation` when the evidence kind does
    /// not fit the task.
    pub fn complete_task(
        &self,
        ritual_id: &str,
        subject_id: &str,
        task_index: usize,
        evidence: Evidence,
    ) -> Result<CompletionOutcome> {
        let ritual: Ritual = read_doc(self.store.as_ref(), &ritual_key(ritual_id))?
            .ok_or_else(|| CoreError::not_found(EntityKind::Ritual, ritual_id))?;
        let assignment: Assignment = read_doc(self.store.as_ref(), &assignment_key(subject_id))?
            .filter(|a: &Assignment| a.ritual_id == ritual_id)
            .ok_or_else(|| CoreError::not_found(EntityKind::Assignment, subject_id))?;
        if let Some(err) = stale_submission(ritual_id, &assignment, task_index) {
            return Err(err);
        }
        // The assignment points at a task the ritual does not have.
        let task = ritual.task(task_index).ok_or_else(|| ValidationError::OutOfBounds {
            collection: "tasks".into(),
            index: task_index,
            len: ritual.tasks.len(),
        })?;
        if !task.evidence_kind.accepts(&evidence) {
            return Err(ValidationError::invalid(
                "evidence",
                format!("task {task_index} does not accept this kind of evidence"),
            )
            .into());
        }

        let record_id = completion_id(ritual_id, subject_id, task_index);
        let keys = [
            ritual_key(ritual_id),
            assignment_key(subject_id),
            completion_key(&record_id),
            evidence_key(&task.id, subject_id),
        ];

        let record = atomically(self.store.as_ref(), &keys, &self.policy, |snap| {
            let mut ritual: Ritual = snap
                .get(&keys[0])?
                .ok_or_else(|| CoreError::not_found(EntityKind::Ritual, ritual_id))?;
            let mut assignment: Assignment = snap
                .get(&keys[1])?
                .filter(|a: &Assignment| a.ritual_id == ritual_id)
                .ok_or_else(|| CoreError::not_found(EntityKind::Assignment, subject_id))?;

            if let Some(err) = stale_submission(ritual_id, &assignment, task_index) {
                return Err(err);
            }
            if snap.exists(&keys[2]) {
                return Err(CoreError::StaleTask {
                    ritual_id: ritual_id.to_string(),
                    submitted: task_index,
                    current: assignment.current_task_index,
                });
            }

            let now = Utc::now();
            let total = ritual.tasks.len();
            let task = ritual
                .tasks
                .get_mut(task_index)
                .ok_or_else(|| ValidationError::OutOfBounds {
                    collection: "tasks".into(),
                    index: task_index,
                    len: total,
                })?;
            task.status = TaskStatus::Completed;
            task.completed_at = Some(now);
            let task_id = task.id.clone();
            let token_reward = task.token_reward;

            let next_task_index = task_index + 1;
            let ritual_completed = next_task_index >= total;
            let status = if ritual_completed {
                RitualStatus::Completed
            } else {
                RitualStatus::Active
            };
            ritual.current_task_index = next_task_index;
            ritual.status = status;
            assignment.current_task_index = next_task_index;
            assignment.status = status;
            assignment.last_updated = now;

            let record = CompletionRecord {
                ritual_id: ritual_id.to_string(),
                subject_id: subject_id.to_string(),
                task_index,
                task_id: task_id.clone(),
                token_reward,
                next_task_index,
                ritual_completed,
                completed_at: now,
            };
            let evidence = EvidenceRecord {
                task_id,
                subject_id: subject_id.to_string(),
                ritual_id: ritual_id.to_string(),
                evidence: evidence.clone(),
                submitted_at: now,
            };

            Ok(Plan::new(record.clone())
                .put(keys[0].clone(), &ritual)?
                .put(keys[1].clone(), &assignment)?
                .insert(keys[2].clone(), &record)?
                .insert(keys[3].clone(), &evidence)?)
        })?;

        tracing::info!(
            ritual_id,
            subject_id,
            task_index,
            ritual_completed = record.ritual_completed,
            "task completed"
        );
        self.follow_up(&record)
    }

    /// Re-run the reward and condition phase of a stored completion.
    ///
    /// Uses the same idempotency keys as the original call, so anything that
    /// was already applied is reported as skipped.
    pub fn replay_completion(
        &self,
        ritual_id: &str,
        subject_id: &str,
        task_index: usize,
    ) -> Result<CompletionOutcome> {
        let record_id = completion_id(ritual_id, subject_id, task_index);
        let record: CompletionRecord = read_doc(self.store.as_ref(), &completion_key(&record_id))?
            .ok_or_else(|| CoreError::not_found(EntityKind::Completion, &record_id))?;
        tracing::debug!(completion = %record_id, "replaying completion");
        self.follow_up(&record)
    }

    pub fn completion(&self, ritual_id: &str, subject_id: &str, task_index: usize) -> Result<Option<CompletionRecord>> {
        read_doc(
            self.store.as_ref(),
            &completion_key(&completion_id(ritual_id, subject_id, task_index)),
        )
    }

    fn follow_up(&self, record: &CompletionRecord) -> Result<CompletionOutcome> {
        let scope = record.key();
        let ctx = ExecutionContext::new(&record.ritual_id, &record.subject_id);

        let base_reward = if record.token_reward > 0 {
            let reward = [Action::Reward {
                amount: record.token_reward,
            }];
            let log = self
                .executor
                .execute_batch(&reward, &ctx.clone().scoped(format!("{scope}:reward")));
            log.results.into_iter().next()
        } else {
            None
        };

        let trigger = Trigger::completion(record.task_index);
        let actions = self
            .evaluator
            .evaluate(&record.ritual_id, &record.subject_id, &trigger)?;
        let mut actions_executed = self.executor.execute_batch(
            &actions,
            &ctx.clone()
                .triggered_by(TriggerKind::Completion)
                .scoped(format!("{scope}:completion")),
        );

        if record.ritual_completed {
            let actions = self.evaluator.evaluate(
                &record.ritual_id,
                &record.subject_id,
                &Trigger::ritual_completion(),
            )?;
            actions_executed.extend(self.executor.execute_batch(
                &actions,
                &ctx.triggered_by(TriggerKind::RitualCompletion)
                    .scoped(format!("{scope}:ritual_completion")),
            ));
        }

        Ok(CompletionOutcome {
            ritual_id: record.ritual_id.clone(),
            subject_id: record.subject_id.clone(),
            task_index: record.task_index,
            next_task_index: record.next_task_index,
            is_complete: record.ritual_completed,
            base_reward,
            actions_executed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TokenLedger;
    use crate::ritual::{EvidenceKind, NewRitual, NewTask, RitualRepository};
    use crate::rules::ExecutionStatus;
    use crate::storage::SqliteStore;

    struct Fixture {
        ledger: TokenLedger,
        rituals: RitualRepository,
        progression: TaskProgression,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn LedgerStore> = Arc::new(SqliteStore::open_memory().unwrap());
        let policy = RetryPolicy::default();
        let ledger = TokenLedger::new(store.clone(), policy.clone());
        ledger.open_account("owner").unwrap();
        ledger.open_account("pet").unwrap();
        let evaluator = ConditionEvaluator::new(store.clone());
        let executor = ActionExecutor::new(store.clone(), ledger.clone(), policy.clone());
        Fixture {
            ledger,
            rituals: RitualRepository::new(store.clone(), policy.clone()),
            progression: TaskProgression::new(store, evaluator, executor, policy),
        }
    }

    fn text(content: &str) -> Evidence {
        Evidence::Text { content: content.into() }
    }

    fn two_tasks(evidence_kind: EvidenceKind) -> NewRitual {
        let task = |title: &str, token_reward| NewTask {
            title: title.into(),
            description: String::new(),
            evidence_kind,
            token_reward,
        };
        NewRitual {
            owner_id: "owner".into(),
            subject_id: "pet".into(),
            title: "Morning".into(),
            description: String::new(),
            tasks: vec![task("first", 2), task("second", 0)],
            conditions: vec![],
        }
    }

    #[test]
    fn steps_through_to_completion() {
        let f = fixture();
        let ritual = f.rituals.create(two_tasks(EvidenceKind::Any)).unwrap();

        let first = f.progression.complete_task(&ritual.id, "pet", 0, text("done")).unwrap();
        assert_eq!(first.next_task_index, 1);
        assert!(!first.is_complete);
        assert_eq!(
            first.base_reward.as_ref().map(|r| r.status.clone()),
            Some(ExecutionStatus::Success)
        );

        let second = f.progression.complete_task(&ritual.id, "pet", 1, text("done")).unwrap();
        assert!(second.is_complete);
        assert!(second.base_reward.is_none());

        let stored = f.rituals.get(&ritual.id).unwrap();
        assert_eq!(stored.status, RitualStatus::Completed);
        assert_eq!(stored.current_task_index, 2);
        assert!(stored.tasks.iter().all(|t| t.status == TaskStatus::Completed));
        assert_eq!(f.ledger.balance("pet").unwrap(), 2);
        assert!(f.rituals.current_task("pet").unwrap().is_none());
    }

    #[test]
    fn stale_and_terminal_submissions_are_rejected() {
        let f = fixture();
        let ritual = f.rituals.create(two_tasks(EvidenceKind::Any)).unwrap();

        let err = f.progression.complete_task(&ritual.id, "pet", 1, text("skip")).unwrap_err();
        assert!(matches!(err, CoreError::StaleTask { submitted: 1, current: 0, .. }));

        f.progression.complete_task(&ritual.id, "pet", 0, text("a")).unwrap();
        let err = f.progression.complete_task(&ritual.id, "pet", 0, text("a")).unwrap_err();
        assert!(matches!(err, CoreError::StaleTask { .. }));
        assert_eq!(f.ledger.balance("pet").unwrap(), 2);
    }

    #[test]
    fn submission_past_the_last_task_is_stale() {
        let f = fixture();
        let mut single = two_tasks(EvidenceKind::Any);
        single.tasks.truncate(1);
        let ritual = f.rituals.create(single).unwrap();
        f.progression.complete_task(&ritual.id, "pet", 0, text("done")).unwrap();

        let err = f.progression.complete_task(&ritual.id, "pet", 1, text("again")).unwrap_err();
        assert!(matches!(err, CoreError::StaleTask { submitted: 1, current: 1, .. }));
        assert_eq!(f.ledger.balance("pet").unwrap(), 2);
    }

    #[test]
    fn wrong_evidence_kind_changes_nothing() {
        let f = fixture();
        let ritual = f.rituals.create(two_tasks(EvidenceKind::Photo)).unwrap();

        let err = f.progression.complete_task(&ritual.id, "pet", 0, text("no photo")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(f.rituals.assignment("pet").unwrap().unwrap().current_task_index, 0);
    }

    #[test]
    fn replay_does_not_pay_twice() {
        let f = fixture();
        let ritual = f.rituals.create(two_tasks(EvidenceKind::Any)).unwrap();
        f.progression.complete_task(&ritual.id, "pet", 0, text("done")).unwrap();

        let replay = f.progression.replay_completion(&ritual.id, "pet", 0).unwrap();
        assert!(matches!(
            replay.base_reward.map(|r| r.status),
            Some(ExecutionStatus::Skipped { .. })
        ));
        assert_eq!(f.ledger.balance("pet").unwrap(), 2);
        assert!(f.progression.completion(&ritual.id, "pet", 0).unwrap().is_some());
    }

    #[test]
    fn replay_without_record_is_not_found() {
        let f = fixture();
        let err = f.progression.replay_completion("r", "pet", 0).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: EntityKind::Completion, .. }));
    }
}
