//! Mood and streak intake.
//!
//! Signals that do not move a task pointer but can still fire conditions on
//! the subject's assigned ritual.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError, ValidationError};
use crate::ritual::RitualRepository;
use crate::rules::{ActionExecutor, ActionLog, ConditionEvaluator, ExecutionContext, Trigger, TriggerKind};
use crate::session::SessionStore;
use crate::storage::{collections, LedgerStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodEntry {
    pub subject_id: String,
    pub mood: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodOutcome {
    pub entry_id: String,
    /// Ritual the mood was evaluated against; `None` without an assignment
    pub ritual_id: Option<String>,
    pub actions_executed: ActionLog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakOutcome {
    pub count: u32,
    pub ritual_id: Option<String>,
    pub actions_executed: ActionLog,
}

/// A mood question sent to the subject and not yet answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodPrompt {
    pub subject_id: String,
    pub asked_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SignalIntake {
    store: Arc<dyn LedgerStore>,
    rituals: RitualRepository,
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
    prompts: Arc<dyn SessionStore<MoodPrompt>>,
}

impl SignalIntake {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        rituals: RitualRepository,
        evaluator: ConditionEvaluator,
        executor: ActionExecutor,
        prompts: Arc<dyn SessionStore<MoodPrompt>>,
    ) -> Self {
        Self {
            store,
            rituals,
            evaluator,
            executor,
            prompts,
        }
    }

    /// Record a mood, then run the assigned ritual's `mood` conditions.
    ///
    /// The mood is always logged. A subject without an assignment gets an
    /// empty action log.
    pub fn log_mood_and_evaluate(&self, subject_id: &str, mood: &str) -> Result<MoodOutcome> {
        let mood = mood.trim();
        if mood.is_empty() {
            return Err(ValidationError::invalid("mood", "must not be empty").into());
        }

        let entry = MoodEntry {
            subject_id: subject_id.to_string(),
            mood: mood.to_string(),
            created_at: Utc::now(),
        };
        let body = serde_json::to_value(&entry).map_err(StoreError::from)?;
        let entry_id = self.store.append(collections::MOOD_LOGS, &body)?;
        tracing::debug!(subject_id, entry_id = %entry_id, "mood logged");

        let Some(assignment) = self.rituals.assignment(subject_id)? else {
            return Ok(MoodOutcome {
                entry_id,
                ritual_id: None,
                actions_executed: ActionLog::empty(),
            });
        };

        let actions = self
            .evaluator
            .evaluate(&assignment.ritual_id, subject_id, &Trigger::mood(mood))?;
        let ctx = ExecutionContext::new(&assignment.ritual_id, subject_id)
            .triggered_by(TriggerKind::Mood)
            .scoped(format!("mood:{entry_id}"));
        let actions_executed = self.executor.execute_batch(&actions, &ctx);

        Ok(MoodOutcome {
            entry_id,
            ritual_id: Some(assignment.ritual_id),
            actions_executed,
        })
    }

    /// Run the assigned ritual's `streak` conditions for a streak length.
    ///
    /// Keyed by ritual, subject and count: reporting the same streak twice
    /// applies its actions once.
    pub fn report_streak(&self, subject_id: &str, count: u32) -> Result<StreakOutcome> {
        let Some(assignment) = self.rituals.assignment(subject_id)? else {
            return Ok(StreakOutcome {
                count,
                ritual_id: None,
                actions_executed: ActionLog::empty(),
            });
        };

        let actions = self
            .evaluator
            .evaluate(&assignment.ritual_id, subject_id, &Trigger::streak(count))?;
        let ctx = ExecutionContext::new(&assignment.ritual_id, subject_id)
            .triggered_by(TriggerKind::Streak)
            .scoped(format!("streak:{}:{subject_id}:{count}", assignment.ritual_id));
        let actions_executed = self.executor.execute_batch(&actions, &ctx);

        Ok(StreakOutcome {
            count,
            ritual_id: Some(assignment.ritual_id),
            actions_executed,
        })
    }

    /// Open a mood prompt for the subject; the next reply is taken as the mood.
    pub fn begin_mood_prompt(&self, subject_id: &str) -> Result<MoodPrompt> {
        let prompt = MoodPrompt {
            subject_id: subject_id.to_string(),
            asked_at: Utc::now(),
        };
        self.prompts.put(subject_id, prompt.clone())?;
        Ok(prompt)
    }

    /// Consume a live mood prompt and log the reply. `None` if no prompt
    /// was open (or it expired).
    pub fn handle_mood_reply(&self, subject_id: &str, text: &str) -> Result<Option<MoodOutcome>> {
        if self.prompts.take(subject_id)?.is_none() {
            return Ok(None);
        }
        self.log_mood_and_evaluate(subject_id, text).map(Some)
    }
}
