use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    assignment_key, ritual_key, Assignment, CurrentTask, NewRitual, Progress, Ritual, RitualStatus,
    Task, TaskStatus,
};
use crate::error::{CoreError, EntityKind, Result, StoreError, ValidationError};
use crate::ledger::account_key;
use crate::storage::{atomically, collections, DocKey, LedgerStore, Plan, RetryPolicy};

/// Audit entry for owner-side actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActivityRecord {
    actor_id: String,
    action: String,
    entity_type: String,
    entity_id: String,
    at: DateTime<Utc>,
}

/// Creates rituals and answers progression queries.
#[derive(Clone)]
pub struct RitualRepository {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl RitualRepository {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Validate and store a new ritual, assigning it to its subject.
    ///
    /// The ritual, the subject's assignment and the activity entry are
    /// written together. A subject follows one ritual at a time, so any
    /// previous assignment is replaced.
    ///
    /// # Errors
    /// `Validation` for a malformed definition, `NotFound(Account)` when the
    /// owner or the subject has no account.
    pub fn create(&self, new: NewRitual) -> Result<Ritual> {
        validate(&new)?;

        let now = Utc::now();
        let ritual_id = uuid::Uuid::new_v4().to_string();
        let tasks = new
            .tasks
            .into_iter()
            .enumerate()
            .map(|(order, task)| Task {
                id: uuid::Uuid::new_v4().to_string(),
                order,
                title: task.title,
                description: task.description,
                evidence_kind: task.evidence_kind,
                token_reward: task.token_reward,
                status: TaskStatus::Pending,
                completed_at: None,
            })
            .collect();

        let ritual = Ritual {
            id: ritual_id.clone(),
            owner_id: new.owner_id,
            subject_id: new.subject_id,
            title: new.title,
            description: new.description,
            status: RitualStatus::Active,
            current_task_index: 0,
            conditions: new.conditions,
            tasks,
            created_at: now,
        };
        let assignment = Assignment {
            ritual_id: ritual_id.clone(),
            subject_id: ritual.subject_id.clone(),
            owner_id: ritual.owner_id.clone(),
            current_task_index: 0,
            status: RitualStatus::Active,
            unlocked_tasks: Default::default(),
            started_at: now,
            last_updated: now,
        };
        let activity = ActivityRecord {
            actor_id: ritual.owner_id.clone(),
            action: "ritual_created".into(),
            entity_type: "ritual".into(),
            entity_id: ritual_id.clone(),
            at: now,
        };

        let owner_key = account_key(&ritual.owner_id);
        let subject_key = account_key(&ritual.subject_id);
        let activity_key = DocKey::new(collections::ACTIVITY_LOGS, uuid::Uuid::new_v4().to_string());
        let keys = [
            ritual_key(&ritual_id),
            assignment_key(&ritual.subject_id),
            owner_key.clone(),
            subject_key.clone(),
        ];

        atomically(self.store.as_ref(), &keys, &self.policy, |snap| {
            if !snap.exists(&owner_key) {
                return Err(CoreError::not_found(EntityKind::Account, &ritual.owner_id));
            }
            if !snap.exists(&subject_key) {
                return Err(CoreError::not_found(EntityKind::Account, &ritual.subject_id));
            }
            Ok(Plan::new(())
                .insert(ritual_key(&ritual_id), &ritual)?
                .put(assignment_key(&ritual.subject_id), &assignment)?
                .insert(activity_key.clone(), &activity)?)
        })?;

        tracing::info!(
            ritual_id = %ritual.id,
            owner_id = %ritual.owner_id,
            subject_id = %ritual.subject_id,
            tasks = ritual.tasks.len(),
            conditions = ritual.conditions.len(),
            "ritual created"
        );
        Ok(ritual)
    }

    pub fn get(&self, ritual_id: &str) -> Result<Ritual> {
        self.find(ritual_id)?
            .ok_or_else(|| CoreError::not_found(EntityKind::Ritual, ritual_id))
    }

    pub fn find(&self, ritual_id: &str) -> Result<Option<Ritual>> {
        read_doc(self.store.as_ref(), &ritual_key(ritual_id))
    }

    /// The subject's current assignment, if any.
    pub fn assignment(&self, subject_id: &str) -> Result<Option<Assignment>> {
        read_doc(self.store.as_ref(), &assignment_key(subject_id))
    }

    /// The task the subject should work on next.
    ///
    /// `None` when the subject has no assignment or has finished the ritual.
    pub fn current_task(&self, subject_id: &str) -> Result<Option<CurrentTask>> {
        let Some(assignment) = self.assignment(subject_id)? else {
            return Ok(None);
        };
        if assignment.is_complete() {
            return Ok(None);
        }
        let ritual = self.get(&assignment.ritual_id)?;
        let task_index = assignment.current_task_index;
        let Some(task) = ritual.task(task_index).cloned() else {
            return Ok(None);
        };
        let progress = Progress {
            current: task_index + 1,
            total: ritual.tasks.len(),
        };
        Ok(Some(CurrentTask {
            ritual,
            task,
            task_index,
            progress,
        }))
    }
}

pub(crate) fn read_doc<T: serde::de::DeserializeOwned>(
    store: &dyn LedgerStore,
    key: &DocKey,
) -> Result<Option<T>> {
    match store.read(key)? {
        Some(doc) => Ok(Some(serde_json::from_value(doc.body).map_err(StoreError::from)?)),
        None => Ok(None),
    }
}

fn validate(new: &NewRitual) -> std::result::Result<(), ValidationError> {
    if new.owner_id.trim().is_empty() {
        return Err(ValidationError::invalid("owner_id", "must not be empty"));
    }
    if new.subject_id.trim().is_empty() {
        return Err(ValidationError::invalid("subject_id", "must not be empty"));
    }
    if new.title.trim().is_empty() {
        return Err(ValidationError::invalid("title", "must not be empty"));
    }
    if new.tasks.is_empty() {
        return Err(ValidationError::EmptyCollection("tasks".into()));
    }
    for (index, task) in new.tasks.iter().enumerate() {
        if task.title.trim().is_empty() {
            return Err(ValidationError::invalid(
                "tasks",
                format!("task {index} has an empty title"),
            ));
        }
        if i64::try_from(task.token_reward).is_err() {
            return Err(ValidationError::invalid(
                "tasks",
                format!("task {index} reward {} is too large", task.token_reward),
            ));
        }
    }
    for (index, condition) in new.conditions.iter().enumerate() {
        condition.validate(index, new.tasks.len())?;
    }
    Ok(())
}
