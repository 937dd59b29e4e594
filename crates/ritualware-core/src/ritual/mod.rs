//! Ritual, task and assignment types.
//!
//! A ritual is an ordered list of tasks assigned by an owner to a subject,
//! plus the conditions that fire while the subject works through it. The
//! subject's [`Assignment`] mirrors the ritual's progress pointer.

mod repository;

pub(crate) use repository::read_doc;
pub use repository::RitualRepository;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::Condition;
use crate::storage::{collections, DocKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RitualStatus {
    Active,
    /// Terminal; `current_task_index` no longer moves.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

/// What a task accepts as proof of completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Text,
    Photo,
    #[default]
    Any,
}

impl EvidenceKind {
    pub fn accepts(&self, evidence: &Evidence) -> bool {
        match self {
            EvidenceKind::Any => true,
            EvidenceKind::Text => matches!(evidence, Evidence::Text { .. }),
            EvidenceKind::Photo => matches!(evidence, Evidence::Photo { .. }),
        }
    }
}

/// Proof submitted with a task completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Evidence {
    Text { content: String },
    /// `content` is the URL of the already-uploaded photo.
    Photo { content: String },
}

impl Evidence {
    pub fn content(&self) -> &str {
        match self {
            Evidence::Text { content } | Evidence::Photo { content } => content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Position within the ritual; unique, and equal to the task's index
    pub order: usize,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence_kind: EvidenceKind,
    #[serde(default)]
    pub token_reward: u64,
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ritual {
    pub id: String,
    pub owner_id: String,
    pub subject_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: RitualStatus,
    pub current_task_index: usize,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Sorted by `order`
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
}

impl Ritual {
    pub fn task(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }
}

/// A subject's progression pointer into one ritual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub ritual_id: String,
    pub subject_id: String,
    pub owner_id: String,
    pub current_task_index: usize,
    pub status: RitualStatus,
    /// Task indices unlocked by `unlock_task` actions
    #[serde(default)]
    pub unlocked_tasks: BTreeSet<usize>,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Assignment {
    pub fn is_complete(&self) -> bool {
        self.status == RitualStatus::Completed
    }
}

/// Task as supplied when creating a ritual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence_kind: EvidenceKind,
    #[serde(default)]
    pub token_reward: u64,
}

/// Ritual as supplied by the creation wizard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRitual {
    pub owner_id: String,
    pub subject_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub tasks: Vec<NewTask>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 1-based position of the current task
    pub current: usize,
    pub total: usize,
}

/// The task a subject should work on next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentTask {
    pub ritual: Ritual,
    pub task: Task,
    pub task_index: usize,
    pub progress: Progress,
}

pub fn ritual_key(ritual_id: &str) -> DocKey {
    DocKey::new(collections::RITUALS, ritual_id)
}

/// Assignments are keyed by subject: a subject follows one ritual at a time.
pub fn assignment_key(subject_id: &str) -> DocKey {
    DocKey::new(collections::ASSIGNMENTS, subject_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_kind_acceptance() {
        let text = Evidence::Text { content: "done".into() };
        let photo = Evidence::Photo { content: "https://img/1.jpg".into() };
        assert!(EvidenceKind::Any.accepts(&text));
        assert!(EvidenceKind::Any.accepts(&photo));
        assert!(EvidenceKind::Text.accepts(&text));
        assert!(!EvidenceKind::Text.accepts(&photo));
        assert!(!EvidenceKind::Photo.accepts(&text));
    }

    #[test]
    fn evidence_wire_shape() {
        let evidence: Evidence =
            serde_json::from_str(r#"{"kind": "photo", "content": "https://img/1.jpg"}"#).unwrap();
        assert_eq!(evidence.content(), "https://img/1.jpg");
    }

    #[test]
    fn new_ritual_from_toml() {
        let toml = r#"
            owner_id = "mistress"
            subject_id = "pet"
            title = "Morning"

            [[tasks]]
            title = "Make the bed"
            token_reward = 10

            [[tasks]]
            title = "Photo of breakfast"
            evidence_kind = "photo"

            [[conditions]]
            trigger = "mood"
            operator = "=="
            comparand = "sad"
            actions = [{ type = "notify", message = "Be gentle with yourself" }]
        "#;
        let parsed: NewRitual = toml::from_str(toml).unwrap();
        assert_eq!(parsed.tasks.len(), 2);
        assert_eq!(parsed.tasks[0].evidence_kind, EvidenceKind::Any);
        assert_eq!(parsed.tasks[1].evidence_kind, EvidenceKind::Photo);
        assert_eq!(parsed.conditions.len(), 1);
    }
}
