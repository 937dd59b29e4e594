//! Trigger definitions for the condition engine.
//!
//! A trigger is a discrete life-cycle event (task completed, mood logged,
//! streak reached, ritual completed) together with the value it carries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which life-cycle event a condition listens for.
///
/// Stored as a plain string; strings that name no known trigger are kept as
/// [`TriggerKind::Other`] so legacy documents still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerKind {
    Completion,
    Mood,
    Streak,
    RitualCompletion,
    Other(String),
}

impl TriggerKind {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerKind::Completion => "completion",
            TriggerKind::Mood => "mood",
            TriggerKind::Streak => "streak",
            TriggerKind::RitualCompletion => "ritual_completion",
            TriggerKind::Other(raw) => raw,
        }
    }
}

impl From<String> for TriggerKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "completion" => TriggerKind::Completion,
            "mood" => TriggerKind::Mood,
            "streak" => TriggerKind::Streak,
            "ritual_completion" => TriggerKind::RitualCompletion,
            _ => TriggerKind::Other(raw),
        }
    }
}

impl From<TriggerKind> for String {
    fn from(kind: TriggerKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trigger value or a condition comparand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl Scalar {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Flag(_) => "boolean",
            Scalar::Number(_) => "number",
            Scalar::Text(_) => "text",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Flag(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

/// A fired trigger: the event kind plus the value it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub value: Scalar,
}

impl Trigger {
    pub fn completion(task_index: usize) -> Self {
        Self {
            kind: TriggerKind::Completion,
            value: Scalar::Number(task_index as i64),
        }
    }

    pub fn mood(mood: impl Into<String>) -> Self {
        Self {
            kind: TriggerKind::Mood,
            value: Scalar::Text(mood.into()),
        }
    }

    pub fn streak(count: u32) -> Self {
        Self {
            kind: TriggerKind::Streak,
            value: Scalar::Number(i64::from(count)),
        }
    }

    pub fn ritual_completion() -> Self {
        Self {
            kind: TriggerKind::RitualCompletion,
            value: Scalar::Flag(true),
        }
    }
}
