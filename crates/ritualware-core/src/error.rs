//! Core error types for ritualware-core.
//!
//! This module defines the error hierarchy using thiserror. `CoreError` is
//! what callers see; `StoreError` stays inside the persistence layer except
//! when a commit cannot be completed at all.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::rules::{Operator, Scalar};

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Ritual,
    Assignment,
    Account,
    Completion,
    Notification,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Ritual => "Ritual",
            EntityKind::Assignment => "Assignment",
            EntityKind::Account => "Account",
            EntityKind::Completion => "Completion",
            EntityKind::Notification => "Notification",
        };
        f.write_str(name)
    }
}

/// Core error type for ritualware-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Ritual, assignment, account or completion record missing
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    /// Penalty or tribute exceeds the sender's balance
    #[error("Insufficient token balance for '{subject_id}': balance {balance}, requested {requested}")]
    InsufficientBalance {
        subject_id: String,
        balance: i64,
        requested: u64,
    },

    /// Completion submitted for a task that is not the current one
    #[error("Cannot complete task {submitted} of ritual '{ritual_id}': current task is {current}")]
    StaleTask {
        ritual_id: String,
        submitted: usize,
        current: usize,
    },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoreError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether repeating the same call later could succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CoreError::Store(StoreError::RetriesExhausted { .. })
                | CoreError::Store(StoreError::Locked)
        )
    }
}

/// Persistence-layer errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A document changed between snapshot read and commit. Retried internally.
    #[error("Transaction conflict on '{key}'")]
    Conflict { key: String },

    /// Optimistic retry gave up
    #[error("Transaction still conflicting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Failed to open database file
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Document body could not be (de)serialized
    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection mutex poisoned by a panicking writer
    #[error("Database connection poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to resolve the data directory
    #[error("Cannot access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Out of bounds
    #[error("Index {index} out of bounds for {collection} (length: {len})")]
    OutOfBounds {
        collection: String,
        index: usize,
        len: usize,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Condition rejected at ritual creation
    #[error("Invalid condition #{index}: {message}")]
    InvalidCondition { index: usize, message: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A condition that cannot be tested against a trigger value.
///
/// Raised at evaluation time only; the evaluator logs it and skips the
/// condition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("cannot apply '{operator}' to {lhs:?} and {rhs:?}")]
    Incomparable {
        operator: Operator,
        lhs: Scalar,
        rhs: Scalar,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity() {
        let err = CoreError::not_found(EntityKind::Ritual, "r-1");
        assert_eq!(err.to_string(), "Ritual 'r-1' not found");
    }

    #[test]
    fn retriable_only_for_contention() {
        assert!(CoreError::Store(StoreError::RetriesExhausted { attempts: 3 }).is_retriable());
        assert!(!CoreError::StaleTask {
            ritual_id: "r".into(),
            submitted: 0,
            current: 1,
        }
        .is_retriable());
    }
}
