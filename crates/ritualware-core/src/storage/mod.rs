mod config;
pub mod database;
pub mod migrations;
pub mod txn;

pub use config::{Config, LedgerConfig, SessionConfig, StorageConfig};
pub use database::SqliteStore;
pub use txn::{atomically, Plan, RetryPolicy, Snapshot};

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError};

/// Collection names used by the core.
pub mod collections {
    pub const ACCOUNTS: &str = "accounts";
    pub const RITUALS: &str = "rituals";
    pub const ASSIGNMENTS: &str = "ritual_assignments";
    pub const TOKEN_TRANSACTIONS: &str = "token_transactions";
    pub const TASK_EVIDENCE: &str = "task_evidence";
    pub const COMPLETIONS: &str = "task_completions";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const MOOD_LOGS: &str = "mood_logs";
    pub const ACTIVITY_LOGS: &str = "activity_logs";
}

/// Address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub collection: &'static str,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: &'static str, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document body together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    pub body: serde_json::Value,
    pub version: i64,
}

/// Version a key was observed at; `None` means the document was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadStamp {
    pub key: DocKey,
    pub version: Option<i64>,
}

/// A mutation applied by [`LedgerStore::commit`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or overwrite; bumps the version.
    Put { key: DocKey, body: serde_json::Value },
    /// Create only; fails with a conflict if the key exists.
    Insert { key: DocKey, body: serde_json::Value },
}

/// Persistent key to document storage with a compare-and-commit primitive.
///
/// Implementations must make `commit` all-or-nothing: either every stamp
/// still matches and every write lands, or nothing changes and
/// [`StoreError::Conflict`] is returned.
pub trait LedgerStore: Send + Sync {
    /// Point read of one document.
    fn read(&self, key: &DocKey) -> Result<Option<Versioned>, StoreError>;

    /// Apply `writes` iff every key in `stamps` is still at its stamped version.
    fn commit(&self, stamps: &[ReadStamp], writes: &[WriteOp]) -> Result<(), StoreError>;

    /// Append a new document under a generated id and return that id.
    fn append(&self, collection: &'static str, body: &serde_json::Value)
        -> Result<String, StoreError>;

    /// Documents matching `query`, as `(id, body)` pairs.
    fn query(&self, query: &Query) -> Result<Vec<(String, serde_json::Value)>, StoreError>;

    /// All documents of a collection in insertion order.
    fn scan(&self, collection: &'static str)
        -> Result<Vec<(String, serde_json::Value)>, StoreError> {
        self.query(&Query::collection(collection))
    }
}

/// Predicate on top-level document fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value; `Null` also matches a missing field.
    Eq(&'static str, serde_json::Value),
    Any(Vec<Filter>),
    All(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<serde_json::Value>) -> Self {
        Filter::Eq(field, value.into())
    }
}

/// A filtered, ordered and bounded read of one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: &'static str,
    pub filter: Option<Filter>,
    /// Most recently inserted first instead of insertion order
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: &'static str) -> Self {
        Self {
            collection,
            filter: None,
            newest_first: false,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Returns the data directory.
///
/// `RITUALWARE_DATA_DIR` wins when set; otherwise `~/.config/ritualware[-dev]`
/// based on RITUALWARE_ENV. Set RITUALWARE_ENV=dev to use the development
/// directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("RITUALWARE_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env =
                std::env::var("RITUALWARE_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("ritualware-dev")
            } else {
                base_dir.join("ritualware")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
