//! Short-lived per-subject conversation state.
//!
//! Multi-step chat flows (such as the mood prompt) park their state here
//! between messages. Entries expire after a TTL; the store is injected so a
//! deployment can swap the in-memory map for something shared.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;

pub trait SessionStore<T>: Send + Sync {
    /// Store `value` for the subject, replacing any existing entry.
    fn put(&self, subject_id: &str, value: T) -> Result<(), StoreError>;

    /// The live entry for the subject, if any.
    fn get(&self, subject_id: &str) -> Result<Option<T>, StoreError>;

    /// Remove and return the live entry for the subject.
    fn take(&self, subject_id: &str) -> Result<Option<T>, StoreError>;

    /// Drop expired entries and return how many were dropped.
    fn purge_expired(&self) -> Result<usize, StoreError>;
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

/// In-process [`SessionStore`] with a fixed time-to-live.
#[derive(Debug)]
pub struct MemorySessionStore<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> MemorySessionStore<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl_secs(ttl_secs: u64) -> Self {
        let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self::new(Duration::try_seconds(secs).unwrap_or(Duration::MAX))
    }
}

impl<T: Clone + Send> SessionStore<T> for MemorySessionStore<T> {
    /// Also drops every expired entry, not just the subject's own.
    fn put(&self, subject_id: &str, value: T) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let now = Utc::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            subject_id.to_string(),
            Entry {
                value,
                expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        Ok(())
    }

    fn get(&self, subject_id: &str) -> Result<Option<T>, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        match entries.get(subject_id) {
            Some(entry) if entry.expires_at > Utc::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(subject_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn take(&self, subject_id: &str) -> Result<Option<T>, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .remove(subject_id)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.value))
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }
}
