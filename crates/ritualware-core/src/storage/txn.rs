//! Optimistic read-compute-commit loop over a [`LedgerStore`].
//!
//! `atomically` reads a snapshot of the requested keys, hands it to a
//! closure that decides what to write, and commits only if none of those
//! keys moved in the meantime. On a conflict the whole closure runs again
//! against a fresh read, so closures must be free of side effects other than
//! the writes they return.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{DocKey, LedgerConfig, LedgerStore, ReadStamp, Versioned, WriteOp};
use crate::error::StoreError;

/// Bounds for the optimistic retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Sleep before attempt `attempt + 1`.
    ///
    /// Full jitter over an exponentially growing window so that two writers
    /// that collided once do not collide again in lockstep.
    fn backoff(&self, attempt: u32) {
        let base_ms = self.backoff_base.as_millis() as u64;
        if base_ms == 0 {
            return;
        }
        let window = base_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.backoff_max.as_millis() as u64);
        let wait = rand::thread_rng().gen_range(0..=window);
        std::thread::sleep(Duration::from_millis(wait));
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&LedgerConfig::default())
    }
}

impl From<&LedgerConfig> for RetryPolicy {
    fn from(cfg: &LedgerConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
            backoff_max: Duration::from_millis(cfg.backoff_max_ms),
        }
    }
}

/// Documents read at the start of one attempt.
#[derive(Debug)]
pub struct Snapshot {
    docs: HashMap<DocKey, Option<Versioned>>,
    order: Vec<DocKey>,
}

impl Snapshot {
    fn read(store: &dyn LedgerStore, keys: &[DocKey]) -> Result<Self, StoreError> {
        let mut docs = HashMap::with_capacity(keys.len());
        let mut order = Vec::with_capacity(keys.len());
        for key in keys {
            if docs.contains_key(key) {
                continue;
            }
            docs.insert(key.clone(), store.read(key)?);
            order.push(key.clone());
        }
        Ok(Self { docs, order })
    }

    /// Whether `key` existed at read time. Keys outside the snapshot count as absent.
    pub fn exists(&self, key: &DocKey) -> bool {
        matches!(self.docs.get(key), Some(Some(_)))
    }

    /// Typed view of a snapshot document.
    pub fn get<T: DeserializeOwned>(&self, key: &DocKey) -> Result<Option<T>, StoreError> {
        match self.docs.get(key) {
            Some(Some(doc)) => Ok(Some(serde_json::from_value(doc.body.clone())?)),
            _ => Ok(None),
        }
    }

    fn stamps(&self) -> Vec<ReadStamp> {
        self.order
            .iter()
            .map(|key| ReadStamp {
                key: key.clone(),
                version: self.docs.get(key).and_then(|d| d.as_ref().map(|v| v.version)),
            })
            .collect()
    }
}

/// Outcome of one attempt: a return value plus the writes that justify it.
#[derive(Debug)]
pub struct Plan<T> {
    value: T,
    writes: Vec<WriteOp>,
}

impl<T> Plan<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            writes: Vec::new(),
        }
    }

    pub fn put<D: Serialize>(mut self, key: DocKey, doc: &D) -> Result<Self, StoreError> {
        self.writes.push(WriteOp::Put {
            key,
            body: serde_json::to_value(doc)?,
        });
        Ok(self)
    }

    pub fn insert<D: Serialize>(mut self, key: DocKey, doc: &D) -> Result<Self, StoreError> {
        self.writes.push(WriteOp::Insert {
            key,
            body: serde_json::to_value(doc)?,
        });
        Ok(self)
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Run `f` against a snapshot of `keys` and commit its plan atomically.
///
/// Every write key should also appear in `keys`; writes to keys outside the
/// snapshot are not version-checked.
///
/// # Errors
/// Returns whatever `f` fails with (no mutation happens), any non-conflict
/// store error, or [`StoreError::RetriesExhausted`] once `policy.max_attempts`
/// conflicting attempts have been made.
pub fn atomically<T, E, F>(
    store: &dyn LedgerStore,
    keys: &[DocKey],
    policy: &RetryPolicy,
    mut f: F,
) -> Result<T, E>
where
    E: From<StoreError>,
    F: FnMut(&Snapshot) -> Result<Plan<T>, E>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let snapshot = Snapshot::read(store, keys)?;
        let plan = f(&snapshot)?;
        if plan.is_read_only() {
            return Ok(plan.value);
        }

        match store.commit(&snapshot.stamps(), &plan.writes) {
            Ok(()) => return Ok(plan.value),
            Err(StoreError::Conflict { key }) if attempt < policy.max_attempts => {
                tracing::debug!(%key, attempt, "transaction conflict, retrying from fresh read");
                policy.backoff(attempt);
            }
            Err(StoreError::Conflict { key }) => {
                tracing::warn!(%key, attempt, "giving up after repeated transaction conflicts");
                return Err(StoreError::RetriesExhausted { attempts: attempt }.into());
            }
            Err(err) => return Err(err.into()),
        }
    }
}
