//! Pending-notification queue.
//!
//! `notify` actions land here; delivering them to the subject is the job of
//! whatever transport drains the queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, EntityKind, Result, StoreError};
use crate::storage::{atomically, collections, DocKey, Filter, LedgerStore, Plan, Query, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub subject_id: String,
    pub message: String,
    pub related_to: String,
    pub related_id: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

fn notification_key(id: &str) -> DocKey {
    DocKey::new(collections::NOTIFICATIONS, id)
}

#[derive(Clone)]
pub struct NotificationQueue {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl NotificationQueue {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Queue a ritual notification. With `id` set, a second call with the
    /// same id is a no-op; the returned flag tells whether that happened.
    pub fn enqueue(
        &self,
        subject_id: &str,
        message: &str,
        ritual_id: &str,
        id: Option<String>,
    ) -> Result<(String, bool)> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = notification_key(&id);
        atomically(self.store.as_ref(), &[key.clone()], &self.policy, |snap| {
            if snap.exists(&key) {
                return Ok::<_, CoreError>(Plan::new((id.clone(), true)));
            }
            let notification = Notification {
                id: id.clone(),
                subject_id: subject_id.to_string(),
                message: message.to_string(),
                related_to: "ritual".into(),
                related_id: ritual_id.to_string(),
                created_at: Utc::now(),
                read: false,
            };
            Ok(Plan::new((id.clone(), false)).insert(key.clone(), &notification)?)
        })
    }

    /// Unread notifications for a subject, oldest first.
    pub fn pending(&self, subject_id: &str) -> Result<Vec<Notification>> {
        let query = Query::collection(collections::NOTIFICATIONS).filter(Filter::All(vec![
            Filter::eq("subject_id", subject_id),
            Filter::eq("read", false),
        ]));
        let mut pending = Vec::new();
        for (_, body) in self.store.query(&query)? {
            pending.push(serde_json::from_value(body).map_err(StoreError::from)?);
        }
        Ok(pending)
    }

    pub fn mark_read(&self, id: &str) -> Result<Notification> {
        let key = notification_key(id);
        atomically(self.store.as_ref(), &[key.clone()], &self.policy, |snap| {
            let mut notification: Notification = snap
                .get(&key)?
                .ok_or_else(|| CoreError::not_found(EntityKind::Notification, id))?;
            if notification.read {
                return Ok(Plan::new(notification));
            }
            notification.read = true;
            Ok(Plan::new(notification.clone()).put(key.clone(), &notification)?)
        })
    }
}
