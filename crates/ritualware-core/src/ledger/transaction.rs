//! Token transaction records and requests.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// System-issued credit; no sender
    Reward,
    /// Debit that leaves the system; no receiver
    Penalty,
    /// Transfer from one subject to another
    Tribute,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionType::Reward => "reward",
            TransactionType::Penalty => "penalty",
            TransactionType::Tribute => "tribute",
        })
    }
}

/// Immutable audit record; one per applied balance mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub amount: u64,
    pub description: String,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Input to [`TokenLedger::apply`](super::TokenLedger::apply).
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub kind: TransactionType,
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub amount: u64,
    pub description: Option<String>,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<String>,
    /// When set, becomes the transaction id and makes the request replay-safe.
    pub idempotency_key: Option<String>,
}

impl TransactionRequest {
    pub fn reward(receiver_id: impl Into<String>, amount: u64) -> Self {
        Self::bare(TransactionType::Reward, None, Some(receiver_id.into()), amount)
    }

    pub fn penalty(sender_id: impl Into<String>, amount: u64) -> Self {
        Self::bare(TransactionType::Penalty, Some(sender_id.into()), None, amount)
    }

    pub fn tribute(sender_id: impl Into<String>, receiver_id: impl Into<String>, amount: u64) -> Self {
        Self::bare(
            TransactionType::Tribute,
            Some(sender_id.into()),
            Some(receiver_id.into()),
            amount,
        )
    }

    fn bare(
        kind: TransactionType,
        sender_id: Option<String>,
        receiver_id: Option<String>,
        amount: u64,
    ) -> Self {
        Self {
            kind,
            sender_id,
            receiver_id,
            amount,
            description: None,
            related_entity_type: None,
            related_entity_id: None,
            idempotency_key: None,
        }
    }

    pub fn related_to(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.related_entity_type = Some(entity_type.into());
        self.related_entity_id = Some(entity_id.into());
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Check the amount and that the parties fit the transaction kind.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount == 0 {
            return Err(ValidationError::invalid("amount", "must be positive"));
        }
        if i64::try_from(self.amount).is_err() {
            return Err(ValidationError::invalid("amount", "exceeds the balance range"));
        }

        let sender = self.sender_id.as_deref();
        let receiver = self.receiver_id.as_deref();
        if sender.is_none() && receiver.is_none() {
            return Err(ValidationError::invalid(
                "sender_id",
                "a sender or a receiver is required",
            ));
        }
        if sender.is_some_and(str::is_empty) || receiver.is_some_and(str::is_empty) {
            return Err(ValidationError::invalid("sender_id", "party ids must not be empty"));
        }

        match (self.kind, sender, receiver) {
            (TransactionType::Reward, None, Some(_)) => Ok(()),
            (TransactionType::Reward, _, _) => Err(ValidationError::invalid(
                "sender_id",
                "a reward has a receiver and no sender",
            )),
            (TransactionType::Penalty, Some(_), None) => Ok(()),
            (TransactionType::Penalty, _, _) => Err(ValidationError::invalid(
                "receiver_id",
                "a penalty has a sender and no receiver",
            )),
            (TransactionType::Tribute, Some(s), Some(r)) if s != r => Ok(()),
            (TransactionType::Tribute, _, _) => Err(ValidationError::invalid(
                "receiver_id",
                "a tribute needs two distinct parties",
            )),
        }
    }
}

/// What [`TokenLedger::apply`](super::TokenLedger::apply) reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_id: String,
    /// True when the idempotency key had already been applied
    pub replayed: bool,
}
