//! Token ledger.
//!
//! Owns every change to an account balance. A balance mutation and its audit
//! record are committed together through [`atomically`], so a transaction is
//! either fully visible or not at all, and a concurrent writer forces a
//! re-read instead of a lost update.

mod transaction;

pub use transaction::{TokenTransaction, TransactionReceipt, TransactionRequest, TransactionType};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, EntityKind, Result};
use crate::storage::{atomically, collections, DocKey, Filter, LedgerStore, Plan, Query, RetryPolicy};

/// A subject's token balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub subject_id: String,
    pub token_balance: i64,
    pub created_at: DateTime<Utc>,
}

pub fn account_key(subject_id: &str) -> DocKey {
    DocKey::new(collections::ACCOUNTS, subject_id)
}

pub fn transaction_key(transaction_id: &str) -> DocKey {
    DocKey::new(collections::TOKEN_TRANSACTIONS, transaction_id)
}

#[derive(Clone)]
pub struct TokenLedger {
    store: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl TokenLedger {
    pub fn new(store: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Create the subject's account with a zero balance if it does not exist.
    pub fn open_account(&self, subject_id: &str) -> Result<Account> {
        if subject_id.is_empty() {
            return Err(crate::error::ValidationError::invalid("subject_id", "must not be empty").into());
        }
        let key = account_key(subject_id);
        atomically(self.store.as_ref(), &[key.clone()], &self.policy, |snap| {
            if let Some(existing) = snap.get::<Account>(&key)? {
                return Ok::<_, CoreError>(Plan::new(existing));
            }
            let account = Account {
                subject_id: subject_id.to_string(),
                token_balance: 0,
                created_at: Utc::now(),
            };
            Ok(Plan::new(account.clone()).insert(key.clone(), &account)?)
        })
    }

    /// Point read of a balance.
    ///
    /// Not linked to any later write; read-then-write callers must go through
    /// [`TokenLedger::apply`].
    pub fn balance(&self, subject_id: &str) -> Result<i64> {
        Ok(self.account(subject_id)?.token_balance)
    }

    pub fn account(&self, subject_id: &str) -> Result<Account> {
        let doc = self
            .store
            .read(&account_key(subject_id))?
            .ok_or_else(|| CoreError::not_found(EntityKind::Account, subject_id))?;
        Ok(serde_json::from_value(doc.body).map_err(crate::error::StoreError::from)?)
    }

    /// Apply a transaction and return its id.
    pub fn apply_transaction(&self, request: TransactionRequest) -> Result<String> {
        Ok(self.apply(request)?.transaction_id)
    }

    /// Apply a transaction as one atomic unit.
    ///
    /// Reads the sender and receiver balances, checks that a non-reward
    /// debit is covered, writes both balances and appends the audit record.
    /// With an idempotency key that was already applied nothing changes and
    /// the receipt is marked `replayed`.
    ///
    /// # Errors
    /// `Validation` for malformed requests, `NotFound` for a missing account,
    /// `InsufficientBalance` when the sender cannot cover a penalty or tribute.
    pub fn apply(&self, request: TransactionRequest) -> Result<TransactionReceipt> {
        request.validate()?;
        let amount = request.amount as i64;

        let transaction_id = request
            .idempotency_key
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let record_key = transaction_key(&transaction_id);
        let sender_key = request.sender_id.as_deref().map(account_key);
        let receiver_key = request.receiver_id.as_deref().map(account_key);

        let mut keys = vec![record_key.clone()];
        keys.extend(sender_key.iter().cloned());
        keys.extend(receiver_key.iter().cloned());

        let receipt = atomically(self.store.as_ref(), &keys, &self.policy, |snap| {
            if snap.exists(&record_key) {
                return Ok::<_, CoreError>(Plan::new(TransactionReceipt {
                    transaction_id: transaction_id.clone(),
                    replayed: true,
                }));
            }

            let mut plan = Plan::new(TransactionReceipt {
                transaction_id: transaction_id.clone(),
                replayed: false,
            });

            if let (Some(key), Some(sender_id)) = (&sender_key, &request.sender_id) {
                let mut sender: Account = snap
                    .get(key)?
                    .ok_or_else(|| CoreError::not_found(EntityKind::Account, sender_id))?;
                if request.kind != TransactionType::Reward && sender.token_balance < amount {
                    return Err(CoreError::InsufficientBalance {
                        subject_id: sender_id.clone(),
                        balance: sender.token_balance,
                        requested: request.amount,
                    });
                }
                sender.token_balance -= amount;
                plan = plan.put(key.clone(), &sender)?;
            }

            if let (Some(key), Some(receiver_id)) = (&receiver_key, &request.receiver_id) {
                let mut receiver: Account = snap
                    .get(key)?
                    .ok_or_else(|| CoreError::not_found(EntityKind::Account, receiver_id))?;
                receiver.token_balance = receiver.token_balance.checked_add(amount).ok_or_else(|| {
                    crate::error::ValidationError::invalid("amount", "receiver balance would overflow")
                })?;
                plan = plan.put(key.clone(), &receiver)?;
            }

            let record = TokenTransaction {
                id: transaction_id.clone(),
                kind: request.kind,
                sender_id: request.sender_id.clone(),
                receiver_id: request.receiver_id.clone(),
                amount: request.amount,
                description: request
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("{} transaction", request.kind)),
                related_entity_type: request.related_entity_type.clone(),
                related_entity_id: request.related_entity_id.clone(),
                timestamp: Utc::now(),
            };
            Ok(plan.insert(record_key.clone(), &record)?)
        })?;

        if receipt.replayed {
            tracing::debug!(transaction_id = %receipt.transaction_id, "transaction already applied");
        } else {
            tracing::info!(
                transaction_id = %receipt.transaction_id,
                kind = %request.kind,
                amount = request.amount,
                sender = request.sender_id.as_deref().unwrap_or("-"),
                receiver = request.receiver_id.as_deref().unwrap_or("-"),
                "token transaction applied"
            );
        }
        Ok(receipt)
    }

    /// Transfer tokens from a subject to another party.
    pub fn tribute(
        &self,
        sender_id: &str,
        receiver_id: &str,
        amount: u64,
        description: Option<&str>,
    ) -> Result<String> {
        let mut request = TransactionRequest::tribute(sender_id, receiver_id, amount);
        request.related_entity_type = Some("tribute".into());
        request.description = Some(description.unwrap_or("Tribute payment").to_string());
        self.apply_transaction(request)
    }

    pub fn transaction(&self, transaction_id: &str) -> Result<Option<TokenTransaction>> {
        match self.store.read(&transaction_key(transaction_id))? {
            Some(doc) => Ok(Some(
                serde_json::from_value(doc.body).map_err(crate::error::StoreError::from)?,
            )),
            None => Ok(None),
        }
    }

    /// Most recent transactions the subject took part in, newest (last
    /// committed) first.
    pub fn history(&self, subject_id: &str, limit: usize) -> Result<Vec<TokenTransaction>> {
        let query = Query::collection(collections::TOKEN_TRANSACTIONS)
            .filter(Filter::Any(vec![
                Filter::eq("sender_id", subject_id),
                Filter::eq("receiver_id", subject_id),
            ]))
            .newest_first()
            .limit(limit);
        let mut transactions = Vec::new();
        for (_, body) in self.store.query(&query)? {
            transactions.push(serde_json::from_value(body).map_err(crate::error::StoreError::from)?);
        }
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    fn ledger() -> TokenLedger {
        TokenLedger::new(Arc::new(SqliteStore::open_memory().unwrap()), RetryPolicy::default())
    }

    #[test]
    fn open_account_is_idempotent() {
        let ledger = ledger();
        ledger.open_account("pet").unwrap();
        ledger.apply_transaction(TransactionRequest::reward("pet", 4)).unwrap();
        let again = ledger.open_account("pet").unwrap();
        assert_eq!(again.token_balance, 4);
    }

    #[test]
    fn reward_credits_receiver() {
        let ledger = ledger();
        ledger.open_account("pet").unwrap();
        let id = ledger
            .apply_transaction(TransactionRequest::reward("pet", 10).related_to("ritual", "r1"))
            .unwrap();

        assert_eq!(ledger.balance("pet").unwrap(), 10);
        let record = ledger.transaction(&id).unwrap().unwrap();
        assert_eq!(record.kind, TransactionType::Reward);
        assert_eq!(record.related_entity_id.as_deref(), Some("r1"));
        assert_eq!(record.description, "reward transaction");
    }

    #[test]
    fn insufficient_penalty_leaves_no_trace() {
        let ledger = ledger();
        ledger.open_account("pet").unwrap();
        ledger.apply_transaction(TransactionRequest::reward("pet", 3)).unwrap();

        let err = ledger
            .apply_transaction(TransactionRequest::penalty("pet", 5))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientBalance { balance: 3, requested: 5, .. }
        ));
        assert_eq!(ledger.balance("pet").unwrap(), 3);
        assert_eq!(ledger.history("pet", 10).unwrap().len(), 1);
    }

    #[test]
    fn tribute_moves_tokens_between_accounts() {
        let ledger = ledger();
        ledger.open_account("pet").unwrap();
        ledger.open_account("owner").unwrap();
        ledger.apply_transaction(TransactionRequest::reward("pet", 8)).unwrap();

        ledger.tribute("pet", "owner", 5, None).unwrap();
        assert_eq!(ledger.balance("pet").unwrap(), 3);
        assert_eq!(ledger.balance("owner").unwrap(), 5);

        let err = ledger.tribute("pet", "owner", 4, None).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBalance { .. }));
    }

    #[test]
    fn missing_account_is_not_found() {
        let ledger = ledger();
        let err = ledger
            .apply_transaction(TransactionRequest::reward("ghost", 1))
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: EntityKind::Account, .. }));
        assert!(matches!(ledger.balance("ghost"), Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn idempotency_key_prevents_double_payment() {
        let ledger = ledger();
        ledger.open_account("pet").unwrap();

        let first = ledger
            .apply(TransactionRequest::reward("pet", 10).keyed("completion:r:pet:0:reward"))
            .unwrap();
        let second = ledger
            .apply(TransactionRequest::reward("pet", 10).keyed("completion:r:pet:0:reward"))
            .unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.transaction_id, second.transaction_id);
        assert_eq!(ledger.balance("pet").unwrap(), 10);
    }

    #[test]
    fn unkeyed_requests_are_not_deduplicated() {
        let ledger = ledger();
        ledger.open_account("pet").unwrap();
        ledger.apply_transaction(TransactionRequest::reward("pet", 10)).unwrap();
        ledger.apply_transaction(TransactionRequest::reward("pet", 10)).unwrap();
        assert_eq!(ledger.balance("pet").unwrap(), 20);
    }

    #[test]
    fn history_is_newest_first_and_limited() {
        let ledger = ledger();
        ledger.open_account("pet").unwrap();
        ledger.open_account("other").unwrap();
        for amount in 1..=4 {
            ledger.apply_transaction(TransactionRequest::reward("pet", amount)).unwrap();
        }
        ledger.apply_transaction(TransactionRequest::reward("other", 9)).unwrap();

        let history = ledger.history("pet", 3).unwrap();
        let amounts: Vec<u64> = history.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![4, 3, 2]);
    }

    #[test]
    fn history_includes_both_sides_of_a_tribute() {
        let ledger = ledger();
        ledger.open_account("pet").unwrap();
        ledger.open_account("owner").unwrap();
        ledger.apply_transaction(TransactionRequest::reward("pet", 10)).unwrap();
        ledger.tribute("pet", "owner", 4, None).unwrap();

        let sender = ledger.history("pet", 10).unwrap();
        assert_eq!(sender.len(), 2);
        assert_eq!(sender[0].kind, TransactionType::Tribute);

        let receiver = ledger.history("owner", 10).unwrap();
        assert_eq!(receiver.len(), 1);
        assert_eq!(receiver[0].description, "Tribute payment");
        assert!(ledger.history("nobody", 10).unwrap().is_empty());
    }
}
