//! Property-based and concurrency tests for the token ledger.
//!
//! ## Properties Verified
//!
//! - Conservation: the sum of all balances equals rewards minus penalties
//! - No balance ever goes negative
//! - Every applied transaction leaves exactly one audit record; rejected
//!   ones leave none
//! - Concurrent writers never lose an update

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use ritualware_core::storage::{collections, RetryPolicy, SqliteStore};
use ritualware_core::{CoreError, LedgerStore, TokenLedger, TransactionRequest, TransactionType};

const SUBJECTS: [&str; 3] = ["pet", "owner", "friend"];

#[derive(Debug, Clone)]
enum Op {
    Reward { to: usize, amount: u64 },
    Penalty { from: usize, amount: u64 },
    Tribute { from: usize, to: usize, amount: u64 },
}

impl Op {
    fn request(&self) -> TransactionRequest {
        match *self {
            Op::Reward { to, amount } => TransactionRequest::reward(SUBJECTS[to], amount),
            Op::Penalty { from, amount } => TransactionRequest::penalty(SUBJECTS[from], amount),
            Op::Tribute { from, to, amount } => {
                TransactionRequest::tribute(SUBJECTS[from], SUBJECTS[to], amount)
            }
        }
    }
}

fn arb_op() -> impl Strategy<Value = Op> {
    let subject = 0..SUBJECTS.len();
    let amount = 1u64..50;
    prop_oneof![
        (subject.clone(), amount.clone()).prop_map(|(to, amount)| Op::Reward { to, amount }),
        (subject.clone(), amount.clone()).prop_map(|(from, amount)| Op::Penalty { from, amount }),
        (subject.clone(), subject, amount)
            .prop_filter("tribute needs two parties", |(from, to, _)| from != to)
            .prop_map(|(from, to, amount)| Op::Tribute { from, to, amount }),
    ]
}

fn ledger() -> (Arc<SqliteStore>, TokenLedger) {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let ledger = TokenLedger::new(store.clone(), RetryPolicy::default());
    for subject in SUBJECTS {
        ledger.open_account(subject).unwrap();
    }
    (store, ledger)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: balances reconstruct from rewards and penalties, and never go negative
    #[test]
    fn prop_ledger_conserves_tokens(ops in prop::collection::vec(arb_op(), 1..40)) {
        let (store, ledger) = ledger();
        let mut rewarded: i64 = 0;
        let mut penalised: i64 = 0;
        let mut applied = 0usize;

        for op in &ops {
            let request = op.request();
            let kind = request.kind;
            let amount = request.amount as i64;
            match ledger.apply(request) {
                Ok(_) => {
                    applied += 1;
                    match kind {
                        TransactionType::Reward => rewarded += amount,
                        TransactionType::Penalty => penalised += amount,
                        TransactionType::Tribute => {}
                    }
                }
                Err(CoreError::InsufficientBalance { balance, requested, .. }) => {
                    prop_assert!(balance < requested as i64);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }

        let mut total = 0i64;
        for subject in SUBJECTS {
            let balance = ledger.balance(subject).unwrap();
            prop_assert!(balance >= 0, "{subject} went negative: {balance}");
            total += balance;
        }
        prop_assert_eq!(total, rewarded - penalised);

        let records = store.scan(collections::TOKEN_TRANSACTIONS).unwrap();
        prop_assert_eq!(records.len(), applied);
    }

    /// Property: a keyed request applies once however often it is repeated
    #[test]
    fn prop_keyed_request_applies_once(amount in 1u64..1000, repeats in 1usize..5) {
        let (_, ledger) = ledger();
        for _ in 0..repeats {
            ledger
                .apply(TransactionRequest::reward("pet", amount).keyed("once"))
                .unwrap();
        }
        prop_assert_eq!(ledger.balance("pet").unwrap(), amount as i64);
    }
}

#[test]
fn test_concurrent_rewards_are_not_lost() {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let policy = RetryPolicy {
        max_attempts: 10_000,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
    };
    let ledger = TokenLedger::new(store, policy);
    ledger.open_account("pet").unwrap();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..25 {
                    ledger
                        .apply_transaction(TransactionRequest::reward("pet", 1))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(ledger.balance("pet").unwrap(), 200);
    assert_eq!(ledger.history("pet", 1000).unwrap().len(), 200);
}

#[test]
fn test_concurrent_penalties_never_overdraw() {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let policy = RetryPolicy {
        max_attempts: 10_000,
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
    };
    let ledger = TokenLedger::new(store, policy);
    ledger.open_account("pet").unwrap();
    ledger
        .apply_transaction(TransactionRequest::reward("pet", 10))
        .unwrap();

    let outcomes: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|_| scope.spawn(|| ledger.apply_transaction(TransactionRequest::penalty("pet", 3)).is_ok()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 3);
    assert_eq!(ledger.balance("pet").unwrap(), 1);
}
