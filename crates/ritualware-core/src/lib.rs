//! # Ritualware Core Library
//!
//! Condition engine, task progression and token ledger for rituals: ordered
//! task lists an owner assigns to a subject, with declarative conditions that
//! reward, penalise, unlock or notify as the subject works through them.
//!
//! ## Architecture
//!
//! - **Storage**: a versioned document store ([`LedgerStore`]) with an
//!   optimistic multi-key transaction primitive ([`storage::atomically`]),
//!   backed by SQLite, plus TOML configuration
//! - **Ledger**: every balance change is one atomic transaction with an
//!   append-only audit record
//! - **Rules**: conditions, the evaluator that matches triggers against them,
//!   and the executor that applies the resulting actions
//! - **Progression**: the per-subject task pointer and the completion flow
//!   that drives evaluation
//!
//! ## Key Components
//!
//! - [`RitualEngine`]: all services wired over one store
//! - [`TokenLedger`]: balances and transactions
//! - [`ConditionEvaluator`] / [`ActionExecutor`]: the condition engine
//! - [`TaskProgression`]: task completion and replay
//! - [`SignalIntake`]: mood and streak triggers

pub mod engine;
pub mod error;
pub mod ledger;
pub mod notifications;
pub mod progression;
pub mod ritual;
pub mod rules;
pub mod session;
pub mod signals;
pub mod storage;

pub use engine::RitualEngine;
pub use error::{ConfigError, CoreError, EntityKind, StoreError, ValidationError};
pub use ledger::{Account, TokenLedger, TokenTransaction, TransactionRequest, TransactionType};
pub use notifications::{Notification, NotificationQueue};
pub use progression::{CompletionOutcome, TaskProgression};
pub use ritual::{Evidence, EvidenceKind, NewRitual, NewTask, Ritual, RitualRepository};
pub use rules::{Action, ActionExecutor, ActionLog, Condition, ConditionEvaluator, Trigger, TriggerKind};
pub use session::{MemorySessionStore, SessionStore};
pub use signals::{MoodOutcome, SignalIntake, StreakOutcome};
pub use storage::{Config, LedgerStore, SqliteStore};
