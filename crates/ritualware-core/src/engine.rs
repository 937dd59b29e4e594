//! Wiring of the core services over one store.

use std::sync::Arc;

use crate::error::Result;
use crate::ledger::TokenLedger;
use crate::notifications::NotificationQueue;
use crate::progression::TaskProgression;
use crate::ritual::RitualRepository;
use crate::rules::{ActionExecutor, ConditionEvaluator};
use crate::session::{MemorySessionStore, SessionStore};
use crate::signals::{MoodPrompt, SignalIntake};
use crate::storage::{data_dir, Config, LedgerStore, RetryPolicy, SqliteStore};

/// Every core service, sharing a single [`LedgerStore`].
#[derive(Clone)]
pub struct RitualEngine {
    store: Arc<dyn LedgerStore>,
    ledger: TokenLedger,
    rituals: RitualRepository,
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
    progression: TaskProgression,
    signals: SignalIntake,
    notifications: NotificationQueue,
}

impl RitualEngine {
    /// Open the engine on the configured database inside the data directory.
    ///
    /// # Errors
    /// `Config` when the data directory or config file is unusable, `Store`
    /// when the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let config = Config::load()?;
        let path = data_dir()?.join(&config.storage.database_file);
        let store = SqliteStore::open_path(path)?;
        Ok(Self::with_store(Arc::new(store), &config))
    }

    /// Build the engine over an existing store, with in-memory prompt sessions.
    pub fn with_store(store: Arc<dyn LedgerStore>, config: &Config) -> Self {
        let prompts: Arc<dyn SessionStore<MoodPrompt>> =
            Arc::new(MemorySessionStore::with_ttl_secs(config.sessions.ttl_secs));
        Self::with_sessions(store, config, prompts)
    }

    pub fn with_sessions(
        store: Arc<dyn LedgerStore>,
        config: &Config,
        prompts: Arc<dyn SessionStore<MoodPrompt>>,
    ) -> Self {
        let policy = RetryPolicy::from(&config.ledger);
        let ledger = TokenLedger::new(Arc::clone(&store), policy.clone());
        let rituals = RitualRepository::new(Arc::clone(&store), policy.clone());
        let evaluator = ConditionEvaluator::new(Arc::clone(&store));
        let executor = ActionExecutor::new(Arc::clone(&store), ledger.clone(), policy.clone());
        let progression = TaskProgression::new(
            Arc::clone(&store),
            evaluator.clone(),
            executor.clone(),
            policy.clone(),
        );
        let signals = SignalIntake::new(
            Arc::clone(&store),
            rituals.clone(),
            evaluator.clone(),
            executor.clone(),
            prompts,
        );
        let notifications = NotificationQueue::new(Arc::clone(&store), policy);

        Self {
            store,
            ledger,
            rituals,
            evaluator,
            executor,
            progression,
            signals,
            notifications,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn rituals(&self) -> &RitualRepository {
        &self.rituals
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn progression(&self) -> &TaskProgression {
        &self.progression
    }

    pub fn signals(&self) -> &SignalIntake {
        &self.signals
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }
}
