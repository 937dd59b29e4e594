use clap::Subcommand;
use ritualware_core::RitualEngine;

use super::print_json;

#[derive(Subcommand)]
pub enum AccountAction {
    /// Open an account with a zero balance (no-op if it exists)
    Open {
        /// Subject ID
        subject_id: String,
    },
    /// Show the current balance
    Balance {
        /// Subject ID
        subject_id: String,
    },
    /// List recent transactions, newest first
    History {
        /// Subject ID
        subject_id: String,
        /// Maximum number of transactions
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: AccountAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RitualEngine::open()?;
    match action {
        AccountAction::Open { subject_id } => {
            let account = engine.ledger().open_account(&subject_id)?;
            print_json(&account)?;
        }
        AccountAction::Balance { subject_id } => {
            let account = engine.ledger().account(&subject_id)?;
            print_json(&account)?;
        }
        AccountAction::History { subject_id, limit } => {
            let history = engine.ledger().history(&subject_id, limit)?;
            print_json(&history)?;
        }
    }
    Ok(())
}
