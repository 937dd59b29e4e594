use clap::Subcommand;
use ritualware_core::RitualEngine;
use serde_json::json;

use super::print_json;

#[derive(Subcommand)]
pub enum LedgerAction {
    /// Transfer tokens from one subject to another
    Tribute {
        /// Paying subject
        sender_id: String,
        /// Receiving subject
        receiver_id: String,
        /// Number of tokens
        amount: u64,
        /// Free-form description
        #[arg(long)]
        description: Option<String>,
    },
}

pub fn run(action: LedgerAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RitualEngine::open()?;
    match action {
        LedgerAction::Tribute {
            sender_id,
            receiver_id,
            amount,
            description,
        } => {
            let transaction_id =
                engine
                    .ledger()
                    .tribute(&sender_id, &receiver_id, amount, description.as_deref())?;
            print_json(&json!({
                "transaction_id": transaction_id,
                "sender_balance": engine.ledger().balance(&sender_id)?,
                "receiver_balance": engine.ledger().balance(&receiver_id)?,
            }))?;
        }
    }
    Ok(())
}
