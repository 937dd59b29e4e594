use clap::Subcommand;
use ritualware_core::RitualEngine;

use super::print_json;

#[derive(Subcommand)]
pub enum StreakAction {
    /// Report a streak length and run the assigned ritual's streak conditions
    Report {
        /// Subject ID
        subject_id: String,
        /// Streak length in days
        count: u32,
    },
}

pub fn run(action: StreakAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RitualEngine::open()?;
    match action {
        StreakAction::Report { subject_id, count } => {
            let outcome = engine.signals().report_streak(&subject_id, count)?;
            print_json(&outcome)?;
        }
    }
    Ok(())
}
