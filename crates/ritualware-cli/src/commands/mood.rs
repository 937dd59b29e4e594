use clap::Subcommand;
use ritualware_core::RitualEngine;

use super::print_json;

#[derive(Subcommand)]
pub enum MoodAction {
    /// Log a mood and run the assigned ritual's mood conditions
    Log {
        /// Subject ID
        subject_id: String,
        /// Mood text
        mood: String,
    },
}

pub fn run(action: MoodAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RitualEngine::open()?;
    match action {
        MoodAction::Log { subject_id, mood } => {
            let outcome = engine.signals().log_mood_and_evaluate(&subject_id, &mood)?;
            print_json(&outcome)?;
        }
    }
    Ok(())
}
