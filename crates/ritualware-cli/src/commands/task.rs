//! Task progression commands for CLI.

use clap::Subcommand;
use ritualware_core::{Evidence, RitualEngine};

use super::print_json;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Show the subject's current task and progress
    Current {
        /// Subject ID
        subject_id: String,
    },
    /// Complete the current task with evidence
    Complete {
        /// Ritual ID
        ritual_id: String,
        /// Subject ID
        subject_id: String,
        /// Index of the task being completed
        task_index: usize,
        /// Text evidence
        #[arg(long, conflicts_with = "photo")]
        text: Option<String>,
        /// URL of an uploaded photo
        #[arg(long)]
        photo: Option<String>,
    },
    /// Re-run rewards and conditions for a stored completion
    Replay {
        /// Ritual ID
        ritual_id: String,
        /// Subject ID
        subject_id: String,
        /// Index of the completed task
        task_index: usize,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RitualEngine::open()?;
    match action {
        TaskAction::Current { subject_id } => {
            let current = engine.rituals().current_task(&subject_id)?;
            print_json(&current)?;
        }
        TaskAction::Complete {
            ritual_id,
            subject_id,
            task_index,
            text,
            photo,
        } => {
            let evidence = match (text, photo) {
                (Some(content), None) => Evidence::Text { content },
                (None, Some(content)) => Evidence::Photo { content },
                _ => return Err("exactly one of --text or --photo is required".into()),
            };
            let outcome = engine
                .progression()
                .complete_task(&ritual_id, &subject_id, task_index, evidence)?;
            print_json(&outcome)?;
        }
        TaskAction::Replay {
            ritual_id,
            subject_id,
            task_index,
        } => {
            let outcome = engine
                .progression()
                .replay_completion(&ritual_id, &subject_id, task_index)?;
            print_json(&outcome)?;
        }
    }
    Ok(())
}
