use clap::Subcommand;
use ritualware_core::RitualEngine;

use super::print_json;

#[derive(Subcommand)]
pub enum NotifyAction {
    /// List unread notifications for a subject
    List {
        /// Subject ID
        subject_id: String,
    },
    /// Mark a notification as read
    Read {
        /// Notification ID
        id: String,
    },
}

pub fn run(action: NotifyAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RitualEngine::open()?;
    match action {
        NotifyAction::List { subject_id } => {
            let pending = engine.notifications().pending(&subject_id)?;
            print_json(&pending)?;
        }
        NotifyAction::Read { id } => {
            let notification = engine.notifications().mark_read(&id)?;
            print_json(&notification)?;
        }
    }
    Ok(())
}
