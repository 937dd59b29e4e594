//! Ritual definition and condition preview commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use ritualware_core::rules::ExecutionContext;
use ritualware_core::{NewRitual, RitualEngine, Trigger, TriggerKind};
use serde_json::json;

use super::print_json;

#[derive(Subcommand)]
pub enum RitualAction {
    /// Create a ritual from a TOML or JSON definition and assign it
    Create {
        /// Definition file (.toml or .json)
        #[arg(long)]
        file: PathBuf,
    },
    /// Show a ritual
    Show {
        /// Ritual ID
        id: String,
    },
    /// Evaluate a trigger against a ritual and run the matching actions
    Evaluate {
        /// Ritual ID
        ritual_id: String,
        /// Subject the actions apply to
        #[arg(long)]
        subject: String,
        /// Trigger: completion, mood, streak or ritual_completion
        #[arg(long)]
        trigger: String,
        /// Trigger value (task index, mood text or streak length)
        #[arg(long, default_value = "")]
        value: String,
        /// Report the actions without applying them
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(action: RitualAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = RitualEngine::open()?;
    match action {
        RitualAction::Create { file } => {
            let definition = read_definition(&file)?;
            let ritual = engine.rituals().create(definition)?;
            print_json(&ritual)?;
        }
        RitualAction::Show { id } => {
            let ritual = engine.rituals().get(&id)?;
            print_json(&ritual)?;
        }
        RitualAction::Evaluate {
            ritual_id,
            subject,
            trigger,
            value,
            dry_run,
        } => {
            let trigger = parse_trigger(&trigger, &value)?;
            let actions = engine.evaluator().evaluate(&ritual_id, &subject, &trigger)?;
            let executor = if dry_run {
                engine.executor().clone().dry_run()
            } else {
                engine.executor().clone()
            };
            let ctx = ExecutionContext::new(&ritual_id, &subject).triggered_by(trigger.kind.clone());
            let log = executor.execute_batch(&actions, &ctx);
            print_json(&json!({
                "trigger": trigger,
                "actions": actions,
                "log": log,
            }))?;
        }
    }
    Ok(())
}

fn read_definition(path: &Path) -> Result<NewRitual, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(toml::from_str(&content)?)
    }
}

fn parse_trigger(kind: &str, value: &str) -> Result<Trigger, Box<dyn std::error::Error>> {
    match TriggerKind::from(kind.to_string()) {
        TriggerKind::Completion => Ok(Trigger::completion(value.parse()?)),
        TriggerKind::Mood => Ok(Trigger::mood(value)),
        TriggerKind::Streak => Ok(Trigger::streak(value.parse()?)),
        TriggerKind::RitualCompletion => Ok(Trigger::ritual_completion()),
        TriggerKind::Other(raw) => Err(format!("unknown trigger '{raw}'").into()),
    }
}
