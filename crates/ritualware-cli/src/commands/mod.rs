pub mod account;
pub mod config;
pub mod ledger;
pub mod mood;
pub mod notify;
pub mod ritual;
pub mod streak;
pub mod task;

use serde::Serialize;

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
