use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "ritualware-cli", version, about = "Ritualware CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Token accounts
    Account {
        #[command(subcommand)]
        action: commands::account::AccountAction,
    },
    /// Transfers between subjects
    Ledger {
        #[command(subcommand)]
        action: commands::ledger::LedgerAction,
    },
    /// Ritual definitions and condition previews
    Ritual {
        #[command(subcommand)]
        action: commands::ritual::RitualAction,
    },
    /// Task progression
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Mood logging
    Mood {
        #[command(subcommand)]
        action: commands::mood::MoodAction,
    },
    /// Streak reports
    Streak {
        #[command(subcommand)]
        action: commands::streak::StreakAction,
    },
    /// Pending notifications
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Account { action } => commands::account::run(action),
        Commands::Ledger { action } => commands::ledger::run(action),
        Commands::Ritual { action } => commands::ritual::run(action),
        Commands::Task { action } => commands::task::run(action),
        Commands::Mood { action } => commands::mood::run(action),
        Commands::Streak { action } => commands::streak::run(action),
        Commands::Notify { action } => commands::notify::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
