use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use itinerary_config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "itinerary",
    version,
    about = "Apply plain SQL migrations exactly once, safely across concurrent instances"
)]
pub struct Cli {
    /// Config file (TOML or YAML). Defaults to ./itinerary.{toml,yml,yaml} if present.
    #[arg(long, short, global = true, env = "ITINERARY_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG wins if set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply every migration newer than the recorded version
    Migrate(RunArgs),
    /// Print the version recorded in the database
    Current(RunArgs),
}

impl Command {
    pub fn run_args(&self) -> &RunArgs {
        match self {
            Command::Migrate(args) | Command::Current(args) => args,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Overrides for values that may also come from the config file.
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// postgres://..., sqlite://<path> or sqlite::memory:
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Directory containing <id>_<description> scripts
    #[arg(long, env = "ITINERARY_PATH")]
    pub path: Option<PathBuf>,

    /// Advisory lock key; distinct migration sets on one database need distinct ids
    #[arg(long, env = "ITINERARY_LOCK_ID", allow_negative_numbers = true)]
    pub lock_id: Option<i64>,

    #[arg(long, env = "ITINERARY_VERSION_TABLE")]
    pub version_table: Option<String>,

    /// Delay between attempts while another instance holds the lock
    #[arg(long, env = "ITINERARY_RETRY_INTERVAL_MS")]
    pub retry_interval_ms: Option<u64>,
}

impl RunArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }
        if let Some(path) = &self.path {
            config.migrations.path = path.clone();
        }
        if let Some(lock_id) = self.lock_id {
            config.migrations.lock_id = lock_id;
        }
        if let Some(table) = &self.version_table {
            config.migrations.version_table = table.clone();
        }
        if let Some(ms) = self.retry_interval_ms {
            config.migrations.retry_interval_ms = ms;
        }
    }
}
