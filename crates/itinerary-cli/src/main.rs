mod backend;
mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use itinerary_config::ConfigLoader;
use itinerary_migrate::Migrator;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::backend::Backend;
use crate::cli::{Cli, Command, LogFormat};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = ConfigLoader::load(cli.config.as_deref()).context("failed to load config")?;
    cli.command.run_args().apply(&mut config);

    let url = config
        .database_url
        .as_deref()
        .context("no database url: pass --database-url, set DATABASE_URL or database_url in the config file")?;
    let backend = Backend::parse(url)?;
    let migrator = Migrator::from_config(&config.migrations)?;
    let mut db = backend
        .connect(config.migrations.sqlite_lease())
        .context("failed to connect to database")?;

    match cli.command {
        Command::Migrate(_) => {
            let report = migrator.migrate(&mut *db)?;
            info!(
                "database at version {} ({} applied)",
                report.to_version,
                report.applied.len()
            );
        }
        Command::Current(_) => {
            let version = migrator.current_version(&mut *db)?;
            println!("{version}");
        }
    }
    Ok(())
}

// Logs go to stderr so `current` output stays machine-readable.
fn init_tracing(format: LogFormat, verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
