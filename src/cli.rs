use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{schema, Database};
use crate::pipeline;

#[derive(Parser, Debug)]
#[command(version, about = "Monthly solar generation forecasting", long_about = None)]
pub struct Args {
    /// TOML configuration file; missing files fall back to defaults.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Create the tables and seed the location list
    InitDb,
    /// Train the per-location forests, persist predictions and importances
    Train,
    /// Train the weather-only baseline and persist its importances
    WeatherOnly,
}

pub async fn run(args: Args) -> Result<()> {
    debug!(config = %args.config.display(), command = ?args.command, "Parsed arguments");

    let config = Config::load(&args.config)?;
    let db = Database::new(&config.database).await?;

    let result = match args.command {
        Command::InitDb => schema::initialize(db.pool()).await,
        Command::Train => pipeline::run_training(&db, &config).await.map(|report| {
            info!(run_id = %report.run_id, test_size = report.test_size, "Predictions saved");
        }),
        Command::WeatherOnly => pipeline::run_weather_only(&db, &config).await.map(|outcome| {
            info!(test_size = outcome.split.test_size, "Weather-only importances saved");
        }),
    };

    db.close().await;
    result
}
