use anyhow::Result;
use clap::Parser;
use solar_forecast::cli::{self, Args};
use solar_forecast::telemetry::init_tracing;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    if let Err(e) = cli::run(args).await {
        error!("run failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
