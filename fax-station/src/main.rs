use anyhow::Context;
use fax_station::{Config, Station, init_logger_with_file};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Missing BROKER_URL / SPOOL_DIR ends the process here, non-zero
    let config = Config::from_env().context("Cannot load configuration")?;

    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Fax station starting");

    Station::new(config).run().await?;

    tracing::info!("Fax station stopped");
    Ok(())
}
