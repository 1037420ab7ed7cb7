// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod config;
mod orchestrator;

use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use energy_import_ha::{BatchSource, HomeAssistantClient};
use energy_import_store::StatisticsStore;

#[derive(Parser)]
#[command(name = "energy-importer")]
#[command(about = "Merge historic energy readings into Home Assistant statistics", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "./config/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with env filter support
    // Respects RUST_LOG environment variable
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = config::ImporterConfig::from_file(&cli.config)?;

    info!("🚀 Starting historic energy import");
    info!("📋 Configuration Summary:");
    info!("   Database: {}", config.database.path);
    info!("   Home Assistant: {}", config.home_assistant.url);
    info!("   Sensors: {}", config.sensors.len());
    for sensor in &config.sensors {
        info!(
            "     - {} ({:?}/{:?}, cost tracking: {})",
            sensor.sensor_name,
            sensor.kind,
            sensor.series_type,
            sensor.cost.is_some()
        );
    }

    let store = StatisticsStore::open(&config.database.path)?;
    store.ping()?;
    store.ensure_schema()?;

    let ha = HomeAssistantClient::new(
        config.home_assistant.url.as_str(),
        config.home_assistant.api_token.as_str(),
    )?;
    if !ha.ping().await? {
        warn!("Home Assistant API did not answer the health check; recorder control may fail");
    }
    let source = BatchSource::new()?;

    let summary = orchestrator::run_import(&config.sensors, &store, &ha, &source).await;
    info!(
        "Import finished: {} sensors succeeded, {} failed",
        summary.succeeded, summary.failed
    );

    if summary.failed > 0 {
        bail!(
            "{} of {} sensors failed to import",
            summary.failed,
            config.sensors.len()
        );
    }
    Ok(())
}
