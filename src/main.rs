//! Temp Relay - store-and-forward temperature telemetry agent
//!
//! Samples a set of temperature sensors on a fixed interval, persists every
//! valid reading in an append-only backlog file, and drains the backlog to
//! the remote collector whenever link and session can be acquired.
//!
//! This binary wires the core against the simulated capabilities from
//! [`temp_relay::sim`]; a hardware deployment swaps those for real
//! implementations of the same traits.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `TEMP_RELAY_WIFI_SSID` / `TEMP_RELAY_WIFI_CREDENTIAL`: network credentials (required)
//! - `TEMP_RELAY_BROKER_USERNAME` / `TEMP_RELAY_BROKER_KEY`: broker credentials (required)
//! - `TEMP_RELAY_BROKER_HOST` / `TEMP_RELAY_BROKER_PORT`: broker endpoint
//! - `TEMP_RELAY_FEED_PREFIX`: per-channel feed name prefix
//! - `TEMP_RELAY_DATA_FILE`: backlog file path (default: temps.csv)
//! - `TEMP_RELAY_SAMPLE_INTERVAL_SECS`: measurement interval (default: 60)
//! - `TEMP_RELAY_SIM_CHANNELS`: simulated sensor count (default: 2)
//! - `RUST_LOG`: logging level filter (default: info)

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use temp_relay::config::Config;
use temp_relay::connectivity::Connectivity;
use temp_relay::sampler::Sampler;
use temp_relay::scheduler::Scheduler;
use temp_relay::sim::{SimLink, SimSensorBus, SimSession};
use temp_relay::store::DurableLog;

/// Simulated sensor population when `TEMP_RELAY_SIM_CHANNELS` is unset.
const DEFAULT_SIM_CHANNELS: usize = 2;

/// Publish failure rate of the simulated session, so the backlog path is
/// exercised in a demo run.
const SIM_PUBLISH_FAILURE_RATE: f64 = 0.05;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    info!("Starting temp relay agent...");

    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                broker = %config.broker_host,
                data_file = %config.data_file.display(),
                sample_interval_secs = config.sample_interval.as_secs(),
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    let log = DurableLog::new(config.data_file.clone());
    match log.recover().await {
        Ok(true) => info!("Recovered backlog from staging file"),
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "Backlog recovery failed");
            std::process::exit(1);
        }
    }

    let sim_channels = std::env::var("TEMP_RELAY_SIM_CHANNELS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SIM_CHANNELS);

    let sampler = Sampler::discover(SimSensorBus::new(sim_channels)).await;
    let connectivity = Connectivity::new(
        SimLink::new(),
        SimSession::new(SIM_PUBLISH_FAILURE_RATE),
        &config,
    );

    let mut scheduler = Scheduler::new(sampler, log, connectivity, config.sample_interval);

    tokio::select! {
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received, stopping..."),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    }

    // Every committed record is already on disk; nothing buffered to flush.
    info!(
        stored = scheduler.stats().records_stored,
        delivered = scheduler.stats().records_delivered,
        "Temp relay stopped"
    );
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
