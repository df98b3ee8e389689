//! Health probe binary.
//!
//! Connects to the configured store through the access layer, runs a
//! health check and prints the JSON report. Exits non-zero when the target
//! is unhealthy, so the binary slots directly into liveness/readiness
//! probes and cron-driven monitoring.

use clap::Parser;
use db_access_layer::Config;
use db_access_layer::db::{DbService, HealthStatus};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!(
        "Starting database access probe v{}",
        env!("CARGO_PKG_VERSION")
    );

    let service = match DbService::connect(&config) {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "Invalid database configuration");
            return Err(e.into());
        }
    };

    let report = service.health_check().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    match report.status {
        HealthStatus::Healthy => {
            info!(latency_ms = report.latency_ms, "Target healthy");
            Ok(())
        }
        HealthStatus::Unhealthy => {
            error!(latency_ms = report.latency_ms, "Target unhealthy");
            std::process::exit(1);
        }
    }
}
