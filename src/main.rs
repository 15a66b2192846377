//! Production dashboard API.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────────┐
//!                        │                    DASHBOARD API                     │
//!                        │                                                      │
//!   Client Request       │  ┌────────────┐   ┌────────────┐   ┌──────────────┐  │
//!   ─────────────────────┼─▶│ rate limit │──▶│  handlers  │──▶│ cache-aside  │──┼──▶ cache store
//!                        │  │ (buckets)  │   │   (api)    │   └──────┬───────┘  │
//!                        │  └─────┬──────┘   └─────┬──────┘          │ miss     │
//!                        │        │                │ writes          ▼          │
//!                        │        ▼                │          ┌──────────────┐  │
//!                        │  ratelimit store        └─────────▶│   breakers   │──┼──▶ relational /
//!                        │                                    │  (guarded)   │  │    document stores
//!                        │                                    └──────────────┘  │
//!                        │                                                      │
//!                        │  config · observability · lifecycle                  │
//!                        └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;

use dashboard_api::api::seed;
use dashboard_api::config::load_config;
use dashboard_api::lifecycle::{build_state, signals, BackingStores, CounterStores, Shutdown};
use dashboard_api::observability::{logging, metrics};
use dashboard_api::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "dashboard-api", version, about = "Production dashboard API")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "DASHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);

    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        store_backend = ?config.store.backend,
        request_timeout_secs = config.timeouts.request_secs,
        "dashboard-api v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let counters = CounterStores::connect(&config.store).await?;
    let state = build_state(&config, counters, BackingStores::in_memory());

    if config.seed.on_startup {
        let report = seed::seed_stores(&state, config.seed.rng_seed).await?;
        tracing::info!(lots = report.lot_count, "Demo dataset loaded at startup");
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(state, Duration::from_secs(config.timeouts.request_secs));
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
