//! Smart-meter gateway with embedded voltwatch analytics.
//!
//! This binary polls a meter gateway for three-phase voltage readings (or
//! synthesizes them with the built-in simulator), feeds them through the
//! voltwatch pipeline, and serves the analysis over HTTP.

mod api;
mod poller;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use clap::Parser;
use tokio::sync::watch;
use voltwatch::store::StateStore;
use voltwatch::Thresholds;

use crate::poller::{MeterClient, ReadingSource, Simulator};

/// voltwatch-gateway — Meter poller and supply-quality API.
#[derive(Parser)]
#[command(name = "voltwatch-gateway", version, about)]
struct Cli {
    /// URL of the meter gateway endpoint returning `{"l1","l2","l3"}` volts.
    /// When omitted, a deterministic simulator produces the readings.
    #[arg(long)]
    meter_url: Option<String>,

    /// Address for the HTTP API.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Seconds between meter polls. Also used to convert out-of-envelope
    /// sample counts into seconds for window compliance.
    #[arg(long, default_value = "10")]
    poll_interval: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("gateway failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    #[allow(clippy::cast_possible_wrap)] // clap-bounded small value
    let thresholds = Thresholds::default().with_poll_interval(cli.poll_interval as i64);
    let store = Arc::new(Mutex::new(StateStore::new(thresholds)));

    let source = match cli.meter_url {
        Some(url) => {
            tracing::info!(%url, "polling meter gateway");
            ReadingSource::Meter(MeterClient::new(url)?)
        }
        None => {
            tracing::info!("no meter configured; using simulated readings");
            ReadingSource::Simulated(Simulator::new())
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(poller::run(
        Arc::clone(&store),
        source,
        std::time::Duration::from_secs(cli.poll_interval.max(1)),
        shutdown_rx,
    ));

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    tracing::info!(listen = %cli.listen, "serving voltage API");

    axum::serve(listener, api::router(api::AppState::new(Arc::clone(&store))))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the poller, then preserve the partially filled window.
    let _ = shutdown_tx.send(true);
    let _ = poller.await;

    let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(window) = store.flush_window() {
        tracing::info!(
            window_start = window.window_start,
            samples = window.sample_count,
            "flushed open window on shutdown"
        );
    }

    tracing::info!("gateway exited cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
    }
}
