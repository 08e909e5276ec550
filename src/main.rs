use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use payment_sentinel::config::Config;
use payment_sentinel::control::ControlLoop;
use payment_sentinel::exporter::SnapshotExporter;
use payment_sentinel::memory::ConfidenceStore;
use payment_sentinel::routing::RoutingSurface;
use payment_sentinel::simulator::PaymentSimulator;
use payment_sentinel::window::WindowedAggregator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(?config, "payment sentinel starting");

    let routing = Arc::new(RoutingSurface::new());
    // A previous process may have died mid-mitigation; start from full health.
    routing.reset_all();

    let aggregator = Arc::new(WindowedAggregator::new(Duration::from_secs(
        config.window_seconds,
    )));
    let memory = ConfidenceStore::load(&config.memory_file);
    let exporter = SnapshotExporter::new(&config.metrics_export_file, &config.decisions_export_file);

    let (tx, mut rx) = mpsc::channel(config.event_channel_capacity);

    if config.simulator_enabled {
        let simulator = Arc::new(PaymentSimulator::new(routing.clone()));

        if let Some(outage) = config.demo_outage.clone() {
            let simulator = simulator.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(outage.delay_seconds)).await;
                simulator.set_outage(outage.route(), outage.severity);
            });
        }

        tokio::spawn(simulator.run(tx, config.events_per_sec));
    } else {
        // No producer wired up; the control loop still runs on an empty
        // window and the ingest task exits once the sender drops here.
        drop(tx);
    }

    let ingest_aggregator = aggregator.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            ingest_aggregator.ingest(event);
        }
    });

    info!("collecting payments");
    ControlLoop::new(aggregator, routing, memory, exporter, &config)
        .run()
        .await;

    Ok(())
}
