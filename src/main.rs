use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use dodgeball_server::config::ServerConfig;
use dodgeball_server::host::clock::TokioClock;
use dodgeball_server::host::environment::FlatWorld;
use dodgeball_server::host::persistence::JsonFilePersistence;
use dodgeball_server::host::presentation::ChannelPresentation;
use dodgeball_server::host::Context;
use dodgeball_server::metrics::{self, Metrics};
use dodgeball_server::server::DodgeballServer;

const PRESENTATION_QUEUE: usize = 16_384;
const SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Dodgeball Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: tick_rate={}Hz, max_arenas={}, data_dir={}",
        config.tick_rate,
        config.max_arenas,
        config.data_dir.display()
    );

    // No world client is attached here, so presentation events are logged
    let (presentation, events) = ChannelPresentation::new(PRESENTATION_QUEUE);
    std::thread::spawn(move || {
        for event in events.iter() {
            debug!("{:?}", event);
        }
    });

    let ctx = Context::new(
        Arc::new(presentation),
        Arc::new(JsonFilePersistence::new(config.data_dir.clone())),
        Arc::new(FlatWorld::new(config.floor_y)),
        Arc::new(TokioClock::new(Handle::current(), config.tick_duration())),
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let server = DodgeballServer::new(ctx, config, metrics);
    match server.load_arenas() {
        Ok(0) => info!("No stored arenas; create one through the admin API"),
        Ok(_) => {}
        Err(e) => error!("Failed to load arenas: {}", e),
    }
    server.run();

    let summary_server = server.clone();
    let summary_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SUMMARY_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let summary = summary_server.summary();
            info!(
                "Arenas: {} | Players: {} | Matches: {} running, {} completed | Balls: {}",
                summary.arenas,
                summary.players,
                summary.matches_running,
                summary.matches_completed,
                summary.active_balls
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    summary_task.abort();

    // Cancelling the driver waits for an in-flight tick
    tokio::task::spawn_blocking(move || server.shutdown()).await?;
    info!("Server stopped");

    Ok(())
}
