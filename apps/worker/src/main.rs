use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collectarr_plex_client::PlexClient;
use collectarr_worker::{jobs, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "collectarr_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    tracing::info!("Starting Collectarr worker");

    let config = Config::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(config.database().max_connections)
        .min_connections(config.database().min_connections)
        .acquire_timeout(Duration::from_secs(config.database().connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database().idle_timeout_secs))
        .connect(config.database_url())
        .await?;

    let redis = redis::Client::open(config.redis().connection_url())?;

    let plex = match config.plex() {
        Some(plex_config) => Some(PlexClient::new(plex_config)?),
        None => {
            tracing::warn!("Plex not configured; collection jobs will fail until it is");
            None
        }
    };

    let state = AppState {
        db,
        redis,
        plex,
        config,
    };

    tracing::info!(
        poll_interval_secs = state.config.poll_interval_secs,
        environment = %state.config.environment(),
        "Worker ready, polling for jobs"
    );

    run_loop(state).await
}

/// Poll the queue until shutdown, draining all queued jobs each tick
async fn run_loop(state: AppState) -> anyhow::Result<()> {
    let poll_interval = Duration::from_secs(state.config.poll_interval_secs.max(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                return Ok(());
            }
            _ = tokio::time::sleep(poll_interval) => {
                drain_queue(&state).await;
            }
        }
    }
}

async fn drain_queue(state: &AppState) {
    loop {
        match jobs::dequeue_job(&state.redis).await {
            Ok(Some(job)) => {
                tracing::info!(job = job.job_id(), "Dequeued job");
                if let Err(e) = jobs::dispatch(state, job).await {
                    e.log();
                }
            }
            Ok(None) => break,
            Err(e) => {
                e.log();
                break;
            }
        }
    }
}
