use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use deckd::config::DaemonConfig;
use deckd::purge::{JobPurger, PURGE_INTERVAL};
use deckd_bridge::{Bridge, DbTrackLookup};
use deckd_events::EventBus;
use deckd_registry::{JobRegistry, JobSubmitter};
use deckd_stems::{NeverInUse, StemCache};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "deckd=info,deckd_bridge=info,deckd_registry=info,deckd_stems=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = DaemonConfig::from_env()?;
    tracing::info!(
        playback_url = %config.bridge.url,
        stem_cache = %config.stems.root.display(),
        "Loaded daemon configuration",
    );

    // --- Database ---
    let pool = deckd_db::create_pool(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    deckd_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    deckd_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Event bus and registry ---
    let event_bus = Arc::new(EventBus::default());
    let registry = Arc::new(JobRegistry::new(
        pool.clone(),
        Arc::clone(&event_bus),
        config.registry.clone(),
    ));

    // --- Stem cache ---
    let stems = Arc::new(StemCache::new(config.stems.clone(), Arc::new(NeverInUse)));
    stems.init().await.context("Failed to initialise stem cache")?;

    // --- Bridge ---
    // The playback engine runs under its own supervisor; treat it as ready.
    let (_peer_ready_tx, peer_ready) = tokio::sync::watch::channel(true);
    let jobs: Arc<dyn JobSubmitter> = registry.clone();
    let bridge = Arc::new(Bridge::new(
        config.bridge.clone(),
        Arc::new(DbTrackLookup::new(pool.clone())),
        jobs,
        Arc::clone(&stems),
        peer_ready,
    ));
    let notifications_handle = tokio::spawn(Arc::clone(&bridge).run_notifications(event_bus.subscribe()));

    if let Err(e) = bridge.connect().await {
        tracing::warn!(error = %e, "Initial connect failed, retrying in the background");
    }

    // --- Housekeeping ---
    let purge_cancel = CancellationToken::new();
    let purger = JobPurger::new(Arc::clone(&registry), config.job_retention);
    let purge_cancel_clone = purge_cancel.clone();
    let purge_handle = tokio::spawn(async move {
        purger.run(purge_cancel_clone, PURGE_INTERVAL).await;
    });

    tracing::info!("deckd running");
    shutdown_signal().await?;

    // --- Shutdown ---
    bridge.disconnect().await;

    purge_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), purge_handle).await;

    notifications_handle.abort();

    pool.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
    Ok(())
}
