use driftshare_registry::{ShareRegistry, run_sweep_loop};
use driftshare_server::{app, config::Config, routes::AppState};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "driftshare_server=debug,driftshare_registry=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    let registry = ShareRegistry::new(config.open_store()?);

    // Background sweep of expired shares
    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(run_sweep_loop(
        registry.clone(),
        config.sweep_interval,
        shutdown.clone(),
    ));

    let app = app(AppState { registry });

    let addr = config.addr()?;
    info!("Driftshare registry listening on {}", addr);
    info!(
        "Store: {:?}, sweep every {}s",
        config.store,
        config.sweep_interval.as_secs()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    sweeper.await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
