use std::{net::SocketAddr, sync::Arc, time::Duration};

use tandem::{
    common::{logger, types::AnyResult},
    configs::Config,
    room::RoomRegistry,
    server::{AppState, maintenance},
    storage::{self, backup},
    transport,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config_path = Config::locate()?;
    let config = Arc::new(Config::from_file(config_path)?);
    logger::init(config.logging.as_ref());
    info!("Loaded configuration from {}", config_path);

    let store = storage::from_config(&config.storage)?;
    info!("Using {:?} storage backend", config.storage.backend);
    let registry = RoomRegistry::new(config.clone(), store);

    match backup::restore(&registry).await {
        Ok(n) if n > 0 => info!("Restored {} room(s)", n),
        Ok(_) => {}
        Err(e) => warn!("Room restore failed, starting empty: {}", e),
    }
    if let Err(e) = backup::reconcile_orphans(&registry).await {
        warn!("Initial orphan sweep failed: {}", e);
    }

    let cancel = CancellationToken::new();
    let backup_task = maintenance::spawn_backup_loop(
        registry.clone(),
        Duration::from_secs(config.server.backup_interval_secs.max(1)),
        cancel.clone(),
    );
    let sweep_task = maintenance::spawn_orphan_sweep(
        registry.clone(),
        Duration::from_secs(config.server.orphan_sweep_interval_secs.max(1)),
        cancel.clone(),
    );

    let state = Arc::new(AppState::new(config.clone(), registry.clone()));
    if !state.provider.is_enabled() {
        info!("Music provider not configured; search and stream are disabled");
    }
    let app = transport::router(state);

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("tandem listening on {}", address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    info!("Shutting down, writing final snapshot");
    cancel.cancel();
    let _ = tokio::join!(backup_task, sweep_task);
    registry.shutdown();
    maintenance::backup_once(&registry).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
