use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{signal, sync::watch};
use tracing::{error, info};

use orderflow as app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = app::config::load_config().context("failed to load configuration")?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);
    app::handlers::health::init_start_time();

    // Init DB
    let db_pool = app::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        app::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Outbound e-mail and the dispatch engine shared by services and worker
    let sender = app::notifications::sender::sender_from_config(&cfg.notifications)
        .context("failed to build the e-mail sender")?;
    let services = app::handlers::AppServices::new(db_arc.clone(), &cfg, sender);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = app::notifications::DispatchWorker::new(services.notifications.clone())
        .spawn(shutdown_rx);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid listen address")?;
    let app_state = app::AppState::new(db_arc, cfg, services);
    let router = app::api::router(app_state);

    info!("orderflow listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let an in-progress sweep finish before exiting.
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        error!("Dispatch worker terminated abnormally: {}", e);
    }
    info!("orderflow stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
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
