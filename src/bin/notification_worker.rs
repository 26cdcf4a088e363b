use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use orderflow::{
    config, db,
    notifications::{sender::sender_from_config, DispatchWorker, NotificationEngine},
};
use tokio::sync::watch;
use tracing::info;

/// Standalone notification dispatcher. Several instances may share one
/// database; each task is claimed by exactly one of them.
#[derive(Parser)]
#[command(name = "notification-worker", version, about)]
struct Cli {
    #[arg(long, action = ArgAction::SetTrue, help = "Run a single sweep and exit")]
    once: bool,
    #[arg(long, value_name = "SECS", help = "Sweep interval, overriding configuration")]
    interval: Option<u64>,
    #[arg(long, value_name = "ID", help = "Identity recorded on claimed tasks")]
    worker_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        db::run_migrations(&pool).await?;
    }

    let sender = sender_from_config(&cfg.notifications)?;
    let mut engine = NotificationEngine::new(Arc::new(pool), sender, cfg.notifications.clone());
    if let Some(worker_id) = cli.worker_id {
        engine = engine.with_worker_id(worker_id);
    }

    if cli.once {
        let report = engine.dispatch_due().await?;
        info!(?report, "single sweep finished");
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut worker = DispatchWorker::new(engine);
    if let Some(secs) = cli.interval {
        worker = worker.with_interval(Duration::from_secs(secs.max(1)));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = worker.spawn(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    handle.await.context("dispatch worker panicked")?;
    Ok(())
}
