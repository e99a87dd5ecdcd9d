use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use truck_violation::certificate::CertificateWriter;
use truck_violation::config::Config;
use truck_violation::db::Store;
use truck_violation::notify::{LogMailer, spawn_worker};
use truck_violation::scheduler::spawn_unblock_sweep;
use truck_violation::service::ViolationService;
use truck_violation::truck_service::TruckService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = Config::load()?;
    let store = Arc::new(
        Store::open(&config.db_path)
            .with_context(|| format!("failed to open store at {}", config.db_path.display()))?,
    );
    info!(path = %config.db_path.display(), "store opened");

    let mailer = Arc::new(LogMailer::new(&config.certificate_dir));
    let (notifier, mail_worker) = spawn_worker(config.mail_queue_capacity, mailer);

    // owns the notifier; the mail worker stops once it is dropped
    let violations = ViolationService::new(
        Arc::clone(&store),
        Arc::new(CertificateWriter::new(&config.certificate_dir)),
        config.store_timeout,
    )
    .with_notifier(notifier);

    let trucks = Arc::new(TruckService::new(Arc::clone(&store), config.store_timeout));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = spawn_unblock_sweep(trucks, config.unblock_interval, shutdown_rx);

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");

    shutdown_tx.send(true).ok();
    sweep.await.context("unblock sweep panicked")?;
    drop(violations);
    mail_worker.await.context("notification worker panicked")?;

    store.flush()?;
    info!("store flushed");
    Ok(())
}
