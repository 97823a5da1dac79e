use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use corpus_jobs::config::AppConfig;
use corpus_jobs::jobs::{Dispatcher, JobRunners, PersistenceStore};
use corpus_jobs::logging;
use corpus_jobs::notification::NotificationService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let (config, config_warning) = AppConfig::load()?;
    let (log_config, _log_guard) = logging::init_logging(&config.logging)?;
    if let Some(message) = config_warning {
        warn!("{message}");
    }

    let cancel = CancellationToken::new();
    log_config.start_retention_cleanup(cancel.child_token());

    let store = PersistenceStore::new(&config.jobs.status_data_path);
    let notifier = Arc::new(NotificationService::with_config(config.notification.clone()));
    let dispatcher = Dispatcher::new(
        config.jobs.clone(),
        store,
        JobRunners::with_builtin(),
        notifier,
    );

    let detached = dispatcher.load_state().await;
    dispatcher.start();
    let resumed = dispatcher.resume_detached_jobs();
    info!(
        detached,
        resumed,
        max_concurrent = dispatcher.max_concurrent(),
        "corpus-jobs started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    cancel.cancel();
    dispatcher.shutdown().await?;
    info!("corpus-jobs stopped");
    Ok(())
}
