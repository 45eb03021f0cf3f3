use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_sync::api::router;
use clinic_sync::config::AppConfig;
use clinic_sync::db;
use clinic_sync::remote::{HttpSyncApi, SyncApi};
use clinic_sync::services::{DataSync, SyncScheduler};
use clinic_sync::session::UserSession;
use clinic_sync::state::AppState;
use clinic_sync::sync::model_syncs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "clinic_sync=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config.database_url).await?;

    let session = UserSession::new(config.user.clone());
    if !session.is_logged_in() {
        warn!("no user configured; only open syncs will run");
    }

    let api: Arc<dyn SyncApi> = Arc::new(HttpSyncApi::new(config.remote.clone(), session.clone())?);
    let syncs = model_syncs(pool.clone(), api, config.batch_size);
    let data_sync = Arc::new(DataSync::new(
        pool.clone(),
        syncs,
        session.clone(),
        config.max_parallel_syncs,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let schedulers: Vec<_> = SyncScheduler::for_all_groups(data_sync.clone(), shutdown_rx)
        .into_iter()
        .map(|scheduler| tokio::spawn(scheduler.start()))
        .collect();

    // catch up on anything recorded while the service was down
    data_sync.fire_and_forget_sync();

    let state = AppState {
        db: pool,
        data_sync,
        session,
    };
    let app = router(state);

    info!("listening on http://{}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for scheduler in schedulers {
        let _ = scheduler.await;
    }
    info!("shut down");

    Ok(())
}
