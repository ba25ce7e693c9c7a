//! LabPush push worker binary entrypoint.

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use labpush_common::config::{AppConfig, StoreBackend};
use labpush_common::db::{create_pool, run_migrations};
use labpush_common::redis_pool::create_redis_pool;
use labpush_engine::store::{MemoryRecordStore, PgRecordStore, RecordStore, RedisRecordStore};
use labpush_engine::{PushWorker, RetentionSweeper, WorkerSettings};
use labpush_notifier::{build_alert_sink, build_channel};

use labpush_api::routes::create_router;
use labpush_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the log filter and format are read
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Starting LabPush push worker...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Open the processing record store
    let store = open_store(&config).await?;

    // Build collaborators and the worker
    let channel = build_channel(&config)?;
    let alerts = build_alert_sink(&config)?;
    let settings = WorkerSettings {
        max_attempts: config.max_attempts,
        dispatch_timeout: config.dispatch_timeout(),
        claim_liveness: config.claim_liveness(),
    };
    tracing::info!(
        channel = %channel.kind(),
        transport = channel.name(),
        max_attempts = settings.max_attempts,
        dispatch_timeout_ms = config.dispatch_timeout_ms,
        claim_liveness_secs = config.claim_liveness_secs,
        "Worker configured"
    );
    let worker = Arc::new(PushWorker::new(store.clone(), channel, alerts, settings));

    // Background retention sweep
    let sweeper = RetentionSweeper::new(
        store.clone(),
        config.record_retention(),
        config.purge_interval(),
    )?;
    let sweep_task = tokio::spawn(async move { sweeper.run().await });

    // Build router
    let addr = config.listen_addr;
    let state = AppState::new(worker, store.clone(), config);
    let app = create_router(state).layer(TraceLayer::new_for_http());

    // Start server
    tracing::info!("Push endpoint listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweep_task.abort();
    store.close().await;

    tracing::info!("LabPush push worker stopped.");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "labpush_api=info,labpush_engine=info,labpush_notifier=info,labpush=info,tower_http=info",
        )
    });

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?;
            let pool = create_pool(database_url, config.db_max_connections).await?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PgRecordStore::new(pool)))
        }
        StoreBackend::Redis => {
            let redis = create_redis_pool(&config.redis_url).await?;
            Ok(Arc::new(RedisRecordStore::new(redis, config.record_retention())))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory record store; deduplication is per process only");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Received shutdown signal, draining in-flight pushes...");
}
