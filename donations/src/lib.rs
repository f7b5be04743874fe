pub mod admission;
pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod janitor;
pub mod metrics_defs;
pub mod platform;
pub mod rate_limit;
pub mod sanitize;
pub mod store;
pub mod tenants;

#[cfg(test)]
mod testutils;

use api::{ApiSettings, AppState};
use config::{Config, TenantStoreConfig, ValidationError};
use janitor::Janitor;
use rate_limit::RateLimiter;
use shared::admin_service::AdminService;
use std::future::IntoFuture;
use std::io;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use store::DonationStore;
use tenants::{FilesystemTenantStore, InMemoryTenantStore, TenantStore, TenantStoreError};
use tokio::sync::watch;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("tenant registry error: {0}")]
    Tenants(#[from] TenantStoreError),
}

fn tenant_store(config: &TenantStoreConfig) -> Arc<dyn TenantStore> {
    match config {
        TenantStoreConfig::Filesystem { path } => Arc::new(FilesystemTenantStore::new(path)),
        TenantStoreConfig::Memory => {
            tracing::warn!("Tenants are kept in memory and will be lost on restart");
            Arc::new(InMemoryTenantStore::new())
        }
    }
}

async fn wait_for_stop(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Runs the relay until interrupted.
pub async fn run(config: Config) -> Result<(), RunError> {
    config.validate()?;

    let tenants = tenant_store(&config.tenants);
    let store = Arc::new(DonationStore::new((&config.dedupe).into()));
    // Fails start-up rather than the first request if the registry is unreadable.
    let registered = tenants.list()?;
    for tenant in &registered {
        store.init_tenant(&tenant.key);
    }
    tracing::info!(tenants = registered.len(), "Loaded tenant registry");

    if config.master_key.is_none() {
        tracing::warn!("No master key configured, admin endpoints are disabled");
    }

    let limiter = Arc::new(RateLimiter::per_minute(config.rate_limit.webhook_per_minute));
    let janitor = Janitor::spawn(store.clone(), limiter.clone(), config.janitor_settings());

    let state = AppState {
        store,
        tenants,
        limiter,
        settings: Arc::new(ApiSettings {
            master_key: config.master_key.clone(),
            default_max_queue_size: config.queue.default_max_size,
            body_limit_bytes: config.body_limit_bytes,
        }),
        started_at: std::time::Instant::now(),
    };

    let listener = shared::http::bind(&config.listener.host, config.listener.port).await?;
    let admin_listener =
        shared::http::bind(&config.admin_listener.host, config.admin_listener.port).await?;
    tracing::info!(
        listener = %format!("{}:{}", config.listener.host, config.listener.port),
        admin_listener = %format!("{}:{}", config.admin_listener.host, config.admin_listener.port),
        "Donation relay started"
    );

    let ready = janitor.running_flag();
    let admin = AdminService::new(move || ready.load(Ordering::Relaxed));

    let (stop_tx, stop_rx) = watch::channel(false);
    let api_task = axum::serve(listener, api::router(state))
        .with_graceful_shutdown(wait_for_stop(stop_rx.clone()))
        .into_future();
    let admin_task = shared::http::run_http_service(admin_listener, admin, wait_for_stop(stop_rx));
    let signal_task = async {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down");
        let _ = stop_tx.send(true);
        Ok::<(), io::Error>(())
    };

    let result = tokio::try_join!(api_task, admin_task, signal_task);
    janitor.shutdown().await;
    result?;
    Ok(())
}
