//! Public HTTP surface: webhook intake, poller endpoints, admin and stats.

mod admin;
mod donation;
mod system;

use crate::auth;
use crate::errors::RelayError;
use crate::metrics_defs::REQUEST_DURATION;
use crate::rate_limit::RateLimiter;
use crate::store::DonationStore;
use crate::tenants::{Tenant, TenantStore};
use axum::{
    Router,
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
};
use shared::histogram;
use std::sync::Arc;
use std::time::Instant;

pub struct ApiSettings {
    pub master_key: Option<String>,
    pub default_max_queue_size: usize,
    pub body_limit_bytes: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DonationStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub limiter: Arc<RateLimiter>,
    pub settings: Arc<ApiSettings>,
    pub started_at: Instant,
}

impl AppState {
    /// Looks up a registered tenant; unknown keys are `USER_NOT_FOUND`.
    fn tenant(&self, key: &str) -> Result<Tenant, RelayError> {
        self.tenants.get(key)?.ok_or(RelayError::TenantNotFound)
    }

    fn authorized_tenant(&self, key: &str, headers: &HeaderMap) -> Result<Tenant, RelayError> {
        let tenant = self.tenant(key)?;
        auth::require_tenant(headers, &tenant.api_key)?;
        Ok(tenant)
    }

    fn require_master(&self, headers: &HeaderMap) -> Result<(), RelayError> {
        auth::require_master(headers, self.settings.master_key.as_deref())
    }

    fn queue_limit(&self, tenant: &Tenant) -> usize {
        tenant.queue_limit(self.settings.default_max_queue_size)
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.body_limit_bytes;

    Router::new()
        .route("/donation/{key}/webhook", post(donation::webhook))
        .route("/donation/{key}/data", get(donation::data))
        .route("/donation/{key}/clear", delete(donation::clear))
        .route("/donation/{key}/status", get(donation::status))
        .route("/donation/{key}/force-clear", post(donation::force_clear))
        .route("/donation/{key}/test/{platform}", post(donation::test_platform))
        .route("/donation/{key}/debug", post(donation::debug))
        .route(
            "/admin/tenants",
            post(admin::create_tenant).get(admin::list_tenants),
        )
        .route("/admin/tenants/{key}", delete(admin::delete_tenant))
        .route("/admin/tenants/{key}/override", put(admin::set_override))
        .route("/stats", get(system::stats))
        .route("/health", get(system::health))
        .route_layer(middleware::from_fn(record_duration))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn record_duration(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let handler = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(request).await;

    histogram!(
        REQUEST_DURATION,
        "handler" => handler,
        "status" => response.status().as_u16().to_string()
    )
    .record(started.elapsed().as_secs_f64());
    response
}
