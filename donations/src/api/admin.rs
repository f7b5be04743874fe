use super::AppState;
use crate::errors::RelayError;
use crate::sanitize::{DEFAULT_TEXT_LIMIT, MESSAGE_LIMIT, sanitize_text};
use crate::tenants::{DisplayOverride, Tenant};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_QUEUE_SIZE_LIMIT: usize = 1000;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateTenant {
    name: String,
    max_queue_size: Option<usize>,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, RelayError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| RelayError::BadRequest(e.body_text()))
}

pub(super) async fn create_tenant(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateTenant>, JsonRejection>,
) -> Result<(StatusCode, Json<Tenant>), RelayError> {
    state.require_master(&headers)?;
    let request = json_body(payload)?;

    let name = sanitize_text(Some(&Value::String(request.name)), DEFAULT_TEXT_LIMIT);
    if name.is_empty() {
        return Err(RelayError::BadRequest("name must not be empty".into()));
    }
    let size_ok = request
        .max_queue_size
        .is_none_or(|size| (1..=MAX_QUEUE_SIZE_LIMIT).contains(&size));
    if !size_ok {
        return Err(RelayError::BadRequest(format!(
            "maxQueueSize must be between 1 and {MAX_QUEUE_SIZE_LIMIT}"
        )));
    }

    let tenant = Tenant::generate(&name, request.max_queue_size);
    state.tenants.insert(tenant.clone())?;
    state.store.init_tenant(&tenant.key);

    tracing::info!(tenant = %tenant.key, name = %tenant.name, "Registered tenant");
    Ok((StatusCode::CREATED, Json(tenant)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TenantSummary {
    #[serde(flatten)]
    tenant: Tenant,
    has_active: bool,
    queue_size: usize,
}

pub(super) async fn list_tenants(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<TenantSummary>>, RelayError> {
    state.require_master(&headers)?;
    let summaries = state
        .tenants
        .list()?
        .into_iter()
        .map(|tenant| {
            let queue_size = state
                .store
                .snapshot(&tenant.key)
                .map(|s| s.queue_size)
                .unwrap_or(0);
            TenantSummary {
                has_active: state.store.has_active(&tenant.key),
                queue_size,
                tenant,
            }
        })
        .collect();
    Ok(Json(summaries))
}

#[derive(Serialize)]
pub(super) struct Deleted {
    success: bool,
}

pub(super) async fn delete_tenant(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Deleted>, RelayError> {
    state.require_master(&headers)?;
    if !state.tenants.remove(&key)? {
        return Err(RelayError::TenantNotFound);
    }
    let had_state = state.store.remove_tenant(&key);

    tracing::info!(tenant = %key, had_state, "Deleted tenant");
    Ok(Json(Deleted { success: true }))
}

/// Body is the override object, or `null` to remove it.
pub(super) async fn set_override(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Option<DisplayOverride>>, JsonRejection>,
) -> Result<Json<Tenant>, RelayError> {
    state.require_master(&headers)?;
    let display_override = json_body(payload)?.map(|o| DisplayOverride {
        enabled: o.enabled,
        donor_name: sanitize_text(Some(&Value::String(o.donor_name)), DEFAULT_TEXT_LIMIT),
        message: sanitize_text(Some(&Value::String(o.message)), MESSAGE_LIMIT),
    });

    let tenant = state
        .tenants
        .set_override(&key, display_override)?
        .ok_or(RelayError::TenantNotFound)?;

    tracing::info!(
        tenant = %tenant.key,
        enabled = tenant.active_override().is_some(),
        "Updated display override"
    );
    Ok(Json(tenant))
}
