use super::AppState;
use crate::admission::{self, AdmissionOutcome};
use crate::errors::RelayError;
use crate::platform::{Donation, Platform, Unwrapped, classify_value, samples, unwrap_envelope};
use crate::store::{ForceCleared, TenantSnapshot, TenantState};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(super) struct AdmitResponse {
    success: bool,
    queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_position: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    donation: Option<Donation>,
}

impl From<AdmissionOutcome> for AdmitResponse {
    fn from(outcome: AdmissionOutcome) -> Self {
        let base = AdmitResponse {
            success: true,
            ..Default::default()
        };
        match outcome {
            AdmissionOutcome::Empty => base,
            AdmissionOutcome::Duplicate(donation) => AdmitResponse {
                duplicate: true,
                donation: Some(donation),
                ..base
            },
            AdmissionOutcome::Activated(donation) => AdmitResponse {
                donation: Some(donation),
                ..base
            },
            AdmissionOutcome::Queued { donation, position } => AdmitResponse {
                queued: true,
                queue_position: Some(position),
                donation: Some(donation),
                ..base
            },
        }
    }
}

impl AdmitResponse {
    /// Webhook senders only get the admission result, not the parsed record.
    fn without_donation(self) -> Self {
        AdmitResponse {
            donation: None,
            ..self
        }
    }
}

fn parse_body(body: &Bytes) -> Result<Value, RelayError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::info!(error = %e, "Webhook body is not valid JSON");
        RelayError::UnrecognizedPayload
    })
}

pub(super) async fn webhook(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<AdmitResponse>, RelayError> {
    let tenant = state.tenant(&key)?;
    if !state.limiter.check(&tenant.key, Instant::now()) {
        tracing::warn!(tenant = %tenant.key, "Webhook rate limited");
        return Err(RelayError::RateLimited);
    }

    let payload = parse_body(&body)?;
    tracing::debug!(tenant = %tenant.key, bytes = body.len(), "Webhook received");

    let outcome = admission::admit(&state.store, &tenant.key, payload, state.queue_limit(&tenant))?;
    Ok(Json(AdmitResponse::from(outcome).without_donation()))
}

pub(super) async fn data(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, RelayError> {
    let tenant = state.authorized_tenant(&key, &headers)?;
    let Some(active) = state.store.get_active(&tenant.key) else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let donation = match tenant.active_override() {
        Some(display_override) => {
            tracing::debug!(
                tenant = %tenant.key,
                donor = %display_override.donor_name,
                "Display override applied"
            );
            active.with_display(&display_override.donor_name, &display_override.message)
        }
        None => active,
    };
    tracing::info!(
        tenant = %tenant.key,
        donor = %donation.display_name(),
        amount = donation.amount,
        "Sending active donation"
    );
    Ok(Json(donation).into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ClearResponse {
    success: bool,
    promoted: bool,
    queue_size: usize,
}

pub(super) async fn clear(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ClearResponse>, RelayError> {
    let tenant = state.authorized_tenant(&key, &headers)?;
    let outcome = state
        .store
        .clear_and_promote(&tenant.key)
        .ok_or(RelayError::NoDonation)?;

    tracing::info!(
        tenant = %tenant.key,
        donor = %outcome.cleared.display_name(),
        promoted = outcome.promoted,
        queue_size = outcome.queue_size,
        "Cleared active donation"
    );
    Ok(Json(ClearResponse {
        success: true,
        promoted: outcome.promoted,
        queue_size: outcome.queue_size,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StatusResponse {
    has_active: bool,
    queue_limit: usize,
    override_enabled: bool,
    #[serde(flatten)]
    snapshot: TenantSnapshot,
}

pub(super) async fn status(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, RelayError> {
    let tenant = state.authorized_tenant(&key, &headers)?;
    let snapshot = state
        .store
        .snapshot(&tenant.key)
        .unwrap_or_else(|| TenantState::default().snapshot(Instant::now()));

    Ok(Json(StatusResponse {
        has_active: snapshot.active.is_some(),
        queue_limit: state.queue_limit(&tenant),
        override_enabled: tenant.active_override().is_some(),
        snapshot,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ForceClearResponse {
    success: bool,
    #[serde(flatten)]
    cleared: ForceCleared,
}

pub(super) async fn force_clear(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ForceClearResponse>, RelayError> {
    let tenant = state.authorized_tenant(&key, &headers)?;
    let cleared = state.store.force_clear(&tenant.key);
    tracing::warn!(
        tenant = %tenant.key,
        cleared_active = cleared.cleared_active,
        dropped = cleared.dropped,
        "Force cleared tenant"
    );
    Ok(Json(ForceClearResponse {
        success: true,
        cleared,
    }))
}

pub(super) async fn test_platform(
    State(state): State<AppState>,
    Path((key, platform)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<AdmitResponse>, RelayError> {
    let tenant = state.authorized_tenant(&key, &headers)?;
    let platform = Platform::from_name(&platform).ok_or(RelayError::InvalidPlatform(platform))?;

    tracing::info!(tenant = %tenant.key, %platform, "Creating test donation");
    let outcome = admission::admit(
        &state.store,
        &tenant.key,
        samples::sample_payload(platform),
        state.queue_limit(&tenant),
    )?;
    Ok(Json(outcome.into()))
}

#[derive(Serialize)]
pub(super) struct DebugResponse {
    received: Value,
    parsed: Option<Donation>,
    rule: Option<&'static str>,
    valid: bool,
}

pub(super) async fn debug(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DebugResponse>, RelayError> {
    let tenant = state.authorized_tenant(&key, &headers)?;
    let received = serde_json::from_slice::<Value>(&body)
        .map_err(|e| RelayError::BadRequest(format!("body is not valid JSON: {e}")))?;
    tracing::info!(tenant = %tenant.key, body = %received, "Debug webhook");

    let classification = match unwrap_envelope(received.clone()) {
        Unwrapped::Payload(payload) => classify_value(&payload),
        Unwrapped::Empty => None,
    };
    let (parsed, rule) = match classification {
        Some(c) => (Some(c.donation), Some(c.rule)),
        None => (None, None),
    };

    Ok(Json(DebugResponse {
        received,
        valid: parsed.is_some(),
        parsed,
        rule,
    }))
}
