use crate::errors::RelayError;
use axum::http::{HeaderMap, header::AUTHORIZATION};
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const MASTER_KEY_HEADER: &str = "x-master-key";

/// Tenant credential from `Authorization: Bearer <key>` or `X-Api-Key`.
pub fn tenant_credential(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    bearer
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        })
        .filter(|v| !v.is_empty())
}

pub fn keys_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Checks the tenant credential against `api_key`.
pub fn require_tenant(headers: &HeaderMap, api_key: &str) -> Result<(), RelayError> {
    let provided = tenant_credential(headers).ok_or(RelayError::AuthRequired)?;
    if keys_match(api_key, provided) {
        Ok(())
    } else {
        Err(RelayError::AuthInvalid)
    }
}

/// Checks `X-Master-Key`. Admin access is off when no master key is set.
pub fn require_master(headers: &HeaderMap, master_key: Option<&str>) -> Result<(), RelayError> {
    let expected = master_key.ok_or(RelayError::AdminDisabled)?;
    let provided = headers
        .get(MASTER_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(RelayError::AuthRequired)?;
    if keys_match(expected, provided) {
        Ok(())
    } else {
        Err(RelayError::AuthInvalid)
    }
}
