use crate::admission::AdmissionError;
use crate::store::StoreError;
use crate::tenants::TenantStoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Request-level failure, rendered as `{"error": CODE, "message": text}`.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("payload does not match any known donation platform")]
    UnrecognizedPayload,
    #[error("donation amount must be greater than zero")]
    InvalidAmount,
    #[error("unknown platform: {0}")]
    InvalidPlatform(String),
    #[error("donation queue is full ({limit} pending)")]
    QueueFull { limit: usize },
    #[error("too many webhook deliveries, retry later")]
    RateLimited,
    #[error("unknown donation key")]
    TenantNotFound,
    #[error("no active donation")]
    NoDonation,
    #[error("missing credentials")]
    AuthRequired,
    #[error("invalid credentials")]
    AuthInvalid,
    #[error("admin endpoints are disabled")]
    AdminDisabled,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error")]
    Internal(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::UnrecognizedPayload
            | RelayError::InvalidAmount
            | RelayError::InvalidPlatform(_)
            | RelayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::QueueFull { .. } | RelayError::RateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            RelayError::TenantNotFound | RelayError::NoDonation => StatusCode::NOT_FOUND,
            RelayError::AuthRequired => StatusCode::UNAUTHORIZED,
            RelayError::AuthInvalid | RelayError::AdminDisabled => StatusCode::FORBIDDEN,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::UnrecognizedPayload => "INVALID_DONATION_DATA",
            RelayError::InvalidAmount => "INVALID_AMOUNT",
            RelayError::InvalidPlatform(_) => "INVALID_PLATFORM",
            RelayError::QueueFull { .. } => "QUEUE_FULL",
            RelayError::RateLimited => "RATE_LIMITED",
            RelayError::TenantNotFound => "USER_NOT_FOUND",
            RelayError::NoDonation => "NO_DONATION",
            RelayError::AuthRequired => "AUTH_REQUIRED",
            RelayError::AuthInvalid => "AUTH_INVALID",
            RelayError::AdminDisabled => "ADMIN_DISABLED",
            RelayError::BadRequest(_) => "BAD_REQUEST",
            RelayError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<AdmissionError> for RelayError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::UnrecognizedPayload => RelayError::UnrecognizedPayload,
            AdmissionError::InvalidAmount => RelayError::InvalidAmount,
            AdmissionError::Store(StoreError::QueueFull { limit }) => {
                RelayError::QueueFull { limit }
            }
        }
    }
}

impl From<TenantStoreError> for RelayError {
    fn from(e: TenantStoreError) -> Self {
        RelayError::Internal(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Internal details go to the log, not the client.
        if let RelayError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "Request failed");
        }

        let body = Json(ErrorBody {
            error: self.code(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}
