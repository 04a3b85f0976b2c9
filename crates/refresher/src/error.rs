// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Errors surfaced by the credential lifecycle.
///
/// Request-path failures (`StateMismatch`, `ExchangeFailed`,
/// `IdentityResolutionFailed`) abort the login attempt. Background failures
/// (`ProvisioningStepFailed`, `RefreshFailed`) are isolated to one tenant and
/// logged by the caller.
#[derive(Debug, thiserror::Error)]
pub enum RefresherError {
    #[error("anti-forgery state mismatch")]
    StateMismatch,
    #[error("code exchange failed: {0}")]
    ExchangeFailed(String),
    #[error("identity resolution failed: {0}")]
    IdentityResolutionFailed(String),
    #[error("provisioning step {step} failed: {reason}")]
    ProvisioningStepFailed { step: &'static str, reason: String },
    #[error("credential store: {0}")]
    StorePersistFailed(String),
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
}

impl RefresherError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::StateMismatch => 400,
            Self::ExchangeFailed(_) => 502,
            Self::IdentityResolutionFailed(_) => 502,
            Self::ProvisioningStepFailed { .. } => 500,
            Self::StorePersistFailed(_) => 500,
            Self::RefreshFailed(_) => 502,
            Self::NotFound(_) => 404,
            Self::Unauthorized => 401,
            Self::BadRequest(_) => 400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StateMismatch => "STATE_MISMATCH",
            Self::ExchangeFailed(_) => "EXCHANGE_FAILED",
            Self::IdentityResolutionFailed(_) => "IDENTITY_RESOLUTION_FAILED",
            Self::ProvisioningStepFailed { .. } => "PROVISIONING_STEP_FAILED",
            Self::StorePersistFailed(_) => "STORE_PERSIST_FAILED",
            Self::RefreshFailed(_) => "REFRESH_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest(_) => "BAD_REQUEST",
        }
    }

    /// True for failures that end an interactive login attempt.
    pub fn is_login_failure(&self) -> bool {
        matches!(
            self,
            Self::StateMismatch | Self::ExchangeFailed(_) | Self::IdentityResolutionFailed(_)
        )
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: self.to_string() }
    }

    pub fn to_http_response(&self) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body() };
        (status, Json(body))
    }
}

impl axum::response::IntoResponse for RefresherError {
    fn into_response(self) -> axum::response::Response {
        self.to_http_response().into_response()
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
