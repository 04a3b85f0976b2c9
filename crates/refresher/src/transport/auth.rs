// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::RefresherError;
use crate::oauth::session::constant_time_eq;
use crate::state::AppState;

/// Validate a Bearer token from HTTP headers. Open when `expected` is unset.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), RefresherError> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(RefresherError::Unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or(RefresherError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(RefresherError::Unauthorized)
    }
}

/// Whether `path` belongs to the operator API.
pub fn is_admin_path(path: &str) -> bool {
    path == "/api/v1/sweep" || path == "/api/v1/tenants" || path.starts_with("/api/v1/tenants/")
}

/// Axum middleware that enforces Bearer token authentication on the
/// operator API. Browser-facing routes authenticate by session cookie.
pub async fn auth_layer(
    state: State<Arc<AppState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !is_admin_path(req.uri().path()) {
        return next.run(req).await;
    }

    if let Err(e) = validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        return e.into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
