// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-facing handlers: login, callback, and kubeconfig download.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;

use crate::error::RefresherError;
use crate::kubeconfig;
use crate::oauth::session::{SessionStore, SESSION_LIFETIME};
use crate::state::AppState;

/// Name of the cookie carrying the login session id.
pub const SESSION_COOKIE: &str = "refresher_session";

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// -- Cookies ------------------------------------------------------------------

/// Session id from the request's `Cookie` headers, if present.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_owned())
        .filter(|value| !value.is_empty())
}

fn set_cookie(session_id: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_LIFETIME.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

// -- Handlers -----------------------------------------------------------------

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    "ok"
}

/// `GET /login`
///
/// Starts a login: binds a fresh anti-forgery state to the caller's session
/// (creating one if needed) and redirects to the provider.
pub async fn login(State(s): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let session_id = session_cookie(&headers).unwrap_or_else(SessionStore::new_session_id);
    let redirect = s.exchanger.begin_auth(&session_id).await;
    tracing::debug!("login started");
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, redirect.url),
            (header::SET_COOKIE, set_cookie(&session_id, s.config.secure_cookies())),
        ],
    )
}

/// `GET /callback?code&state`
///
/// Completes the login, provisions the tenant, and stores its credential
/// before acknowledging. The session is reissued under a fresh id.
pub async fn callback(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    if let Some(error) = params.error {
        tracing::info!(err = %error, "provider declined authorization");
        return RefresherError::BadRequest(format!("authorization declined: {error}"))
            .into_response();
    }
    let Some(session_id) = session_cookie(&headers) else {
        return RefresherError::StateMismatch.into_response();
    };
    let code = params.code.unwrap_or_default();
    let state = params.state.unwrap_or_default();

    let (tenant, credential) = match s.exchanger.complete_auth(&session_id, &code, &state).await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(err = %e, "login failed");
            return e.into_response();
        }
    };

    let report = s.provisioner.provision(&tenant).await;
    for failure in report.failures() {
        tracing::warn!(tenant = %tenant, err = %failure, "provisioning incomplete");
    }

    if let Err(e) = s.store.put(&credential).await {
        tracing::warn!(tenant = %tenant, err = %e, "storing credential failed");
        return e.into_response();
    }
    let session_id = s.sessions.log_in(&session_id, tenant.clone()).await;

    (
        StatusCode::OK,
        [(header::SET_COOKIE, set_cookie(&session_id, s.config.secure_cookies()))],
        format!("Welcome, {tenant}! Provisioning state: {}.\n", report.state),
    )
        .into_response()
}

/// `GET /api/v1/kubeconfig`
pub async fn download_kubeconfig(
    State(s): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let tenant = match session_cookie(&headers) {
        Some(id) => s.sessions.tenant(&id).await,
        None => None,
    };
    let Some(tenant) = tenant else {
        return RefresherError::Unauthorized.into_response();
    };

    match kubeconfig::for_tenant(
        s.cluster.as_ref(),
        s.provisioner.naming(),
        &tenant,
        &s.config.kubeconfig_server,
    )
    .await
    {
        Ok(config) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/yaml"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"kubeconfig\""),
            ],
            config,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
