// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: browser login flow and the operator API.

pub mod auth;
pub mod http;
pub mod http_admin;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum `Router` with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/health", get(http::health))
        // Browser login flow (session cookie)
        .route("/login", get(http::login))
        .route("/callback", get(http::callback))
        .route("/api/v1/kubeconfig", get(http::download_kubeconfig))
        // Operator API (bearer token)
        .route("/api/v1/tenants", get(http_admin::list_tenants))
        .route("/api/v1/tenants/{id}/provision", post(http_admin::provision_tenant))
        .route("/api/v1/sweep", post(http_admin::sweep))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
