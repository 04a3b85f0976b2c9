// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator API handlers. Guarded by [`super::auth::auth_layer`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::credential::CredentialSummary;
use crate::state::AppState;
use crate::tenant::TenantId;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct TenantsResponse {
    pub tenants: Vec<CredentialSummary>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/tenants`
pub async fn list_tenants(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.store.summaries().await {
        Ok(tenants) => Json(TenantsResponse { tenants }).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `POST /api/v1/tenants/{id}/provision`
pub async fn provision_tenant(
    State(s): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let tenant = match TenantId::new(id) {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };
    let report = s.provisioner.provision(&tenant).await;
    for failure in report.failures() {
        tracing::warn!(tenant = %tenant, err = %failure, "provisioning incomplete");
    }
    Json(report).into_response()
}

/// `POST /api/v1/sweep`
pub async fn sweep(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.scheduler.sweep().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => e.into_response(),
    }
}
