// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted OAuth provider, component
//! builders, and assertion helpers.
//!
//! The mock provider's behaviour is keyed on the values it receives, so tests
//! choose an outcome by choosing a code or refresh token:
//!
//! | input                         | response                                   |
//! |-------------------------------|--------------------------------------------|
//! | code `bad*`                   | 400 `invalid_grant`                        |
//! | code `X`                      | access `access-X`, refresh `refresh-X`     |
//! | bearer `access-broken*`       | identity 500                               |
//! | bearer `access-noid*`         | identity without `id`                      |
//! | bearer `access-X`             | identity `{"id": X}`                       |
//! | refresh `fail*`               | 400 `invalid_grant`                        |
//! | refresh `slow*`               | answers after [`SLOW_RESPONSE`]            |
//! | refresh `same:A`              | access `A`, no refresh token               |
//! | refresh `keep*`               | access `fresh-<n>-keep*`, no refresh token |
//! | refresh `R`                   | access `fresh-<n>-R`, refresh `rotated-R`  |

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::cluster::memory::MemoryCluster;
use crate::cluster::ResourceClient;
use crate::credential::CredentialStore;
use crate::oauth::client::{build_http_client, OAuthClient};
use crate::oauth::exchanger::OAuthExchanger;
use crate::oauth::session::SessionStore;
use crate::oauth::ProviderConfig;
use crate::provision::{ProvisionerConfig, TenantProvisioner};
use crate::scheduler::RefreshScheduler;
use crate::tenant::Naming;

/// Delay applied to `slow*` refresh tokens.
pub const SLOW_RESPONSE: Duration = Duration::from_secs(3);

pub const TEST_SECRET_NAME: &str = "spotify-oauth";
pub const TEST_MANAGED_VALUE: &str = "spotify";

#[derive(Default)]
struct Counters {
    token_calls: AtomicUsize,
    identity_calls: AtomicUsize,
}

/// In-process OAuth provider bound to an ephemeral port.
pub struct MockProvider {
    pub base_url: String,
    counters: Arc<Counters>,
}

impl MockProvider {
    pub async fn start() -> anyhow::Result<Self> {
        let counters = Arc::new(Counters::default());
        let app = Router::new()
            .route("/authorize", get(|| async { "authorize" }))
            .route("/api/token", post(token_handler))
            .route("/v1/me", get(identity_handler))
            .with_state(Arc::clone(&counters));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { base_url: format!("http://{addr}"), counters })
    }

    pub fn token_calls(&self) -> usize {
        self.counters.token_calls.load(Ordering::Relaxed)
    }

    pub fn identity_calls(&self) -> usize {
        self.counters.identity_calls.load(Ordering::Relaxed)
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            client_id: "test-client".to_owned(),
            client_secret: "test-secret".to_owned(),
            authorize_url: format!("{}/authorize", self.base_url),
            token_url: format!("{}/api/token", self.base_url),
            identity_url: format!("{}/v1/me", self.base_url),
            redirect_uri: "http://localhost:8443/callback".to_owned(),
            scopes: vec!["user-read-private".to_owned(), "user-modify-playback-state".to_owned()],
            show_dialog: true,
        }
    }

    pub fn client(&self) -> anyhow::Result<Arc<OAuthClient>> {
        let http = build_http_client(Duration::from_secs(10))?;
        Ok(Arc::new(OAuthClient::new(self.provider_config(), http)))
    }
}

fn invalid_grant() -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" })))
}

async fn token_handler(
    State(counters): State<Arc<Counters>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let n = counters.token_calls.fetch_add(1, Ordering::Relaxed) + 1;
    let basic = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !basic {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_client" })));
    }

    let field = |key: &str| form.get(key).map(String::as_str).unwrap_or_default();
    match field("grant_type") {
        "authorization_code" => {
            let code = field("code");
            if code.is_empty() || code.starts_with("bad") {
                return invalid_grant();
            }
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": format!("access-{code}"),
                    "refresh_token": format!("refresh-{code}"),
                    "expires_in": 3600,
                    "token_type": "Bearer",
                })),
            )
        }
        "refresh_token" => {
            let rt = field("refresh_token").to_owned();
            if rt.is_empty() || rt.starts_with("fail") {
                return invalid_grant();
            }
            if rt.starts_with("slow") {
                tokio::time::sleep(SLOW_RESPONSE).await;
            }
            let body = if let Some(access) = rt.strip_prefix("same:") {
                json!({ "access_token": access, "expires_in": 3600 })
            } else if rt.starts_with("keep") {
                json!({ "access_token": format!("fresh-{n}-{rt}"), "expires_in": 3600 })
            } else {
                json!({
                    "access_token": format!("fresh-{n}-{rt}"),
                    "refresh_token": format!("rotated-{rt}"),
                    "expires_in": 3600,
                })
            };
            (StatusCode::OK, Json(body))
        }
        _ => (StatusCode::BAD_REQUEST, Json(json!({ "error": "unsupported_grant_type" }))),
    }
}

async fn identity_handler(
    State(counters): State<Arc<Counters>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    counters.identity_calls.fetch_add(1, Ordering::Relaxed);
    let user = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|v| v.strip_prefix("access-"));
    match user {
        None => (StatusCode::UNAUTHORIZED, Json(json!({ "error": "no token" }))),
        Some(u) if u.starts_with("broken") => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "boom" })))
        }
        Some(u) if u.starts_with("noid") => {
            (StatusCode::OK, Json(json!({ "display_name": u })))
        }
        Some(u) => (StatusCode::OK, Json(json!({ "id": u, "display_name": u }))),
    }
}

pub fn test_naming() -> Naming {
    Naming::new("spotify-", "dj-kubelet")
}

pub fn test_store(cluster: Arc<MemoryCluster>) -> CredentialStore {
    let cluster: Arc<dyn ResourceClient> = cluster;
    CredentialStore::new(cluster, test_naming(), TEST_SECRET_NAME, TEST_MANAGED_VALUE)
}

pub fn test_provisioner(cluster: Arc<MemoryCluster>) -> TenantProvisioner {
    let cluster: Arc<dyn ResourceClient> = cluster;
    TenantProvisioner::new(cluster, test_naming(), ProvisionerConfig::default())
}

pub fn test_exchanger(client: Arc<OAuthClient>) -> OAuthExchanger {
    OAuthExchanger::new(client, Arc::new(SessionStore::new(Duration::from_secs(600))))
}

/// Scheduler over `store` and `client` with test-friendly bounds.
pub fn test_scheduler(
    store: Arc<CredentialStore>,
    client: Arc<OAuthClient>,
    tenant_timeout: Duration,
) -> RefreshScheduler {
    RefreshScheduler::new(store, client, Duration::from_secs(600), tenant_timeout, 4)
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
