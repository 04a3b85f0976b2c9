// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the refresher HTTP surface.
//!
//! Uses `axum_test::TestServer` against the in-memory cluster and an
//! in-process mock provider.

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use oauth_refresher::cluster::memory::MemoryCluster;
use oauth_refresher::cluster::{Kind, Manifest, ResourceClient};
use oauth_refresher::config::RefresherConfig;
use oauth_refresher::state::AppState;
use oauth_refresher::tenant::TenantId;
use oauth_refresher::test_support::MockProvider;
use oauth_refresher::transport::build_router;
use oauth_refresher::transport::http::SESSION_COOKIE;

struct Harness {
    server: TestServer,
    state: Arc<AppState>,
    cluster: Arc<MemoryCluster>,
    _provider: MockProvider,
}

async fn harness(auth_token: Option<&str>) -> anyhow::Result<Harness> {
    let provider = MockProvider::start().await?;
    let mut config = RefresherConfig::test();
    config.authorize_url = format!("{}/authorize", provider.base_url);
    config.token_url = format!("{}/api/token", provider.base_url);
    config.identity_url = format!("{}/v1/me", provider.base_url);
    config.auth_token = auth_token.map(str::to_owned);

    let cluster = Arc::new(MemoryCluster::new());
    let client: Arc<dyn ResourceClient> = Arc::clone(&cluster) as Arc<dyn ResourceClient>;
    let state = Arc::new(AppState::new(config, client, CancellationToken::new())?);
    let server = TestServer::new(build_router(Arc::clone(&state)))?;
    Ok(Harness { server, state, cluster, _provider: provider })
}

fn header_str(resp: &TestResponse, name: header::HeaderName) -> String {
    resp.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or_default().to_owned()
}

fn cookie(session_id: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{SESSION_COOKIE}={session_id}")).expect("cookie header")
}

/// Session id carried by the response's `Set-Cookie`.
fn issued_session(resp: &TestResponse) -> String {
    let set_cookie = header_str(resp, header::SET_COOKIE);
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix(&format!("{SESSION_COOKIE}=")))
        .expect("session cookie")
        .to_owned()
}

/// Start a login and return `(session_id, state)`.
async fn begin_login(server: &TestServer) -> (String, String) {
    let resp = server.get("/login").await;
    resp.assert_status(StatusCode::FOUND);
    let session_id = issued_session(&resp);

    let location = header_str(&resp, header::LOCATION);
    let state = location
        .split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("state="))
        .expect("state param")
        .to_owned();
    (session_id, state)
}

/// Complete a login as `code` and return the session id issued afterwards.
async fn log_in(server: &TestServer, code: &str) -> String {
    let (session_id, state) = begin_login(server).await;
    let resp = callback(server, &session_id, code, &state).await;
    resp.assert_status_ok();
    issued_session(&resp)
}

async fn callback(server: &TestServer, session_id: &str, code: &str, state: &str) -> TestResponse {
    server
        .get(&format!("/callback?code={code}&state={state}"))
        .add_header(header::COOKIE, cookie(session_id))
        .await
}

#[tokio::test]
async fn health_is_ok() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let resp = h.server.get("/health").await;
    resp.assert_status_ok();
    assert_eq!(resp.text(), "ok");
    Ok(())
}

#[tokio::test]
async fn login_redirects_to_provider_with_session_cookie() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let resp = h.server.get("/login").await;
    resp.assert_status(StatusCode::FOUND);

    let location = header_str(&resp, header::LOCATION);
    assert!(location.contains("/authorize?client_id=test-client"), "{location}");
    assert!(location.contains("response_type=code"));
    assert!(location.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8443%2Fcallback"));

    let set_cookie = header_str(&resp, header::SET_COOKIE);
    assert!(set_cookie.starts_with(&format!("{SESSION_COOKIE}=")), "{set_cookie}");
    assert!(set_cookie.contains("HttpOnly"));
    assert!(!set_cookie.contains("Secure"));
    Ok(())
}

#[tokio::test]
async fn login_reissues_client_chosen_session() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let resp = h.server.get("/login").add_header(header::COOKIE, cookie("planted")).await;
    resp.assert_status(StatusCode::FOUND);
    let state = header_str(&resp, header::LOCATION)
        .split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("state="))
        .expect("state param")
        .to_owned();

    let done = callback(&h.server, "planted", "alice", &state).await;
    done.assert_status_ok();
    let issued = issued_session(&done);
    assert_ne!(issued, "planted");
    assert_eq!(h.state.sessions.tenant("planted").await, None);
    assert_eq!(h.state.sessions.tenant(&issued).await, Some(TenantId::new("alice")?));

    let fixed =
        h.server.get("/api/v1/kubeconfig").add_header(header::COOKIE, cookie("planted")).await;
    fixed.assert_status(StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn callback_completes_login_provisions_and_stores() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let (session_id, state) = begin_login(&h.server).await;

    let resp = callback(&h.server, &session_id, "alice", &state).await;
    resp.assert_status_ok();
    assert_eq!(resp.text(), "Welcome, alice! Provisioning state: ready.\n");
    let issued = issued_session(&resp);

    assert_eq!(h.cluster.count(Kind::Namespace).await, 1);
    let stored = h.state.store.get(&TenantId::new("alice")?).await?;
    assert_eq!(stored.access_token, "access-alice");
    assert_eq!(stored.refresh_token, "refresh-alice");
    assert_eq!(h.state.sessions.tenant(&issued).await, Some(TenantId::new("alice")?));
    Ok(())
}

#[tokio::test]
async fn callback_replay_is_rejected() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let (session_id, state) = begin_login(&h.server).await;
    callback(&h.server, &session_id, "alice", &state).await.assert_status_ok();

    let replay = callback(&h.server, &session_id, "alice", &state).await;
    replay.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(replay.json::<serde_json::Value>()["error"]["code"], "STATE_MISMATCH");
    Ok(())
}

#[tokio::test]
async fn callback_rejects_forged_state_and_missing_cookie() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let (session_id, _state) = begin_login(&h.server).await;

    let forged = callback(&h.server, &session_id, "alice", "forged").await;
    forged.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(forged.json::<serde_json::Value>()["error"]["code"], "STATE_MISMATCH");

    let (_, state) = begin_login(&h.server).await;
    let no_cookie = h.server.get(&format!("/callback?code=alice&state={state}")).await;
    no_cookie.assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(h.cluster.count(Kind::Namespace).await, 0);
    assert_eq!(h.cluster.count(Kind::Secret).await, 0);
    Ok(())
}

#[tokio::test]
async fn callback_surfaces_exchange_failure() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let (session_id, state) = begin_login(&h.server).await;
    let resp = callback(&h.server, &session_id, "bad-code", &state).await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "EXCHANGE_FAILED");
    assert_eq!(h.cluster.count(Kind::Secret).await, 0);
    Ok(())
}

#[tokio::test]
async fn callback_with_provider_error_is_bad_request() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let (session_id, _) = begin_login(&h.server).await;
    let resp = h
        .server
        .get("/callback?error=access_denied")
        .add_header(header::COOKIE, cookie(&session_id))
        .await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert!(resp.text().contains("access_denied"));
    Ok(())
}

#[tokio::test]
async fn kubeconfig_requires_login_and_token_secret() -> anyhow::Result<()> {
    let h = harness(None).await?;
    h.server.get("/api/v1/kubeconfig").await.assert_status(StatusCode::UNAUTHORIZED);

    let session_id = log_in(&h.server, "alice").await;

    let missing =
        h.server.get("/api/v1/kubeconfig").add_header(header::COOKIE, cookie(&session_id)).await;
    missing.assert_status(StatusCode::NOT_FOUND);

    h.cluster
        .insert(
            Manifest::new(Kind::Secret, Some("spotify-alice"), "alice-token")
                .with_field("stringData", json!({ "token": "sa-token", "ca.crt": "ca" })),
        )
        .await?;
    let resp =
        h.server.get("/api/v1/kubeconfig").add_header(header::COOKIE, cookie(&session_id)).await;
    resp.assert_status_ok();
    let body = resp.text();
    assert!(body.contains("namespace: spotify-alice"), "{body}");
    assert!(body.contains("token: sa-token"));
    Ok(())
}

#[tokio::test]
async fn admin_api_requires_bearer_token() -> anyhow::Result<()> {
    let h = harness(Some("s3cret")).await?;

    let resp = h.server.get("/api/v1/tenants").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json::<serde_json::Value>()["error"]["code"], "UNAUTHORIZED");
    h.server.post("/api/v1/sweep").await.assert_status(StatusCode::UNAUTHORIZED);

    let resp = h
        .server
        .get("/api/v1/tenants")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"))
        .await;
    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["tenants"], json!([]));

    // Browser routes stay reachable without the admin token.
    h.server.get("/health").await.assert_status_ok();
    h.server.get("/login").await.assert_status(StatusCode::FOUND);
    Ok(())
}

#[tokio::test]
async fn admin_lists_tenants_without_token_values() -> anyhow::Result<()> {
    let h = harness(None).await?;
    log_in(&h.server, "alice").await;

    let resp = h.server.get("/api/v1/tenants").await;
    resp.assert_status_ok();
    let body = resp.json::<serde_json::Value>();
    assert_eq!(body["tenants"][0]["tenant"], "alice");
    assert_eq!(body["tenants"][0]["namespace"], "spotify-alice");
    assert!(!resp.text().contains("access-alice"));
    Ok(())
}

#[tokio::test]
async fn admin_provision_returns_report() -> anyhow::Result<()> {
    let h = harness(None).await?;
    let resp = h.server.post("/api/v1/tenants/bob/provision").await;
    resp.assert_status_ok();
    let body = resp.json::<serde_json::Value>();
    assert_eq!(body["state"], "ready");
    assert_eq!(body["namespace"], "spotify-bob");
    assert_eq!(body["steps"][0], json!({ "step": "namespace", "outcome": "created" }));

    let again = h.server.post("/api/v1/tenants/bob/provision").await.json::<serde_json::Value>();
    assert_eq!(again["state"], "ready");
    assert_eq!(again["steps"][0]["outcome"], "already_exists");
    assert_eq!(h.cluster.count(Kind::Namespace).await, 1);
    Ok(())
}

#[tokio::test]
async fn admin_sweep_refreshes_logged_in_tenants() -> anyhow::Result<()> {
    let h = harness(None).await?;
    log_in(&h.server, "alice").await;

    let resp = h.server.post("/api/v1/sweep").await;
    resp.assert_status_ok();
    let body = resp.json::<serde_json::Value>();
    assert_eq!(body["tenants"], json!([{ "tenant": "alice", "outcome": "refreshed" }]));

    let stored = h.state.store.get(&TenantId::new("alice")?).await?;
    assert!(stored.access_token.starts_with("fresh-"), "{}", stored.access_token);
    assert_eq!(stored.refresh_token, "rotated-refresh-alice");
    Ok(())
}
