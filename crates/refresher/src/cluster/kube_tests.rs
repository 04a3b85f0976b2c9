// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use axum::extract::{Path, RawQuery};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use super::*;

#[yare::parameterized(
    namespaces     = { Kind::Namespace, Some("ignored"), "/api/v1/namespaces" },
    secrets        = { Kind::Secret, Some("spotify-alice"), "/api/v1/namespaces/spotify-alice/secrets" },
    all_secrets    = { Kind::Secret, None, "/api/v1/secrets" },
    role_bindings  = { Kind::RoleBinding, Some("ns"), "/apis/rbac.authorization.k8s.io/v1/namespaces/ns/rolebindings" },
    cluster_grants = { Kind::ClusterRoleBinding, None, "/apis/rbac.authorization.k8s.io/v1/clusterrolebindings" },
    deployments    = { Kind::Deployment, Some("ns"), "/apis/apps/v1/namespaces/ns/deployments" },
)]
fn collection_paths(kind: Kind, namespace: Option<&str>, expected: &str) {
    assert_eq!(KubeClient::collection_path(kind, namespace), expected);
}

#[test]
fn object_path_appends_name() {
    assert_eq!(
        KubeClient::object_path(Kind::ServiceAccount, Some("ns"), "alice"),
        "/api/v1/namespaces/ns/serviceaccounts/alice"
    );
}

#[yare::parameterized(
    not_found    = { StatusCode::NOT_FOUND, false, "not_found" },
    create_dup   = { StatusCode::CONFLICT, true, "already_exists" },
    patch_clash  = { StatusCode::CONFLICT, false, "conflict" },
    invalid      = { StatusCode::UNPROCESSABLE_ENTITY, false, "invalid" },
    forbidden    = { StatusCode::FORBIDDEN, false, "api" },
)]
fn status_mapping(status: StatusCode, creating: bool, expected: &str) {
    let body = json!({ "kind": "Status", "message": "from server" });
    let err = map_status(status, Kind::Secret, "s", &body, creating);
    let got = match err {
        ClusterError::NotFound { .. } => "not_found",
        ClusterError::AlreadyExists { .. } => "already_exists",
        ClusterError::Conflict { .. } => "conflict",
        ClusterError::Invalid { .. } => "invalid",
        ClusterError::Api { .. } => "api",
        ClusterError::Transport(_) => "transport",
    };
    assert_eq!(got, expected);
}

#[test]
fn status_message_is_carried() {
    let body = json!({ "message": "secrets is forbidden" });
    let err = map_status(StatusCode::FORBIDDEN, Kind::Secret, "s", &body, false);
    assert!(err.to_string().contains("secrets is forbidden"), "{err}");
    assert!(err.to_string().contains("403"), "{err}");
}

async fn spawn_api(router: Router) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn list_sends_selector_and_fills_kind() -> anyhow::Result<()> {
    let router = Router::new().route(
        "/api/v1/secrets",
        get(|RawQuery(query): RawQuery| async move {
            let query = query.unwrap_or_default();
            if query != "labelSelector=dj-kubelet.com%2Foauth-refresher%3Dspotify" {
                return (StatusCode::BAD_REQUEST, Json(json!({ "message": query })));
            }
            (
                StatusCode::OK,
                Json(json!({
                    "kind": "SecretList",
                    "items": [
                        { "metadata": { "name": "spotify-oauth", "namespace": "spotify-alice" } }
                    ]
                })),
            )
        }),
    );
    let url = spawn_api(router).await?;
    let client = KubeClient::new(url, Some("token".to_owned()), None, Duration::from_secs(5))?;

    let selector = LabelSelector::equals("dj-kubelet.com/oauth-refresher", "spotify");
    let items = client.list(Kind::Secret, None, Some(&selector)).await?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind(), Some(Kind::Secret));
    assert_eq!(items[0].namespace(), Some("spotify-alice"));
    Ok(())
}

#[tokio::test]
async fn get_maps_missing_object() -> anyhow::Result<()> {
    let router = Router::new().route(
        "/api/v1/namespaces/{ns}/secrets/{name}",
        get(|Path((_ns, name)): Path<(String, String)>| async move {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "kind": "Status", "message": format!("secrets \"{name}\" not found") })),
            )
        }),
    );
    let url = spawn_api(router).await?;
    let client = KubeClient::new(url, None, None, Duration::from_secs(5))?;

    let result = client.get(Kind::Secret, Some("ns"), "spotify-oauth").await;
    assert!(result.is_err_and(|e| e.is_not_found()));
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_transport_error() -> anyhow::Result<()> {
    let client = KubeClient::new("http://127.0.0.1:1", None, None, Duration::from_millis(500))?;
    let result = client.get(Kind::Namespace, None, "x").await;
    assert!(matches!(result, Err(ClusterError::Transport(_))));
    Ok(())
}
