// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::json;

use crate::cluster::memory::MemoryCluster;
use crate::cluster::Manifest;
use crate::test_support::{test_naming, test_provisioner};

use super::*;

const CA: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

#[test]
fn render_embeds_server_namespace_and_token() {
    let config = render("https://localhost:44091", "spotify-alice", CA, "sa-token");
    assert!(config.contains("    server: https://localhost:44091\n"));
    assert!(config.contains("    namespace: spotify-alice\n"));
    assert!(config.contains("    token: sa-token\n"));
    assert!(config.contains(&format!("certificate-authority-data: {}", STANDARD.encode(CA))));
    assert!(config.contains("current-context: user@dj-kubelet\n"));
}

async fn provisioned_alice(secrets: serde_json::Value) -> anyhow::Result<Arc<MemoryCluster>> {
    let cluster = Arc::new(MemoryCluster::new());
    test_provisioner(Arc::clone(&cluster)).provision(&TenantId::new("alice")?).await;
    cluster
        .merge_patch(Kind::ServiceAccount, Some("spotify-alice"), "alice", json!({ "secrets": secrets }))
        .await?;
    Ok(cluster)
}

#[tokio::test]
async fn reads_referenced_token_secret() -> anyhow::Result<()> {
    let cluster = provisioned_alice(json!([{ "name": "alice-token-x7k2p" }])).await?;
    cluster
        .create(
            Manifest::new(Kind::Secret, Some("spotify-alice"), "alice-token-x7k2p")
                .with_field("stringData", json!({ "token": "sa-token", "ca.crt": CA })),
        )
        .await?;

    let config =
        for_tenant(cluster.as_ref(), &test_naming(), &TenantId::new("alice")?, "https://k8s:6443")
            .await?;
    assert!(config.contains("token: sa-token"));
    assert!(config.contains("server: https://k8s:6443"));
    Ok(())
}

#[tokio::test]
async fn falls_back_to_conventional_secret_name() -> anyhow::Result<()> {
    let cluster = provisioned_alice(json!(null)).await?;
    cluster
        .create(
            Manifest::new(Kind::Secret, Some("spotify-alice"), "alice-token")
                .with_field("stringData", json!({ "token": "fallback" })),
        )
        .await?;

    let config =
        for_tenant(cluster.as_ref(), &test_naming(), &TenantId::new("alice")?, "https://k8s")
            .await?;
    assert!(config.contains("token: fallback"));
    Ok(())
}

#[tokio::test]
async fn missing_objects_are_not_found() -> anyhow::Result<()> {
    let cluster = Arc::new(MemoryCluster::new());
    let result =
        for_tenant(cluster.as_ref(), &test_naming(), &TenantId::new("nobody")?, "https://k8s")
            .await;
    assert!(matches!(result, Err(RefresherError::NotFound(_))));

    let cluster = provisioned_alice(json!(null)).await?;
    let result =
        for_tenant(cluster.as_ref(), &test_naming(), &TenantId::new("alice")?, "https://k8s")
            .await;
    assert!(matches!(result, Err(RefresherError::NotFound(_))));
    Ok(())
}
