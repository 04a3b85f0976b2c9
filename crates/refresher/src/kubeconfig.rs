// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubeconfig for a tenant's service identity.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use crate::cluster::{ClusterError, Kind, ResourceClient};
use crate::error::RefresherError;
use crate::tenant::{Naming, TenantId};

const CLUSTER_NAME: &str = "dj-kubelet";
const USER_NAME: &str = "user";

/// Render a kubeconfig pinned to `namespace`.
pub fn render(server: &str, namespace: &str, ca_pem: &str, token: &str) -> String {
    let ca_data = STANDARD.encode(ca_pem);
    format!(
        "apiVersion: v1
clusters:
- cluster:
    server: {server}
    certificate-authority-data: {ca_data}
  name: {CLUSTER_NAME}
contexts:
- context:
    cluster: {CLUSTER_NAME}
    namespace: {namespace}
    user: {USER_NAME}
  name: {USER_NAME}@{CLUSTER_NAME}
current-context: {USER_NAME}@{CLUSTER_NAME}
kind: Config
preferences: {{}}
users:
- name: {USER_NAME}
  user:
    token: {token}
"
    )
}

/// Build the kubeconfig for `tenant` from its service account token Secret.
///
/// The Secret is the first one the service account references, or
/// `<service-account>-token` when the account lists none.
pub async fn for_tenant(
    cluster: &dyn ResourceClient,
    naming: &Naming,
    tenant: &TenantId,
    server: &str,
) -> Result<String, RefresherError> {
    let namespace = naming.namespace(tenant);
    let sa_name = naming.service_account(tenant);

    let sa = cluster
        .get(Kind::ServiceAccount, Some(&namespace), &sa_name)
        .await
        .map_err(|e| lookup_error(e, format!("service account {namespace}/{sa_name}")))?;

    let secret_name = sa
        .field("secrets")
        .and_then(Value::as_array)
        .and_then(|secrets| secrets.first())
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("{sa_name}-token"));

    let secret = cluster
        .get(Kind::Secret, Some(&namespace), &secret_name)
        .await
        .map_err(|e| lookup_error(e, format!("token secret {namespace}/{secret_name}")))?;

    let data =
        secret.secret_data().map_err(|e| RefresherError::StorePersistFailed(e.to_string()))?;
    let token = data
        .get("token")
        .ok_or_else(|| RefresherError::NotFound(format!("token in {namespace}/{secret_name}")))?;
    let ca = data.get("ca.crt").map(String::as_str).unwrap_or_default();
    Ok(render(server, &namespace, ca, token))
}

fn lookup_error(e: ClusterError, what: String) -> RefresherError {
    if e.is_not_found() {
        RefresherError::NotFound(what)
    } else {
        RefresherError::StorePersistFailed(format!("{what}: {e}"))
    }
}

#[cfg(test)]
#[path = "kubeconfig_tests.rs"]
mod tests;
