// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes REST implementation of [`ResourceClient`].

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::cluster::{BoxFuture, ClusterError, Kind, LabelSelector, Manifest, ResourceClient};
use crate::oauth::urlencoded;

/// Mount point of the pod's service account credentials.
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// HTTP client for one Kubernetes API server.
pub struct KubeClient {
    api_url: String,
    token: Option<String>,
    client: Client,
}

impl KubeClient {
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
        ca_pem: Option<&[u8]>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        crate::oauth::client::install_crypto_provider();
        let mut builder = Client::builder().timeout(timeout);
        if let Some(pem) = ca_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }
        let api_url = api_url.into().trim_end_matches('/').to_owned();
        Ok(Self { api_url, token, client: builder.build()? })
    }

    /// Configure from the pod environment: `KUBERNETES_SERVICE_HOST`/`PORT`
    /// plus the mounted service account token and CA bundle.
    pub fn in_cluster(timeout: Duration) -> anyhow::Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| anyhow::anyhow!("KUBERNETES_SERVICE_HOST not set (not in a cluster?)"))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_owned());
        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = std::fs::read_to_string(dir.join("token"))?;
        let ca = std::fs::read(dir.join("ca.crt"))?;
        let host = if host.contains(':') { format!("[{host}]") } else { host };
        Self::new(format!("https://{host}:{port}"), Some(token.trim().to_owned()), Some(&ca), timeout)
    }

    /// Collection path for `kind`, e.g. `/api/v1/namespaces/ns/secrets`.
    pub fn collection_path(kind: Kind, namespace: Option<&str>) -> String {
        let group = match kind.api_version() {
            "v1" => "/api/v1".to_owned(),
            other => format!("/apis/{other}"),
        };
        match namespace {
            Some(ns) if kind.is_namespaced() => format!("{group}/namespaces/{ns}/{}", kind.plural()),
            _ => format!("{group}/{}", kind.plural()),
        }
    }

    pub fn object_path(kind: Kind, namespace: Option<&str>, name: &str) -> String {
        format!("{}/{name}", Self::collection_path(kind, namespace))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value), ClusterError> {
        let mut req = self.client.request(method, format!("{}{path}", self.api_url));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req
                .header("Content-Type", content_type.unwrap_or("application/json"))
                .body(body.to_string());
        }
        let resp = req.send().await.map_err(|e| ClusterError::Transport(e.to_string()))?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| ClusterError::Transport(e.to_string()))?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        Ok((status, value))
    }

    async fn do_create(&self, manifest: Manifest) -> Result<Manifest, ClusterError> {
        let kind = manifest.kind().ok_or_else(|| ClusterError::Api {
            status: 400,
            message: "manifest has no recognised kind".to_owned(),
        })?;
        let name = manifest.name().to_owned();
        let path = Self::collection_path(kind, manifest.namespace());
        let (status, value) =
            self.send(Method::POST, &path, None, Some(manifest.as_value())).await?;
        if status.is_success() {
            return Manifest::from_value(kind, value);
        }
        Err(map_status(status, kind, &name, &value, true))
    }

    async fn do_get(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Manifest, ClusterError> {
        let path = Self::object_path(kind, namespace, name);
        let (status, value) = self.send(Method::GET, &path, None, None).await?;
        if status.is_success() {
            return Manifest::from_value(kind, value);
        }
        Err(map_status(status, kind, name, &value, false))
    }

    async fn do_list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Manifest>, ClusterError> {
        let mut path = Self::collection_path(kind, namespace);
        if let Some(selector) = selector {
            path.push('?');
            path.push_str(&urlencoded(&[("labelSelector", &selector.to_string())]));
        }
        let (status, value) = self.send(Method::GET, &path, None, None).await?;
        if !status.is_success() {
            return Err(map_status(status, kind, kind.plural(), &value, false));
        }
        let items = value.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
        items.into_iter().map(|item| Manifest::from_value(kind, item)).collect()
    }

    async fn do_merge_patch(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        name: &str,
        patch: Value,
    ) -> Result<Manifest, ClusterError> {
        let path = Self::object_path(kind, namespace, name);
        let (status, value) = self
            .send(Method::PATCH, &path, Some("application/merge-patch+json"), Some(&patch))
            .await?;
        if status.is_success() {
            return Manifest::from_value(kind, value);
        }
        Err(map_status(status, kind, name, &value, false))
    }
}

/// Translate an API status into a [`ClusterError`], using the `Status`
/// object's `message` when present.
fn map_status(
    status: StatusCode,
    kind: Kind,
    name: &str,
    body: &Value,
    creating: bool,
) -> ClusterError {
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .or_else(|| body.as_str().map(str::to_owned))
        .unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::NOT_FOUND => ClusterError::NotFound { kind, name: name.to_owned() },
        StatusCode::CONFLICT if creating => {
            ClusterError::AlreadyExists { kind, name: name.to_owned() }
        }
        StatusCode::CONFLICT => ClusterError::Conflict { kind, name: name.to_owned(), message },
        StatusCode::UNPROCESSABLE_ENTITY => ClusterError::Invalid { kind, message },
        other => ClusterError::Api { status: other.as_u16(), message },
    }
}

impl ResourceClient for KubeClient {
    fn create<'a>(&'a self, manifest: Manifest) -> BoxFuture<'a, Result<Manifest, ClusterError>> {
        Box::pin(self.do_create(manifest))
    }

    fn get<'a>(
        &'a self,
        kind: Kind,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Manifest, ClusterError>> {
        Box::pin(self.do_get(kind, namespace, name))
    }

    fn list<'a>(
        &'a self,
        kind: Kind,
        namespace: Option<&'a str>,
        selector: Option<&'a LabelSelector>,
    ) -> BoxFuture<'a, Result<Vec<Manifest>, ClusterError>> {
        Box::pin(self.do_list(kind, namespace, selector))
    }

    fn merge_patch<'a>(
        &'a self,
        kind: Kind,
        namespace: Option<&'a str>,
        name: &'a str,
        patch: Value,
    ) -> BoxFuture<'a, Result<Manifest, ClusterError>> {
        Box::pin(self.do_merge_patch(kind, namespace, name, patch))
    }
}

#[cfg(test)]
#[path = "kube_tests.rs"]
mod tests;
