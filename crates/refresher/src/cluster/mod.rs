// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource client: generic create/get/list/patch against the namespaced
//! cluster object store.
//!
//! Objects travel as [`Manifest`]s, the JSON documents the Kubernetes API
//! speaks. Secrets are written through `stringData` and read back from the
//! base64-encoded `data` map, as the API server normalises them.

pub mod kube;
pub mod memory;
pub mod patch;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object kinds the refresher reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Namespace,
    ServiceAccount,
    Secret,
    Role,
    RoleBinding,
    ClusterRoleBinding,
    Deployment,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "Namespace",
            Self::ServiceAccount => "ServiceAccount",
            Self::Secret => "Secret",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
            Self::Deployment => "Deployment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Namespace" => Some(Self::Namespace),
            "ServiceAccount" => Some(Self::ServiceAccount),
            "Secret" => Some(Self::Secret),
            "Role" => Some(Self::Role),
            "RoleBinding" => Some(Self::RoleBinding),
            "ClusterRoleBinding" => Some(Self::ClusterRoleBinding),
            "Deployment" => Some(Self::Deployment),
            _ => None,
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            Self::Namespace | Self::ServiceAccount | Self::Secret => "v1",
            Self::Role | Self::RoleBinding | Self::ClusterRoleBinding => {
                "rbac.authorization.k8s.io/v1"
            }
            Self::Deployment => "apps/v1",
        }
    }

    /// Lowercase plural resource name used in API paths.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Namespace => "namespaces",
            Self::ServiceAccount => "serviceaccounts",
            Self::Secret => "secrets",
            Self::Role => "roles",
            Self::RoleBinding => "rolebindings",
            Self::ClusterRoleBinding => "clusterrolebindings",
            Self::Deployment => "deployments",
        }
    }

    pub fn is_namespaced(&self) -> bool {
        !matches!(self, Self::Namespace | Self::ClusterRoleBinding)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by a [`ResourceClient`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClusterError {
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: Kind, name: String },
    #[error("{kind} {name} not found")]
    NotFound { kind: Kind, name: String },
    #[error("conflict on {kind} {name}: {message}")]
    Conflict { kind: Kind, name: String, message: String },
    #[error("invalid {kind}: {message}")]
    Invalid { kind: Kind, message: String },
    #[error("cluster API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("cluster transport: {0}")]
    Transport(String),
}

impl ClusterError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Equality label selector (`key=value`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    pub key: String,
    pub value: String,
}

impl LabelSelector {
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    pub fn matches(&self, manifest: &Manifest) -> bool {
        manifest.label(&self.key) == Some(self.value.as_str())
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// A cluster object document: `apiVersion`, `kind`, `metadata`, and the
/// kind-specific body fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Value);

impl Manifest {
    pub fn new(kind: Kind, namespace: Option<&str>, name: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("name".to_owned(), Value::String(name.to_owned()));
        if let Some(ns) = namespace {
            metadata.insert("namespace".to_owned(), Value::String(ns.to_owned()));
        }
        Self(serde_json::json!({
            "apiVersion": kind.api_version(),
            "kind": kind.as_str(),
            "metadata": metadata,
        }))
    }

    /// Wrap a raw document, filling in `kind`/`apiVersion` when the API
    /// omitted them (list responses do).
    pub fn from_value(kind: Kind, mut value: Value) -> Result<Self, ClusterError> {
        let Some(obj) = value.as_object_mut() else {
            return Err(ClusterError::Invalid { kind, message: "not a JSON object".to_owned() });
        };
        obj.entry("kind").or_insert_with(|| Value::String(kind.as_str().to_owned()));
        obj.entry("apiVersion").or_insert_with(|| Value::String(kind.api_version().to_owned()));
        let has_name = obj
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .is_some_and(|n| !n.is_empty());
        if !has_name {
            return Err(ClusterError::Invalid { kind, message: "missing metadata.name".to_owned() });
        }
        Ok(Self(value))
    }

    pub fn kind(&self) -> Option<Kind> {
        self.0.get("kind").and_then(Value::as_str).and_then(Kind::from_name)
    }

    pub fn name(&self) -> &str {
        self.meta_str("name").unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.meta_str("namespace")
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.0.pointer("/metadata/labels").and_then(|l| l.get(key)).and_then(Value::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.0.pointer("/metadata/annotations").and_then(|a| a.get(key)).and_then(Value::as_str)
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.set_meta_entry("labels", key, value);
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.set_meta_entry("annotations", key, value);
        self
    }

    /// Set a top-level body field (`data`, `subjects`, `spec`, ...).
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        if let Some(obj) = self.0.as_object_mut() {
            obj.insert(key.to_owned(), value);
        }
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn field_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.0.as_object_mut().and_then(|obj| obj.remove(key))
    }

    /// Apply an RFC 7386 merge patch to the whole document.
    pub fn apply_merge_patch(&mut self, patch: &Value) {
        patch::merge_patch(&mut self.0, patch);
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(meta) = self.metadata_mut() {
            meta.insert("namespace".to_owned(), Value::String(namespace.to_owned()));
        }
    }

    /// Drop server-populated metadata so the document can be created elsewhere.
    pub fn strip_server_fields(&mut self) {
        const SERVER_FIELDS: [&str; 7] = [
            "uid",
            "resourceVersion",
            "creationTimestamp",
            "generation",
            "managedFields",
            "ownerReferences",
            "selfLink",
        ];
        if let Some(meta) = self.metadata_mut() {
            for field in SERVER_FIELDS {
                meta.remove(field);
            }
            if let Some(Value::Object(annotations)) = meta.get_mut("annotations") {
                annotations.remove("kubectl.kubernetes.io/last-applied-configuration");
                annotations.remove("deployment.kubernetes.io/revision");
            }
        }
        self.remove_field("status");
    }

    /// Decode a Secret's base64 `data` map into strings.
    pub fn secret_data(&self) -> Result<BTreeMap<String, String>, ClusterError> {
        let mut out = BTreeMap::new();
        let Some(data) = self.0.get("data").and_then(Value::as_object) else {
            return Ok(out);
        };
        for (key, value) in data {
            let encoded = value.as_str().unwrap_or_default();
            let bytes = STANDARD.decode(encoded).map_err(|e| ClusterError::Invalid {
                kind: Kind::Secret,
                message: format!("data.{key} is not base64: {e}"),
            })?;
            let text = String::from_utf8(bytes).map_err(|e| ClusterError::Invalid {
                kind: Kind::Secret,
                message: format!("data.{key} is not UTF-8: {e}"),
            })?;
            out.insert(key.clone(), text);
        }
        Ok(out)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn meta_str(&self, key: &str) -> Option<&str> {
        self.0.get("metadata").and_then(|m| m.get(key)).and_then(Value::as_str)
    }

    fn metadata_mut(&mut self) -> Option<&mut Map<String, Value>> {
        let obj = self.0.as_object_mut()?;
        obj.entry("metadata").or_insert_with(|| Value::Object(Map::new())).as_object_mut()
    }

    fn set_meta_entry(&mut self, section: &str, key: &str, value: &str) {
        if let Some(meta) = self.metadata_mut() {
            if let Some(map) =
                meta.entry(section).or_insert_with(|| Value::Object(Map::new())).as_object_mut()
            {
                map.insert(key.to_owned(), Value::String(value.to_owned()));
            }
        }
    }
}

/// The narrow interface the lifecycle manager needs from the cluster.
///
/// `merge_patch` applies RFC 7386 semantics server-side, so concurrent
/// writers only race on the fields they both touch.
pub trait ResourceClient: Send + Sync {
    fn create<'a>(&'a self, manifest: Manifest) -> BoxFuture<'a, Result<Manifest, ClusterError>>;

    fn get<'a>(
        &'a self,
        kind: Kind,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> BoxFuture<'a, Result<Manifest, ClusterError>>;

    /// List objects of `kind`; `namespace: None` lists across all namespaces.
    fn list<'a>(
        &'a self,
        kind: Kind,
        namespace: Option<&'a str>,
        selector: Option<&'a LabelSelector>,
    ) -> BoxFuture<'a, Result<Vec<Manifest>, ClusterError>>;

    fn merge_patch<'a>(
        &'a self,
        kind: Kind,
        namespace: Option<&'a str>,
        name: &'a str,
        patch: Value,
    ) -> BoxFuture<'a, Result<Manifest, ClusterError>>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
