// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process resource store with API-server-like semantics.
//!
//! Backs `--cluster memory` and the test suite. Mirrors the behaviours the
//! lifecycle relies on: 409-style `AlreadyExists` on duplicate create,
//! namespaced objects require their namespace, Secret `stringData` is folded
//! into base64 `data`, and patches are JSON merge patches.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::cluster::{BoxFuture, ClusterError, Kind, LabelSelector, Manifest, ResourceClient};

type ObjectKey = (Kind, Option<String>, String);

/// Operation selector for injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Get,
    List,
    Patch,
}

#[derive(Debug, Clone)]
struct FailureRule {
    op: Op,
    kind: Kind,
    name: Option<String>,
}

impl FailureRule {
    fn matches(&self, op: Op, kind: Kind, name: Option<&str>) -> bool {
        self.op == op
            && self.kind == kind
            && match (&self.name, name) {
                (None, _) => true,
                (Some(want), Some(got)) => want == got,
                (Some(_), None) => false,
            }
    }
}

/// In-memory [`ResourceClient`].
#[derive(Default)]
pub struct MemoryCluster {
    objects: RwLock<BTreeMap<ObjectKey, Manifest>>,
    failures: RwLock<Vec<FailureRule>>,
    delays: RwLock<Vec<(Op, Kind, Duration)>>,
    races: RwLock<Vec<Manifest>>,
    version: AtomicU64,
    creates: AtomicU64,
    patches: AtomicU64,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `op` on `kind` (optionally only the object `name`) fail
    /// with a 500 until [`clear_failures`](Self::clear_failures).
    pub async fn fail_on(&self, op: Op, kind: Kind, name: Option<&str>) {
        self.failures.write().await.push(FailureRule { op, kind, name: name.map(str::to_owned) });
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
        self.delays.write().await.clear();
    }

    /// Hold every `op` on `kind` for `delay` before applying it.
    pub async fn delay_on(&self, op: Op, kind: Kind, delay: Duration) {
        self.delays.write().await.push((op, kind, delay));
    }

    /// Store `winner` just before the next create of the same object is
    /// applied, so that create loses the race with `AlreadyExists`.
    pub async fn race_next_create(&self, winner: Manifest) {
        self.races.write().await.push(winner);
    }

    /// Number of stored objects of `kind`.
    pub async fn count(&self, kind: Kind) -> usize {
        self.objects.read().await.keys().filter(|(k, _, _)| *k == kind).count()
    }

    /// Snapshot of stored objects of `kind`.
    pub async fn objects(&self, kind: Kind) -> Vec<Manifest> {
        self.objects
            .read()
            .await
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Successful create calls so far.
    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
    }

    /// Successful patch calls so far.
    pub fn patch_count(&self) -> u64 {
        self.patches.load(Ordering::Relaxed)
    }

    /// Insert an object as-is, bypassing create validation (test seeding).
    pub async fn insert(&self, manifest: Manifest) -> Result<(), ClusterError> {
        let kind = manifest_kind(&manifest)?;
        let mut manifest = manifest;
        normalize_secret(kind, &mut manifest);
        let key = (kind, manifest.namespace().map(str::to_owned), manifest.name().to_owned());
        self.objects.write().await.insert(key, manifest);
        Ok(())
    }

    async fn check_failure(
        &self,
        op: Op,
        kind: Kind,
        name: Option<&str>,
    ) -> Result<(), ClusterError> {
        let delay = self
            .delays
            .read()
            .await
            .iter()
            .find(|(o, k, _)| *o == op && *k == kind)
            .map(|(_, _, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failures = self.failures.read().await;
        if failures.iter().any(|rule| rule.matches(op, kind, name)) {
            return Err(ClusterError::Api {
                status: 500,
                message: format!("injected {op:?} failure for {kind}"),
            });
        }
        Ok(())
    }

    async fn take_race(&self, key: &ObjectKey) -> Option<Manifest> {
        let mut races = self.races.write().await;
        let pos = races.iter().position(|m| {
            m.kind() == Some(key.0) && m.namespace() == key.1.as_deref() && m.name() == key.2
        })?;
        Some(races.remove(pos))
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    async fn do_create(&self, mut manifest: Manifest) -> Result<Manifest, ClusterError> {
        let kind = manifest_kind(&manifest)?;
        let name = manifest.name().to_owned();
        self.check_failure(Op::Create, kind, Some(&name)).await?;

        let namespace = manifest.namespace().map(str::to_owned);
        match (kind.is_namespaced(), &namespace) {
            (true, None) => {
                return Err(ClusterError::Invalid {
                    kind,
                    message: "namespaced object without metadata.namespace".to_owned(),
                })
            }
            (false, Some(_)) => {
                return Err(ClusterError::Invalid {
                    kind,
                    message: "cluster-scoped object with metadata.namespace".to_owned(),
                })
            }
            _ => {}
        }

        let mut objects = self.objects.write().await;
        if let Some(ref ns) = namespace {
            if !objects.contains_key(&(Kind::Namespace, None, ns.clone())) {
                return Err(ClusterError::NotFound { kind: Kind::Namespace, name: ns.clone() });
            }
        }
        let key = (kind, namespace, name.clone());
        if let Some(mut winner) = self.take_race(&key).await {
            normalize_secret(kind, &mut winner);
            objects.insert(key.clone(), winner);
        }
        if objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists { kind, name });
        }

        normalize_secret(kind, &mut manifest);
        manifest.apply_merge_patch(&serde_json::json!({
            "metadata": {
                "uid": uuid::Uuid::new_v4().to_string(),
                "resourceVersion": self.next_version(),
                "creationTimestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));
        objects.insert(key, manifest.clone());
        self.creates.fetch_add(1, Ordering::Relaxed);
        Ok(manifest)
    }

    async fn do_get(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Manifest, ClusterError> {
        self.check_failure(Op::Get, kind, Some(name)).await?;
        let key = (kind, namespace.map(str::to_owned), name.to_owned());
        self.objects
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound { kind, name: name.to_owned() })
    }

    async fn do_list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Manifest>, ClusterError> {
        self.check_failure(Op::List, kind, None).await?;
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((k, ns, _), _)| {
                *k == kind && namespace.is_none_or(|want| ns.as_deref() == Some(want))
            })
            .filter(|(_, m)| selector.is_none_or(|s| s.matches(m)))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn do_merge_patch(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        name: &str,
        patch: Value,
    ) -> Result<Manifest, ClusterError> {
        self.check_failure(Op::Patch, kind, Some(name)).await?;
        let key = (kind, namespace.map(str::to_owned), name.to_owned());
        let version = self.next_version();
        let mut objects = self.objects.write().await;
        let current = objects
            .get_mut(&key)
            .ok_or_else(|| ClusterError::NotFound { kind, name: name.to_owned() })?;

        let mut patched = current.clone();
        patched.apply_merge_patch(&patch);
        // Identity fields are immutable.
        patched.apply_merge_patch(&serde_json::json!({
            "kind": kind.as_str(),
            "metadata": { "name": name, "namespace": namespace, "resourceVersion": version }
        }));
        normalize_secret(kind, &mut patched);
        *current = patched.clone();
        self.patches.fetch_add(1, Ordering::Relaxed);
        Ok(patched)
    }
}

impl ResourceClient for MemoryCluster {
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

fn manifest_kind(manifest: &Manifest) -> Result<Kind, ClusterError> {
    manifest.kind().ok_or_else(|| ClusterError::Api {
        status: 400,
        message: "manifest has no recognised kind".to_owned(),
    })
}

/// Fold `stringData` into base64 `data`, as the API server does for Secrets.
fn normalize_secret(kind: Kind, manifest: &mut Manifest) {
    if kind != Kind::Secret {
        return;
    }
    let Some(Value::Object(string_data)) = manifest.remove_field("stringData") else {
        return;
    };
    let mut encoded = serde_json::Map::new();
    for (key, value) in string_data {
        let text = value.as_str().unwrap_or_default();
        encoded.insert(key, Value::String(STANDARD.encode(text)));
    }
    manifest.apply_merge_patch(&serde_json::json!({ "data": encoded }));
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
