// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Create-or-patch persistence of credentials as cluster Secrets.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::cluster::{ClusterError, Kind, LabelSelector, Manifest, ResourceClient};
use crate::credential::{
    Credential, ACCESS_TOKEN_KEY, EXPIRY_KEY, MANAGED_LABEL, NAMESPACE_LABEL, REFRESH_TOKEN_KEY,
    TENANT_ANNOTATION, UPDATED_KEY,
};
use crate::error::RefresherError;
use crate::tenant::{Naming, TenantId};

/// Token-free view of a stored credential.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSummary {
    pub tenant: TenantId,
    pub namespace: String,
    pub expiry: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

pub struct CredentialStore {
    cluster: Arc<dyn ResourceClient>,
    naming: Naming,
    secret_name: String,
    managed_value: String,
}

impl CredentialStore {
    pub fn new(
        cluster: Arc<dyn ResourceClient>,
        naming: Naming,
        secret_name: impl Into<String>,
        managed_value: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            naming,
            secret_name: secret_name.into(),
            managed_value: managed_value.into(),
        }
    }

    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    /// Selector matching every credential Secret this store owns.
    pub fn selector(&self) -> LabelSelector {
        LabelSelector::equals(MANAGED_LABEL, &self.managed_value)
    }

    /// Persist `credential`: merge-patch the token fields of an existing
    /// Secret, or create a new labelled one.
    ///
    /// An empty refresh token is never written.
    pub async fn put(&self, credential: &Credential) -> Result<(), RefresherError> {
        let namespace = self.naming.namespace(&credential.tenant);
        let fields = token_fields(credential);

        match self.cluster.get(Kind::Secret, Some(&namespace), &self.secret_name).await {
            Ok(existing) => {
                check_owner(&existing, &credential.tenant)?;
                return self.patch(&namespace, fields).await;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(persist_failed(&credential.tenant, e)),
        }

        let manifest = Manifest::new(Kind::Secret, Some(&namespace), &self.secret_name)
            .with_label(MANAGED_LABEL, &self.managed_value)
            .with_label(NAMESPACE_LABEL, &namespace)
            .with_annotation(TENANT_ANNOTATION, credential.tenant.as_str())
            .with_field("type", json!("Opaque"))
            .with_field("stringData", Value::Object(fields.clone()));

        match self.cluster.create(manifest).await {
            Ok(_) => {
                tracing::info!(tenant = %credential.tenant, namespace = %namespace, "created credential");
                Ok(())
            }
            // Lost a create race: fall back to patching the winner.
            Err(e) if e.is_already_exists() => {
                let winner = self
                    .cluster
                    .get(Kind::Secret, Some(&namespace), &self.secret_name)
                    .await
                    .map_err(|e| persist_failed(&credential.tenant, e))?;
                check_owner(&winner, &credential.tenant)?;
                self.patch(&namespace, fields).await
            }
            Err(e) => Err(persist_failed(&credential.tenant, e)),
        }
    }

    /// Load the credential stored for `tenant`.
    pub async fn get(&self, tenant: &TenantId) -> Result<Credential, RefresherError> {
        let namespace = self.naming.namespace(tenant);
        let secret = self
            .cluster
            .get(Kind::Secret, Some(&namespace), &self.secret_name)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    RefresherError::NotFound(format!("credential for {tenant}"))
                } else {
                    persist_failed(tenant, e)
                }
            })?;
        check_owner(&secret, tenant)?;
        let data = secret.secret_data().map_err(|e| persist_failed(tenant, e))?;
        decode(tenant, &data)
    }

    /// Tenants with a managed credential Secret, in any namespace.
    pub async fn tenants(&self) -> Result<Vec<TenantId>, RefresherError> {
        Ok(self.summaries().await?.into_iter().map(|s| s.tenant).collect())
    }

    /// Token-free listing of every managed credential.
    pub async fn summaries(&self) -> Result<Vec<CredentialSummary>, RefresherError> {
        let selector = self.selector();
        let secrets = self
            .cluster
            .list(Kind::Secret, None, Some(&selector))
            .await
            .map_err(|e| RefresherError::StorePersistFailed(e.to_string()))?;

        let mut out = Vec::new();
        for secret in secrets.iter().filter(|s| s.name() == self.secret_name) {
            let Some(tenant) = self.tenant_of(secret) else {
                tracing::warn!(
                    namespace = secret.namespace().unwrap_or_default(),
                    "managed credential without a resolvable tenant"
                );
                continue;
            };
            let data = secret.secret_data().unwrap_or_default();
            out.push(CredentialSummary {
                tenant,
                namespace: secret.namespace().unwrap_or_default().to_owned(),
                expiry: data.get(EXPIRY_KEY).and_then(|v| parse_time(v).ok()),
                updated: data.get(UPDATED_KEY).and_then(|v| parse_time(v).ok()),
            });
        }
        Ok(out)
    }

    async fn patch(
        &self,
        namespace: &str,
        fields: Map<String, Value>,
    ) -> Result<(), RefresherError> {
        self.cluster
            .merge_patch(
                Kind::Secret,
                Some(namespace),
                &self.secret_name,
                json!({ "stringData": fields }),
            )
            .await
            .map_err(|e| RefresherError::StorePersistFailed(format!("{namespace}: {e}")))?;
        tracing::debug!(namespace = %namespace, "patched credential");
        Ok(())
    }

    /// Tenant id from the annotation. Without one, the namespace suffix is
    /// accepted only when it names the tenant that derives this namespace.
    fn tenant_of(&self, secret: &Manifest) -> Option<TenantId> {
        if let Some(raw) = secret.annotation(TENANT_ANNOTATION) {
            return TenantId::new(raw).ok();
        }
        let namespace = secret.namespace()?;
        let suffix = namespace.strip_prefix(self.naming.namespace_prefix())?;
        let tenant = TenantId::new(suffix).ok()?;
        (self.naming.namespace(&tenant) == namespace).then_some(tenant)
    }
}

/// Refuse to touch a Secret annotated as belonging to another tenant.
fn check_owner(secret: &Manifest, tenant: &TenantId) -> Result<(), RefresherError> {
    match secret.annotation(TENANT_ANNOTATION) {
        Some(owner) if owner != tenant.as_str() => Err(RefresherError::StorePersistFailed(format!(
            "{}/{} belongs to tenant {owner}, not {tenant}",
            secret.namespace().unwrap_or_default(),
            secret.name()
        ))),
        _ => Ok(()),
    }
}

fn token_fields(credential: &Credential) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(ACCESS_TOKEN_KEY.to_owned(), json!(credential.access_token));
    if !credential.refresh_token.is_empty() {
        fields.insert(REFRESH_TOKEN_KEY.to_owned(), json!(credential.refresh_token));
    }
    fields.insert(EXPIRY_KEY.to_owned(), json!(format_time(credential.expiry)));
    fields.insert(UPDATED_KEY.to_owned(), json!(format_time(credential.updated)));
    fields
}

fn decode(tenant: &TenantId, data: &BTreeMap<String, String>) -> Result<Credential, RefresherError> {
    let field = |key: &str| {
        data.get(key).ok_or_else(|| {
            RefresherError::StorePersistFailed(format!("credential for {tenant} has no {key}"))
        })
    };
    let time = |key: &str| {
        field(key).and_then(|v| {
            parse_time(v).map_err(|e| {
                RefresherError::StorePersistFailed(format!("credential for {tenant}: {key}: {e}"))
            })
        })
    };
    Ok(Credential {
        tenant: tenant.clone(),
        access_token: field(ACCESS_TOKEN_KEY)?.clone(),
        refresh_token: data.get(REFRESH_TOKEN_KEY).cloned().unwrap_or_default(),
        expiry: time(EXPIRY_KEY)?,
        updated: time(UPDATED_KEY)?,
    })
}

/// ISO-8601 / RFC 3339, keeping sub-second precision so values round-trip.
pub fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn parse_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn persist_failed(tenant: &TenantId, e: ClusterError) -> RefresherError {
    RefresherError::StorePersistFailed(format!("{tenant}: {e}"))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
