// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant identity and the deterministic names derived from it.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RefresherError;

/// Maximum length of a DNS-1123 label (namespace and object names).
const MAX_LABEL_LEN: usize = 63;

/// External identity username, as returned by the provider's identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Result<Self, RefresherError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RefresherError::BadRequest("tenant id must not be empty".to_owned()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tenant id as a DNS-1123 label, used for object names. Distinct ids
    /// get distinct labels.
    pub fn object_name(&self) -> String {
        dns_label(&self.0, MAX_LABEL_LEN)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives cluster object names from a tenant id.
///
/// Every derivation is a pure function of the tenant id and the configured
/// prefix: the namespace name is the join key between a tenant, its
/// provisioned resources, and its stored credential.
#[derive(Debug, Clone)]
pub struct Naming {
    namespace_prefix: String,
    binding_prefix: String,
}

impl Naming {
    pub fn new(namespace_prefix: impl Into<String>, binding_prefix: impl Into<String>) -> Self {
        Self { namespace_prefix: namespace_prefix.into(), binding_prefix: binding_prefix.into() }
    }

    pub fn namespace_prefix(&self) -> &str {
        &self.namespace_prefix
    }

    /// Namespace holding all of a tenant's resources, e.g. `spotify-alice`.
    pub fn namespace(&self, tenant: &TenantId) -> String {
        let room = MAX_LABEL_LEN.saturating_sub(self.namespace_prefix.len()).max(1);
        format!("{}{}", self.namespace_prefix, dns_label(tenant.as_str(), room))
    }

    /// Service identity name inside the tenant namespace.
    pub fn service_account(&self, tenant: &TenantId) -> String {
        tenant.object_name()
    }

    /// Name shared by the tenant's cluster-scoped and namespace-scoped grants.
    pub fn binding(&self, tenant: &TenantId) -> String {
        format!("{}:{}", self.binding_prefix, tenant.object_name())
    }
}

/// Hex digits of the id digest carried by sanitised labels.
const HASH_LEN: usize = 8;

/// Reduce `raw` to a DNS-1123 label of at most `max_len` characters.
///
/// An id that already is a plain label (lowercase alphanumeric runs joined by
/// single dashes) maps to itself. Any other id is sanitised, truncated, and
/// suffixed with `--<digest>` of the raw id. Plain labels never contain `--`,
/// so distinct ids only share a label on a digest collision.
fn dns_label(raw: &str, max_len: usize) -> String {
    if raw.len() <= max_len && is_plain_label(raw) {
        return raw.to_owned();
    }

    let digest = Sha256::digest(raw.as_bytes());
    let hash: String = digest.iter().take(HASH_LEN / 2).map(|b| format!("{b:02x}")).collect();
    let room = max_len.saturating_sub(HASH_LEN + 2).max(1);

    let mut base = String::with_capacity(room);
    for c in raw.chars() {
        if base.len() >= room {
            break;
        }
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            base.push(c);
        } else if !base.is_empty() && !base.ends_with('-') {
            base.push('-');
        }
    }
    while base.ends_with('-') {
        base.pop();
    }
    if base.is_empty() {
        base.push('t');
    }
    format!("{base}--{hash}")
}

fn is_plain_label(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !s.starts_with('-')
        && !s.ends_with('-')
        && !s.contains("--")
}

#[cfg(test)]
#[path = "tenant_tests.rs"]
mod tests;
