// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant credentials and their durable store.
//!
//! One Secret per tenant namespace holds the token material. The store is the
//! only writer of token fields; the exchanger and scheduler go through it.

pub mod store;

pub use store::{CredentialStore, CredentialSummary};

use std::fmt;

use chrono::{DateTime, Utc};

use crate::oauth::Token;
use crate::tenant::TenantId;

/// Secret data keys.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const EXPIRY_KEY: &str = "expiry";
pub const UPDATED_KEY: &str = "updated";

/// Label marking a Secret as managed by the refresher.
pub const MANAGED_LABEL: &str = "dj-kubelet.com/oauth-refresher";
/// Label carrying the namespace the credential was created for.
pub const NAMESPACE_LABEL: &str = "dj-kubelet.com/tenant-namespace";
/// Annotation carrying the unsanitised tenant id.
pub const TENANT_ANNOTATION: &str = "dj-kubelet.com/tenant";

/// A tenant's token material.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub tenant: TenantId,
    pub access_token: String,
    /// Empty when the provider never issued one.
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Credential {
    pub fn from_token(tenant: TenantId, token: Token, now: DateTime<Utc>) -> Self {
        Self {
            tenant,
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_default(),
            expiry: token.expiry,
            updated: now,
        }
    }

    /// The credential after a refresh returned `token`, or `None` when the
    /// provider handed back the access token already stored.
    ///
    /// A missing refresh token keeps the stored one.
    pub fn apply_refresh(&self, token: Token, now: DateTime<Utc>) -> Option<Credential> {
        if token.access_token == self.access_token {
            return None;
        }
        Some(Credential {
            tenant: self.tenant.clone(),
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_else(|| self.refresh_token.clone()),
            expiry: token.expiry,
            updated: now,
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("tenant", &self.tenant)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .field("updated", &self.updated)
            .finish()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
