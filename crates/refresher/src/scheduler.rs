// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic multi-tenant token refresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::credential::{Credential, CredentialStore};
use crate::error::RefresherError;
use crate::oauth::client::OAuthClient;
use crate::oauth::Token;
use crate::tenant::TenantId;

/// What a sweep did for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TenantOutcome {
    /// New access token persisted.
    Refreshed,
    /// Provider returned the stored access token; nothing written.
    Unchanged,
    /// No stored credential, or no refresh token to use.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TenantResult {
    pub tenant: TenantId,
    #[serde(flatten)]
    pub outcome: TenantOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub tenants: Vec<TenantResult>,
}

impl SweepReport {
    pub fn count(&self, pred: impl Fn(&TenantOutcome) -> bool) -> usize {
        self.tenants.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn outcome(&self, tenant: &str) -> Option<&TenantOutcome> {
        self.tenants.iter().find(|r| r.tenant.as_str() == tenant).map(|r| &r.outcome)
    }

    pub fn refreshed(&self) -> usize {
        self.count(|o| *o == TenantOutcome::Refreshed)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TenantOutcome::Failed { .. }))
    }
}

pub struct RefreshScheduler {
    store: Arc<CredentialStore>,
    oauth: Arc<OAuthClient>,
    interval: Duration,
    tenant_timeout: Duration,
    concurrency: usize,
    /// Serialises sweeps so a manual sweep never overlaps the timer's.
    sweeping: Mutex<()>,
}

impl RefreshScheduler {
    pub fn new(
        store: Arc<CredentialStore>,
        oauth: Arc<OAuthClient>,
        interval: Duration,
        tenant_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            oauth,
            interval,
            tenant_timeout,
            concurrency: concurrency.max(1),
            sweeping: Mutex::new(()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One pass over every tenant known to the store.
    ///
    /// Only the enumeration can fail the sweep; each tenant's failure is
    /// recorded in the report and never affects the others.
    pub async fn sweep(&self) -> Result<SweepReport, RefresherError> {
        let _guard = self.sweeping.lock().await;
        let tenants = self.store.tenants().await?;
        tracing::debug!(tenants = tenants.len(), "sweep started");

        let tenants: Vec<TenantResult> = stream::iter(tenants)
            .map(|tenant| async move {
                let outcome = match self.refresh_tenant(&tenant).await {
                    Ok(outcome) => outcome,
                    Err(e) => TenantOutcome::Failed { reason: e.to_string() },
                };
                if let TenantOutcome::Failed { ref reason } = outcome {
                    tracing::warn!(tenant = %tenant, err = %reason, "refresh failed");
                }
                TenantResult { tenant, outcome }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let report = SweepReport { tenants };
        tracing::info!(
            tenants = report.tenants.len(),
            refreshed = report.refreshed(),
            failed = report.failed(),
            "sweep finished"
        );
        Ok(report)
    }

    /// Refresh one tenant. The tenant timeout bounds reading the credential
    /// and the provider call; once the provider has answered, the new token
    /// is always written, since a rotated refresh token cannot be recovered.
    async fn refresh_tenant(&self, tenant: &TenantId) -> Result<TenantOutcome, RefresherError> {
        let fetched = tokio::time::timeout(self.tenant_timeout, self.fetch_refreshed(tenant))
            .await
            .map_err(|_| {
                RefresherError::RefreshFailed(format!("timed out after {:?}", self.tenant_timeout))
            })??;
        let Some((current, token)) = fetched else {
            return Ok(TenantOutcome::Skipped);
        };

        match current.apply_refresh(token, Utc::now()) {
            None => {
                tracing::debug!(tenant = %tenant, "access token unchanged");
                Ok(TenantOutcome::Unchanged)
            }
            Some(next) => {
                self.store.put(&next).await?;
                tracing::info!(tenant = %tenant, expiry = %next.expiry, "refreshed token");
                Ok(TenantOutcome::Refreshed)
            }
        }
    }

    /// Stored credential and the provider's renewed token, or `None` when
    /// there is nothing to refresh.
    async fn fetch_refreshed(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<(Credential, Token)>, RefresherError> {
        let current = match self.store.get(tenant).await {
            Ok(credential) => credential,
            Err(RefresherError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if current.refresh_token.is_empty() {
            tracing::debug!(tenant = %tenant, "no refresh token stored");
            return Ok(None);
        }
        let token = self.oauth.refresh(&current.refresh_token).await?;
        Ok(Some((current, token)))
    }

    /// Sweep immediately, then every interval until `shutdown` fires.
    ///
    /// Cancellation is only observed between sweeps, so a sweep in progress
    /// always completes.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                if let Err(e) = self.sweep().await {
                    tracing::warn!(err = %e, "sweep failed to enumerate tenants");
                }
            }
            tracing::debug!("refresh scheduler stopped");
        })
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
