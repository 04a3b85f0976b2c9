// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization-code login: state issuance, code exchange, identity lookup.

use std::sync::Arc;

use chrono::Utc;

use crate::credential::Credential;
use crate::error::RefresherError;
use crate::oauth::client::OAuthClient;
use crate::oauth::session::{constant_time_eq, generate_state, SessionStore};
use crate::tenant::TenantId;

/// Where to send the browser to start a login.
#[derive(Debug, Clone)]
pub struct AuthRedirect {
    pub url: String,
    pub state: String,
}

pub struct OAuthExchanger {
    client: Arc<OAuthClient>,
    sessions: Arc<SessionStore>,
}

impl OAuthExchanger {
    pub fn new(client: Arc<OAuthClient>, sessions: Arc<SessionStore>) -> Self {
        Self { client, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Issue a fresh state for `session_id` and build the provider redirect.
    pub async fn begin_auth(&self, session_id: &str) -> AuthRedirect {
        let state = generate_state();
        self.sessions.set_pending(session_id, state.clone()).await;
        AuthRedirect { url: self.client.authorize_url(&state), state }
    }

    /// Verify `returned_state`, exchange `code`, and resolve the tenant.
    ///
    /// The session's pending state is consumed before anything else, so a
    /// replayed callback fails with `StateMismatch` whatever its outcome the
    /// first time. Neither the exchange nor the identity call is retried.
    pub async fn complete_auth(
        &self,
        session_id: &str,
        code: &str,
        returned_state: &str,
    ) -> Result<(TenantId, Credential), RefresherError> {
        let expected = self.sessions.take_pending(session_id).await;
        match expected {
            Some(ref want) if constant_time_eq(want, returned_state) => {}
            _ => return Err(RefresherError::StateMismatch),
        }

        let token = self.client.exchange_code(code).await?;
        let id = self.client.resolve_identity(&token.access_token).await?;
        let tenant = TenantId::new(id)
            .map_err(|e| RefresherError::IdentityResolutionFailed(e.to_string()))?;

        tracing::info!(tenant = %tenant, "login completed");
        let credential = Credential::from_token(tenant.clone(), token, Utc::now());
        Ok((tenant, credential))
    }
}

#[cfg(test)]
#[path = "exchanger_tests.rs"]
mod tests;
