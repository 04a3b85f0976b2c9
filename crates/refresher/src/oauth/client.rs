// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP calls against the provider's authorize, token, and identity endpoints.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use crate::error::RefresherError;
use crate::oauth::{urlencoded, ProviderConfig, Token, TokenResponse};

/// Install the ring crypto provider for rustls. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Build the shared provider HTTP client with a bounded request timeout.
pub fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    install_crypto_provider();
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    #[serde(default)]
    id: String,
}

/// Provider client: one per process, shared by the exchanger and scheduler.
pub struct OAuthClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: ProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Provider authorization URL carrying `state`.
    pub fn authorize_url(&self, state: &str) -> String {
        let scope = self.config.scopes.join(" ");
        let show_dialog = if self.config.show_dialog { "true" } else { "false" };
        let query = urlencoded(&[
            ("client_id", &self.config.client_id),
            ("response_type", "code"),
            ("redirect_uri", &self.config.redirect_uri),
            ("scope", &scope),
            ("state", state),
            ("show_dialog", show_dialog),
        ]);
        let sep = if self.config.authorize_url.contains('?') { '&' } else { '?' };
        format!("{}{sep}{query}", self.config.authorize_url)
    }

    /// Exchange an authorization code for a token.
    pub async fn exchange_code(&self, code: &str) -> Result<Token, RefresherError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_uri),
        ])
        .await
        .map_err(RefresherError::ExchangeFailed)
    }

    /// Renew a token from a stored refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Token, RefresherError> {
        self.token_request(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await
            .map_err(RefresherError::RefreshFailed)
    }

    /// Resolve the stable external user id for `access_token`.
    pub async fn resolve_identity(&self, access_token: &str) -> Result<String, RefresherError> {
        let resp = self
            .http
            .get(&self.config.identity_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| RefresherError::IdentityResolutionFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(RefresherError::IdentityResolutionFailed(format!("{status}: {text}")));
        }
        let identity: IdentityResponse = resp
            .json()
            .await
            .map_err(|e| RefresherError::IdentityResolutionFailed(e.to_string()))?;
        if identity.id.trim().is_empty() {
            return Err(RefresherError::IdentityResolutionFailed(
                "identity response has no id".to_owned(),
            ));
        }
        Ok(identity.id)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Token, String> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("token endpoint returned {status}: {text}"));
        }

        let token: TokenResponse = resp.json().await.map_err(|e| e.to_string())?;
        if token.access_token.is_empty() {
            return Err("token response has empty access_token".to_owned());
        }
        Ok(token.into_token(Utc::now()))
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
