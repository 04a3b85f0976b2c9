// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::assert_err_contains;
use crate::error::RefresherError;
use crate::test_support::MockProvider;

use super::*;

#[tokio::test]
async fn authorize_url_carries_all_parameters() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let client = provider.client()?;
    let url = client.authorize_url("st4te");

    assert!(url.starts_with(&format!("{}/authorize?", provider.base_url)), "{url}");
    let query = url.split('?').nth(1).unwrap_or_default();
    let keys: Vec<&str> = query.split('&').filter_map(|p| p.split('=').next()).collect();
    assert_eq!(
        keys,
        ["client_id", "response_type", "redirect_uri", "scope", "state", "show_dialog"]
    );
    assert!(query.contains("state=st4te"));
    assert!(query.contains("show_dialog=true"));
    assert!(query.contains("scope=user-read-private%20user-modify-playback-state"));
    assert!(query.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8443%2Fcallback"));
    Ok(())
}

#[tokio::test]
async fn exchange_code_returns_token_with_expiry() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let client = provider.client()?;

    let before = Utc::now();
    let token = client.exchange_code("alice").await?;
    assert_eq!(token.access_token, "access-alice");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-alice"));
    assert!(token.expiry > before + chrono::Duration::minutes(59));
    assert_eq!(provider.token_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn rejected_code_is_exchange_failed() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let client = provider.client()?;

    let result = client.exchange_code("bad-code").await;
    assert!(matches!(result, Err(RefresherError::ExchangeFailed(_))));
    assert_err_contains!(client.exchange_code("bad-code").await, "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn unreachable_provider_is_exchange_failed() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let mut config = provider.provider_config();
    config.token_url = "http://127.0.0.1:1/api/token".to_owned();
    let client = OAuthClient::new(config, build_http_client(Duration::from_secs(1))?);

    let result = client.exchange_code("alice").await;
    assert!(matches!(result, Err(RefresherError::ExchangeFailed(_))));
    Ok(())
}

#[tokio::test]
async fn refresh_errors_are_refresh_failed() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let client = provider.client()?;

    let result = client.refresh("fail-revoked").await;
    assert!(matches!(result, Err(RefresherError::RefreshFailed(_))));

    let token = client.refresh("keep-me").await?;
    assert!(token.access_token.starts_with("fresh-"));
    assert_eq!(token.refresh_token, None);
    Ok(())
}

#[tokio::test]
async fn identity_failures() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let client = provider.client()?;
    for access_token in ["access-broken", "access-noid", "garbage"] {
        let result = client.resolve_identity(access_token).await;
        assert!(
            matches!(result, Err(RefresherError::IdentityResolutionFailed(_))),
            "{access_token}: {result:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn identity_resolves_id_field() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let client = provider.client()?;
    assert_eq!(client.resolve_identity("access-alice").await?, "alice");
    assert_eq!(provider.identity_calls(), 1);
    Ok(())
}
