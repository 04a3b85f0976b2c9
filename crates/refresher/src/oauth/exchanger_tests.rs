// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_support::{test_exchanger, MockProvider};

use super::*;

#[tokio::test]
async fn begin_auth_binds_state_to_session() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let exchanger = test_exchanger(provider.client()?);

    let redirect = exchanger.begin_auth("s1").await;
    assert!(redirect.url.contains(&format!("state={}", redirect.state)));
    assert_eq!(exchanger.sessions().take_pending("s1").await, Some(redirect.state));
    Ok(())
}

#[tokio::test]
async fn complete_auth_resolves_tenant_and_credential() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let exchanger = test_exchanger(provider.client()?);
    let redirect = exchanger.begin_auth("s1").await;

    let (tenant, credential) = exchanger.complete_auth("s1", "alice", &redirect.state).await?;
    assert_eq!(tenant.as_str(), "alice");
    assert_eq!(credential.tenant, tenant);
    assert_eq!(credential.access_token, "access-alice");
    assert_eq!(credential.refresh_token, "refresh-alice");
    assert!(credential.expiry > credential.updated);
    Ok(())
}

#[tokio::test]
async fn replayed_callback_is_state_mismatch() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let exchanger = test_exchanger(provider.client()?);
    let redirect = exchanger.begin_auth("s1").await;

    exchanger.complete_auth("s1", "alice", &redirect.state).await?;
    let replay = exchanger.complete_auth("s1", "alice", &redirect.state).await;
    assert!(matches!(replay, Err(RefresherError::StateMismatch)));
    assert_eq!(provider.token_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn wrong_state_consumes_pending_and_skips_provider() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let exchanger = test_exchanger(provider.client()?);
    let redirect = exchanger.begin_auth("s1").await;

    let wrong = exchanger.complete_auth("s1", "alice", "forged").await;
    assert!(matches!(wrong, Err(RefresherError::StateMismatch)));
    // The correct state no longer works either.
    let retry = exchanger.complete_auth("s1", "alice", &redirect.state).await;
    assert!(matches!(retry, Err(RefresherError::StateMismatch)));
    assert_eq!(provider.token_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_session_is_state_mismatch() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let exchanger = test_exchanger(provider.client()?);
    exchanger.begin_auth("s1").await;

    let result = exchanger.complete_auth("other", "alice", "anything").await;
    assert!(matches!(result, Err(RefresherError::StateMismatch)));
    Ok(())
}

#[tokio::test]
async fn failed_exchange_still_consumes_state() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let exchanger = test_exchanger(provider.client()?);
    let redirect = exchanger.begin_auth("s1").await;

    let first = exchanger.complete_auth("s1", "bad-code", &redirect.state).await;
    assert!(matches!(first, Err(RefresherError::ExchangeFailed(_))));
    let second = exchanger.complete_auth("s1", "alice", &redirect.state).await;
    assert!(matches!(second, Err(RefresherError::StateMismatch)));
    Ok(())
}

#[tokio::test]
async fn identity_failures_abort_login() -> anyhow::Result<()> {
    let provider = MockProvider::start().await?;
    let exchanger = test_exchanger(provider.client()?);
    for code in ["broken-user", "noid-user"] {
        let redirect = exchanger.begin_auth("s1").await;
        let result = exchanger.complete_auth("s1", code, &redirect.state).await;
        assert!(
            matches!(result, Err(RefresherError::IdentityResolutionFailed(_))),
            "{code}: {result:?}"
        );
    }
    Ok(())
}
