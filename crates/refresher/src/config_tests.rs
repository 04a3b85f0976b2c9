// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn parse(args: &[&str]) -> RefresherConfig {
    RefresherConfig::parse_from(args)
}

const CREDS: [&str; 5] = ["oauth-refresher", "--client-id", "id", "--client-secret", "secret"];

fn with_creds(extra: &[&'static str]) -> Vec<&'static str> {
    CREDS.iter().copied().chain(extra.iter().copied()).collect()
}

#[test]
fn defaults_match_deployment() -> anyhow::Result<()> {
    let config = parse(&CREDS);
    config.validate()?;
    assert_eq!(config.port, 8443);
    assert_eq!(config.refresh_interval(), Duration::from_secs(600));
    assert_eq!(config.secret_name, "spotify-oauth");
    assert_eq!(config.redirect_uri(), "https://localhost:8443/callback");
    assert_eq!(config.cluster_backend()?, ClusterBackend::Kube);
    assert!(config.show_dialog);
    assert_eq!(config.scopes.len(), 4);
    assert!(config.provisioner().controller.is_none());
    Ok(())
}

#[yare::parameterized(
    missing_creds       = { &["oauth-refresher"], "--client-id" },
    zero_interval       = { &["oauth-refresher", "--client-id", "a", "--client-secret", "b", "--refresh-interval-secs", "0"], "refresh-interval" },
    zero_concurrency    = { &["oauth-refresher", "--client-id", "a", "--client-secret", "b", "--sweep-concurrency", "0"], "concurrency" },
    template_no_deploy  = { &["oauth-refresher", "--client-id", "a", "--client-secret", "b", "--controller-namespace", "tpl"], "--controller-deployment" },
    token_without_url   = { &["oauth-refresher", "--client-id", "a", "--client-secret", "b", "--kube-token", "t"], "--kube-url" },
    bad_backend         = { &["oauth-refresher", "--client-id", "a", "--client-secret", "b", "--cluster", "etcd"], "invalid cluster backend" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let config = parse(args);
    crate::assert_err_contains!(config.validate(), expected_substr);
}

#[test]
fn provider_config_derives_redirect_and_scopes() {
    let config = parse(&with_creds(&[
        "--base-url",
        "https://dj.example.com/",
        "--scopes",
        "a, b,,c",
        "--show-dialog",
        "false",
    ]));
    let provider = config.provider();
    assert_eq!(provider.redirect_uri, "https://dj.example.com/callback");
    assert_eq!(provider.scopes, ["a", "b", "c"]);
    assert!(!provider.show_dialog);
    assert!(config.secure_cookies());
}

#[test]
fn controller_template_is_built_when_configured() -> anyhow::Result<()> {
    let config = parse(&with_creds(&[
        "--controller-namespace",
        "template",
        "--controller-deployment",
        "player",
        "--controller-replicas",
        "2",
    ]));
    config.validate()?;
    let controller = config.provisioner().controller;
    let controller = controller.ok_or_else(|| anyhow::anyhow!("controller missing"))?;
    assert_eq!(controller.namespace, "template");
    assert_eq!(controller.deployment, "player");
    assert_eq!(controller.replicas, 2);
    Ok(())
}

#[yare::parameterized(
    kube       = { "kube", ClusterBackend::Kube },
    kubernetes = { "Kubernetes", ClusterBackend::Kube },
    memory     = { "memory", ClusterBackend::Memory },
)]
fn backend_parsing(input: &str, expected: ClusterBackend) {
    assert_eq!(input.parse::<ClusterBackend>().ok(), Some(expected));
}

#[test]
fn test_config_is_valid() -> anyhow::Result<()> {
    let config = RefresherConfig::test();
    config.validate()?;
    assert_eq!(config.cluster_backend()?, ClusterBackend::Memory);
    assert!(!config.secure_cookies());
    Ok(())
}
