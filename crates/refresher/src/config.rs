// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use crate::oauth::ProviderConfig;
use crate::provision::{ControllerTemplate, ProvisionerConfig};
use crate::tenant::Naming;

/// Where cluster objects live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterBackend {
    /// Kubernetes API server.
    Kube,
    /// In-process store; state is lost on exit.
    Memory,
}

impl std::fmt::Display for ClusterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kube => f.write_str("kube"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

impl std::str::FromStr for ClusterBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kube" | "kubernetes" => Ok(Self::Kube),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("invalid cluster backend: {other}"),
        }
    }
}

/// OAuth credential lifecycle manager for per-tenant namespaces.
#[derive(Debug, Clone, Parser)]
#[command(name = "oauth-refresher", version, about)]
pub struct RefresherConfig {
    /// Host address to bind to.
    #[arg(long, env = "REFRESHER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "REFRESHER_PORT", default_value_t = 8443)]
    pub port: u16,

    /// Externally reachable base URL; the OAuth redirect is `<base>/callback`.
    #[arg(long, env = "REFRESHER_BASE_URL", default_value = "https://localhost:8443")]
    pub base_url: String,

    /// OAuth client id.
    #[arg(long, env = "CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// OAuth client secret.
    #[arg(long, env = "CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,

    #[arg(
        long,
        env = "REFRESHER_AUTHORIZE_URL",
        default_value = "https://accounts.spotify.com/authorize"
    )]
    pub authorize_url: String,

    #[arg(
        long,
        env = "REFRESHER_TOKEN_URL",
        default_value = "https://accounts.spotify.com/api/token"
    )]
    pub token_url: String,

    /// Endpoint returning the user's identity (`id`) for a bearer token.
    #[arg(long, env = "REFRESHER_IDENTITY_URL", default_value = "https://api.spotify.com/v1/me")]
    pub identity_url: String,

    /// Requested scopes, comma separated.
    #[arg(
        long,
        env = "REFRESHER_SCOPES",
        value_delimiter = ',',
        default_value = "user-read-private,user-read-currently-playing,user-read-playback-state,user-modify-playback-state"
    )]
    pub scopes: Vec<String>,

    /// Ask the provider to show the consent dialog on every login.
    #[arg(
        long,
        env = "REFRESHER_SHOW_DIALOG",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub show_dialog: bool,

    /// Name of the credential Secret in each tenant namespace.
    #[arg(long, env = "REFRESHER_SECRET_NAME", default_value = "spotify-oauth")]
    pub secret_name: String,

    /// Value of the management label on credential Secrets.
    #[arg(long, env = "REFRESHER_MANAGED_LABEL_VALUE", default_value = "spotify")]
    pub managed_label_value: String,

    /// Seconds between refresh sweeps.
    #[arg(long, env = "REFRESHER_REFRESH_INTERVAL_SECS", default_value_t = 600)]
    pub refresh_interval_secs: u64,

    /// Timeout for each provider HTTP request, in seconds.
    #[arg(long, env = "REFRESHER_HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Upper bound on one tenant's refresh during a sweep, in seconds.
    #[arg(long, env = "REFRESHER_TENANT_TIMEOUT_SECS", default_value_t = 30)]
    pub tenant_timeout_secs: u64,

    /// Tenants refreshed concurrently during a sweep.
    #[arg(long, env = "REFRESHER_SWEEP_CONCURRENCY", default_value_t = 8)]
    pub sweep_concurrency: usize,

    /// Prefix of tenant namespace names.
    #[arg(long, env = "REFRESHER_NAMESPACE_PREFIX", default_value = "spotify-")]
    pub namespace_prefix: String,

    /// Prefix of tenant binding names (`<prefix>:<tenant>`).
    #[arg(long, env = "REFRESHER_BINDING_PREFIX", default_value = "dj-kubelet")]
    pub binding_prefix: String,

    /// ClusterRole granted cluster-wide to each tenant.
    #[arg(long, env = "REFRESHER_GLOBAL_ROLE", default_value = "dj-kubelet:user-global")]
    pub global_role: String,

    /// ClusterRole granted inside each tenant namespace.
    #[arg(long, env = "REFRESHER_NAMESPACE_ROLE", default_value = "dj-kubelet:user")]
    pub namespace_role: String,

    /// Namespace holding the per-tenant controller template.
    #[arg(long, env = "REFRESHER_CONTROLLER_NAMESPACE")]
    pub controller_namespace: Option<String>,

    /// Deployment copied from the controller template namespace.
    #[arg(long, env = "REFRESHER_CONTROLLER_DEPLOYMENT")]
    pub controller_deployment: Option<String>,

    /// Replica count of each tenant's controller.
    #[arg(long, env = "REFRESHER_CONTROLLER_REPLICAS", default_value_t = 1)]
    pub controller_replicas: u32,

    /// Lifetime of a pending login state, in seconds.
    #[arg(long, env = "REFRESHER_STATE_TTL_SECS", default_value_t = 600)]
    pub state_ttl_secs: u64,

    /// Cluster backend (kube, memory).
    #[arg(long, env = "REFRESHER_CLUSTER", default_value = "kube")]
    pub cluster: String,

    /// Kubernetes API URL. In-cluster service account settings when unset.
    #[arg(long, env = "REFRESHER_KUBE_URL")]
    pub kube_url: Option<String>,

    /// Bearer token for the Kubernetes API (with --kube-url).
    #[arg(long, env = "REFRESHER_KUBE_TOKEN", hide_env_values = true)]
    pub kube_token: Option<String>,

    /// PEM CA bundle for the Kubernetes API (with --kube-url).
    #[arg(long, env = "REFRESHER_KUBE_CA_FILE")]
    pub kube_ca_file: Option<std::path::PathBuf>,

    /// API server URL written into tenant kubeconfigs.
    #[arg(long, env = "REFRESHER_KUBECONFIG_SERVER", default_value = "https://localhost:44091")]
    pub kubeconfig_server: String,

    /// Bearer token for the admin API. If unset, the admin API is open.
    #[arg(long, env = "REFRESHER_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "REFRESHER_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "REFRESHER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl RefresherConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            anyhow::bail!("--client-id and --client-secret (CLIENT_ID/CLIENT_SECRET) are required");
        }
        if self.refresh_interval_secs == 0 {
            anyhow::bail!("--refresh-interval-secs must be greater than zero");
        }
        if self.sweep_concurrency == 0 {
            anyhow::bail!("--sweep-concurrency must be greater than zero");
        }
        if self.controller_namespace.is_some() && self.controller_deployment.is_none() {
            anyhow::bail!("--controller-namespace requires --controller-deployment");
        }
        if self.kube_url.is_none() && (self.kube_token.is_some() || self.kube_ca_file.is_some()) {
            anyhow::bail!("--kube-token and --kube-ca-file require --kube-url");
        }
        self.cluster_backend()?;
        Ok(())
    }

    pub fn cluster_backend(&self) -> anyhow::Result<ClusterBackend> {
        self.cluster.parse()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn tenant_timeout(&self) -> Duration {
        Duration::from_secs(self.tenant_timeout_secs)
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    pub fn redirect_uri(&self) -> String {
        format!("{}/callback", self.base_url.trim_end_matches('/'))
    }

    /// Whether session cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            authorize_url: self.authorize_url.clone(),
            token_url: self.token_url.clone(),
            identity_url: self.identity_url.clone(),
            redirect_uri: self.redirect_uri(),
            scopes: self.scopes.iter().map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect(),
            show_dialog: self.show_dialog,
        }
    }

    pub fn naming(&self) -> Naming {
        Naming::new(&self.namespace_prefix, &self.binding_prefix)
    }

    pub fn provisioner(&self) -> ProvisionerConfig {
        let controller = match (&self.controller_namespace, &self.controller_deployment) {
            (Some(namespace), Some(deployment)) => Some(ControllerTemplate {
                namespace: namespace.clone(),
                deployment: deployment.clone(),
                replicas: self.controller_replicas,
            }),
            _ => None,
        };
        ProvisionerConfig {
            global_role: self.global_role.clone(),
            namespace_role: self.namespace_role.clone(),
            controller,
        }
    }

    /// Build a minimal config for tests (memory cluster, port 0).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            base_url: "http://localhost:8443".into(),
            client_id: "test-client".into(),
            client_secret: "test-secret".into(),
            authorize_url: "http://127.0.0.1:1/authorize".into(),
            token_url: "http://127.0.0.1:1/api/token".into(),
            identity_url: "http://127.0.0.1:1/v1/me".into(),
            scopes: vec!["user-read-private".into()],
            show_dialog: true,
            secret_name: "spotify-oauth".into(),
            managed_label_value: "spotify".into(),
            refresh_interval_secs: 600,
            http_timeout_secs: 5,
            tenant_timeout_secs: 5,
            sweep_concurrency: 4,
            namespace_prefix: "spotify-".into(),
            binding_prefix: "dj-kubelet".into(),
            global_role: "dj-kubelet:user-global".into(),
            namespace_role: "dj-kubelet:user".into(),
            controller_namespace: None,
            controller_deployment: None,
            controller_replicas: 1,
            state_ttl_secs: 600,
            cluster: "memory".into(),
            kube_url: None,
            kube_token: None,
            kube_ca_file: None,
            kubeconfig_server: "https://localhost:44091".into(),
            auth_token: None,
            log_format: "text".into(),
            log_level: "debug".into(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
