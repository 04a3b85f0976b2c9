// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cluster::kube::KubeClient;
use crate::cluster::memory::MemoryCluster;
use crate::cluster::ResourceClient;
use crate::config::{ClusterBackend, RefresherConfig};
use crate::credential::CredentialStore;
use crate::oauth::client::{build_http_client, OAuthClient};
use crate::oauth::exchanger::OAuthExchanger;
use crate::oauth::session::SessionStore;
use crate::provision::TenantProvisioner;
use crate::scheduler::RefreshScheduler;

/// Every long-lived component, built once from the config and shared by
/// the HTTP handlers and background tasks.
pub struct AppState {
    pub config: RefresherConfig,
    pub cluster: Arc<dyn ResourceClient>,
    pub sessions: Arc<SessionStore>,
    pub exchanger: OAuthExchanger,
    pub provisioner: TenantProvisioner,
    pub store: Arc<CredentialStore>,
    pub scheduler: Arc<RefreshScheduler>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: RefresherConfig,
        cluster: Arc<dyn ResourceClient>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let http = build_http_client(config.http_timeout())?;
        let oauth = Arc::new(OAuthClient::new(config.provider(), http));
        let naming = config.naming();

        let sessions = Arc::new(SessionStore::new(config.state_ttl()));
        let exchanger = OAuthExchanger::new(Arc::clone(&oauth), Arc::clone(&sessions));
        let provisioner =
            TenantProvisioner::new(Arc::clone(&cluster), naming.clone(), config.provisioner());
        let store = Arc::new(CredentialStore::new(
            Arc::clone(&cluster),
            naming,
            &config.secret_name,
            &config.managed_label_value,
        ));
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&store),
            oauth,
            config.refresh_interval(),
            config.tenant_timeout(),
            config.sweep_concurrency,
        ));

        Ok(Self {
            config,
            cluster,
            sessions,
            exchanger,
            provisioner,
            store,
            scheduler,
            shutdown,
        })
    }
}

/// Connect to the configured cluster backend.
pub fn connect_cluster(config: &RefresherConfig) -> anyhow::Result<Arc<dyn ResourceClient>> {
    match config.cluster_backend()? {
        ClusterBackend::Memory => {
            tracing::warn!("using in-memory cluster; state is lost on exit");
            Ok(Arc::new(MemoryCluster::new()))
        }
        ClusterBackend::Kube => {
            let client = match &config.kube_url {
                Some(url) => {
                    let ca = config.kube_ca_file.as_ref().map(std::fs::read).transpose()?;
                    KubeClient::new(
                        url.clone(),
                        config.kube_token.clone(),
                        ca.as_deref(),
                        config.http_timeout(),
                    )?
                }
                None => KubeClient::in_cluster(config.http_timeout())?,
            };
            Ok(Arc::new(client))
        }
    }
}
