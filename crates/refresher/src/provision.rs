// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-tenant resource provisioning.
//!
//! Provisioning is an ordered list of idempotent steps. A failed step is
//! recorded and the remaining steps still run; the reported state is the
//! highest one reached without a gap. There is no rollback: re-running
//! [`TenantProvisioner::provision`] repeats every step and converges.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::cluster::{Kind, Manifest, ResourceClient};
use crate::credential::TENANT_ANNOTATION;
use crate::error::RefresherError;
use crate::tenant::{Naming, TenantId};

/// Provisioning progress, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Unprovisioned,
    NamespaceReady,
    IdentityBound,
    GrantsBound,
    ControllerDeployed,
    Ready,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unprovisioned => "unprovisioned",
            Self::NamespaceReady => "namespace_ready",
            Self::IdentityBound => "identity_bound",
            Self::GrantsBound => "grants_bound",
            Self::ControllerDeployed => "controller_deployed",
            Self::Ready => "ready",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Namespace,
    ServiceAccount,
    ClusterGrant,
    NamespaceGrant,
    Controller,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Namespace,
        Step::ServiceAccount,
        Step::ClusterGrant,
        Step::NamespaceGrant,
        Step::Controller,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::ServiceAccount => "service_account",
            Self::ClusterGrant => "cluster_grant",
            Self::NamespaceGrant => "namespace_grant",
            Self::Controller => "controller",
        }
    }

    /// State reached once this step and every earlier one succeeded.
    /// The cluster grant alone does not complete the grants.
    fn reaches(&self) -> Option<ProvisioningState> {
        match self {
            Self::Namespace => Some(ProvisioningState::NamespaceReady),
            Self::ServiceAccount => Some(ProvisioningState::IdentityBound),
            Self::ClusterGrant => None,
            Self::NamespaceGrant => Some(ProvisioningState::GrantsBound),
            Self::Controller => Some(ProvisioningState::ControllerDeployed),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Created,
    AlreadyExists,
    /// Step not configured (the controller template is optional).
    Skipped,
    Failed { reason: String },
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: Step,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Aggregated result of one provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningReport {
    pub tenant: TenantId,
    pub namespace: String,
    pub steps: Vec<StepResult>,
    pub state: ProvisioningState,
}

impl ProvisioningReport {
    fn new(tenant: TenantId, namespace: String, steps: Vec<StepResult>) -> Self {
        let state = contiguous_state(&steps);
        Self { tenant, namespace, steps, state }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ProvisioningState::Ready
    }

    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| &r.outcome)
    }

    /// One `ProvisioningStepFailed` per failed step.
    pub fn failures(&self) -> Vec<RefresherError> {
        self.steps
            .iter()
            .filter_map(|r| match &r.outcome {
                StepOutcome::Failed { reason } => Some(RefresherError::ProvisioningStepFailed {
                    step: r.step.as_str(),
                    reason: reason.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

fn contiguous_state(steps: &[StepResult]) -> ProvisioningState {
    let mut state = ProvisioningState::Unprovisioned;
    for result in steps {
        if !result.outcome.is_ok() {
            return state;
        }
        if result.outcome == StepOutcome::Skipped {
            continue;
        }
        if let Some(reached) = result.step.reaches() {
            state = reached;
        }
    }
    ProvisioningState::Ready
}

/// Shared template a per-tenant controller is copied from.
#[derive(Debug, Clone)]
pub struct ControllerTemplate {
    pub namespace: String,
    pub deployment: String,
    pub replicas: u32,
}

#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// ClusterRole bound cluster-wide.
    pub global_role: String,
    /// ClusterRole bound inside the tenant namespace.
    pub namespace_role: String,
    pub controller: Option<ControllerTemplate>,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            global_role: "dj-kubelet:user-global".to_owned(),
            namespace_role: "dj-kubelet:user".to_owned(),
            controller: None,
        }
    }
}

pub struct TenantProvisioner {
    cluster: Arc<dyn ResourceClient>,
    naming: Naming,
    config: ProvisionerConfig,
}

impl TenantProvisioner {
    pub fn new(cluster: Arc<dyn ResourceClient>, naming: Naming, config: ProvisionerConfig) -> Self {
        Self { cluster, naming, config }
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Run every provisioning step for `tenant`.
    pub async fn provision(&self, tenant: &TenantId) -> ProvisioningReport {
        let namespace = self.naming.namespace(tenant);
        let mut steps = Vec::with_capacity(Step::ALL.len());
        for step in Step::ALL {
            let outcome = self.run_step(step, tenant, &namespace).await;
            match &outcome {
                StepOutcome::Created => {
                    tracing::info!(tenant = %tenant, namespace = %namespace, step = %step, "created");
                }
                StepOutcome::AlreadyExists | StepOutcome::Skipped => {
                    tracing::debug!(tenant = %tenant, step = %step, ?outcome, "unchanged");
                }
                StepOutcome::Failed { reason } => {
                    tracing::warn!(
                        tenant = %tenant,
                        namespace = %namespace,
                        step = %step,
                        err = %reason,
                        "provisioning step failed"
                    );
                }
            }
            steps.push(StepResult { step, outcome });
        }
        let report = ProvisioningReport::new(tenant.clone(), namespace, steps);
        tracing::info!(tenant = %tenant, state = %report.state, "provisioned");
        report
    }

    async fn run_step(&self, step: Step, tenant: &TenantId, namespace: &str) -> StepOutcome {
        let service_account = self.naming.service_account(tenant);
        let binding = self.naming.binding(tenant);
        let subjects = json!([{
            "kind": "ServiceAccount",
            "name": service_account,
            "namespace": namespace,
        }]);
        match step {
            Step::Namespace => {
                let manifest = Manifest::new(Kind::Namespace, None, namespace)
                    .with_annotation(TENANT_ANNOTATION, tenant.as_str());
                self.ensure(manifest).await
            }
            Step::ServiceAccount => {
                let manifest = Manifest::new(Kind::ServiceAccount, Some(namespace), &service_account);
                self.ensure(manifest).await
            }
            Step::ClusterGrant => {
                let manifest = Manifest::new(Kind::ClusterRoleBinding, None, &binding)
                    .with_field("roleRef", cluster_role_ref(&self.config.global_role))
                    .with_field("subjects", subjects);
                self.ensure(manifest).await
            }
            Step::NamespaceGrant => {
                let manifest = Manifest::new(Kind::RoleBinding, Some(namespace), &binding)
                    .with_field("roleRef", cluster_role_ref(&self.config.namespace_role))
                    .with_field("subjects", subjects);
                self.ensure(manifest).await
            }
            Step::Controller => match &self.config.controller {
                None => StepOutcome::Skipped,
                Some(template) => self.copy_controller(template, namespace).await,
            },
        }
    }

    /// Create `manifest`, treating "already exists" as success.
    async fn ensure(&self, manifest: Manifest) -> StepOutcome {
        match self.cluster.create(manifest).await {
            Ok(_) => StepOutcome::Created,
            Err(e) if e.is_already_exists() => StepOutcome::AlreadyExists,
            Err(e) => StepOutcome::Failed { reason: e.to_string() },
        }
    }

    /// Copy the template's Roles, RoleBindings, and Deployment into
    /// `namespace`. Every object is attempted; the step fails if any does.
    async fn copy_controller(&self, template: &ControllerTemplate, namespace: &str) -> StepOutcome {
        let mut manifests = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for kind in [Kind::Role, Kind::RoleBinding] {
            match self.cluster.list(kind, Some(&template.namespace), None).await {
                Ok(items) => manifests.extend(items),
                Err(e) => errors.push(e.to_string()),
            }
        }
        match self.cluster.get(Kind::Deployment, Some(&template.namespace), &template.deployment).await
        {
            Ok(deployment) => manifests.push(deployment),
            Err(e) => errors.push(e.to_string()),
        }

        let mut created = false;
        for manifest in manifests {
            let copy = retarget(manifest, &template.namespace, namespace, template.replicas);
            match self.ensure(copy).await {
                StepOutcome::Created => created = true,
                StepOutcome::Failed { reason } => errors.push(reason),
                StepOutcome::AlreadyExists | StepOutcome::Skipped => {}
            }
        }

        if !errors.is_empty() {
            StepOutcome::Failed { reason: errors.join("; ") }
        } else if created {
            StepOutcome::Created
        } else {
            StepOutcome::AlreadyExists
        }
    }
}

fn cluster_role_ref(name: &str) -> Value {
    json!({ "apiGroup": "rbac.authorization.k8s.io", "kind": "ClusterRole", "name": name })
}

/// Prepare a template object for creation in `to`: strip server fields,
/// move it, point namespaced subjects at `to`, and scale Deployments.
fn retarget(mut manifest: Manifest, from: &str, to: &str, replicas: u32) -> Manifest {
    manifest.strip_server_fields();
    manifest.set_namespace(to);
    match manifest.kind() {
        Some(Kind::RoleBinding) => {
            if let Some(Value::Array(subjects)) = manifest.field_mut("subjects") {
                for subject in subjects.iter_mut().filter_map(Value::as_object_mut) {
                    if subject.get("namespace").and_then(Value::as_str) == Some(from) {
                        subject.insert("namespace".to_owned(), Value::String(to.to_owned()));
                    }
                }
            }
        }
        Some(Kind::Deployment) => {
            manifest.apply_merge_patch(&json!({ "spec": { "replicas": replicas } }));
        }
        _ => {}
    }
    manifest
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
