//! Reconciliation logic for GCPBuild resources.
//!
//! One module per compute resource kind:
//! - `networks`: the VPC network
//! - `subnets`: subnetworks within the network
//! - `firewalls`: firewall rules
//! - `instances`: the build instance and its instance group membership
//! - `images`: capture of the stopped instance as a disk image
//!
//! Each service implements the shared [`Reconciler`] contract; the tick
//! driver runs them in dependency order (networks, subnets, firewalls,
//! instances, images) and in reverse for teardown.

pub mod firewalls;
pub mod images;
pub mod instances;
pub mod networks;
pub mod subnets;

#[cfg(test)]
mod images_test;
#[cfg(test)]
mod subnets_test;

use crate::backoff::BackoffRegistry;
use crate::error::ControllerError;
use crate::scope::BuildScope;
use crds::{GCPBuild, GCPBuildStatus};
use gcp_compute_client::{ComputeClientTrait, GcpComputeClient};
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Finalizer guaranteeing the delete pass runs before the build record
/// is removed.
pub const FINALIZER: &str = "gcp.forge.build/provisioner";

/// Requeue interval while a build is still converging.
const REQUEUE_CONVERGING: Duration = Duration::from_secs(60);
/// Requeue interval once a build reached its terminal ready state.
const REQUEUE_READY: Duration = Duration::from_secs(3600);

/// Shared contract of every resource reconciler.
///
/// `reconcile` performs the next corrective action toward desired state;
/// `Ok(())` means "at or converging toward desired state, safe to
/// proceed" and does not guarantee convergence is complete — callers
/// re-invoke on subsequent ticks until readiness shows up on the scope.
/// `delete` removes owned resources; an already-absent resource is
/// success.
#[async_trait::async_trait]
pub trait Reconciler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Move live state one step toward the desired spec.
    async fn reconcile(&self) -> Result<(), ControllerError>;

    /// Remove resources owned by this build.
    async fn delete(&self) -> Result<(), ControllerError>;
}

/// Builds the resource reconcilers in dependency order. Later resources
/// reference earlier resources' identifiers, so the order is fixed:
/// networks, subnets, firewalls, instances, images.
pub fn ordered_reconcilers<S, C>(scope: &Arc<S>, client: &Arc<C>) -> Vec<Box<dyn Reconciler>>
where
    S: networks::NetworkScope
        + subnets::SubnetScope
        + firewalls::FirewallScope
        + instances::InstanceScope
        + images::ImageScope
        + 'static,
    C: ComputeClientTrait + 'static,
{
    vec![
        Box::new(networks::Service::new(scope.clone(), client.clone())),
        Box::new(subnets::Service::new(scope.clone(), client.clone())),
        Box::new(firewalls::Service::new(scope.clone(), client.clone())),
        Box::new(instances::Service::new(
            scope.clone(),
            client.clone(),
            client.clone(),
        )),
        Box::new(images::Service::new(
            scope.clone(),
            client.clone(),
            client.clone(),
        )),
    ]
}

/// Drives one build's reconciliation tick: finalizer bookkeeping, the
/// ordered reconcile or delete pass, ready-flag promotion, and the
/// status patch.
pub struct BuildReconciler {
    kube: kube::Client,
    compute: Arc<GcpComputeClient>,
    /// Error tracking per build (namespace/name)
    backoffs: BackoffRegistry,
}

impl BuildReconciler {
    /// Creates a new build reconciler.
    pub fn new(kube: kube::Client, compute: Arc<GcpComputeClient>) -> Self {
        Self {
            kube,
            compute,
            backoffs: BackoffRegistry::default(),
        }
    }

    /// Runs one tick for the given build.
    pub async fn reconcile(&self, build: Arc<GCPBuild>) -> Result<Action, ControllerError> {
        let name = build
            .metadata
            .name
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig("GCPBuild missing name".to_string()))?;
        let namespace = build.metadata.namespace.as_deref().unwrap_or("default");
        let api: Api<GCPBuild> = Api::namespaced(self.kube.clone(), namespace);
        let key = format!("{namespace}/{name}");

        if build.metadata.deletion_timestamp.is_some() {
            let action = self.teardown(&api, &build, &name).await?;
            self.backoffs.forget(&key);
            return Ok(action);
        }

        self.ensure_finalizer(&api, &build, &name).await?;

        let scope = Arc::new(BuildScope::new(build.clone())?);
        match self.run_pass(&scope).await {
            Ok(()) => {
                scope.set_failure_message(None);
            }
            Err(e) => {
                scope.set_failure_message(Some(e.to_string()));
                // Best effort: surface the failure on the record even
                // though the tick errors out.
                if let Err(patch_err) = self.patch_status_if_changed(&api, &build, &scope).await {
                    warn!("Failed to record failure on {}: {}", key, patch_err);
                }
                return Err(e);
            }
        }

        // Terminal row of the export state machine: artifact present
        // means the build is done.
        if scope.artifact_ref().is_some() && !scope.is_ready() {
            info!("Build {} artifact captured, marking ready", key);
            scope.set_ready();
        }

        self.patch_status_if_changed(&api, &build, &scope).await?;
        if self.backoffs.reset(&key) {
            debug!("Build {} recovered, resetting backoff", key);
        }

        if scope.is_ready() {
            Ok(Action::requeue(REQUEUE_READY))
        } else {
            Ok(Action::requeue(REQUEUE_CONVERGING))
        }
    }

    async fn run_pass(&self, scope: &Arc<BuildScope>) -> Result<(), ControllerError> {
        for reconciler in ordered_reconcilers(scope, &self.compute) {
            debug!("Reconciling {} for build {}", reconciler.name(), scope.name());
            reconciler.reconcile().await?;
        }
        Ok(())
    }

    /// Runs the delete pass in reverse dependency order, then removes
    /// the finalizer so the record can go away.
    async fn teardown(
        &self,
        api: &Api<GCPBuild>,
        build: &Arc<GCPBuild>,
        name: &str,
    ) -> Result<Action, ControllerError> {
        if !build.finalizers().iter().any(|f| f == FINALIZER) {
            return Ok(Action::await_change());
        }

        info!("Tearing down build {}", name);
        let scope = Arc::new(BuildScope::new(build.clone())?);
        let mut reconcilers = ordered_reconcilers(&scope, &self.compute);
        reconcilers.reverse();
        for reconciler in reconcilers {
            debug!("Deleting {} for build {}", reconciler.name(), scope.name());
            reconciler.delete().await?;
        }

        let finalizers: Vec<&String> = build
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != FINALIZER)
            .collect();
        let patch = serde_json::json!({"metadata": {"finalizers": finalizers}});
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!("Build {} teardown complete", name);
        Ok(Action::await_change())
    }

    async fn ensure_finalizer(
        &self,
        api: &Api<GCPBuild>,
        build: &GCPBuild,
        name: &str,
    ) -> Result<(), ControllerError> {
        if build.finalizers().iter().any(|f| f == FINALIZER) {
            return Ok(());
        }
        let mut finalizers: Vec<String> = build.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        let patch = serde_json::json!({"metadata": {"finalizers": finalizers}});
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!("Added finalizer to build {}", name);
        Ok(())
    }

    async fn patch_status_if_changed(
        &self,
        api: &Api<GCPBuild>,
        build: &GCPBuild,
        scope: &BuildScope,
    ) -> Result<(), ControllerError> {
        let current = build.status.clone().unwrap_or_default();
        let desired = scope.status();
        if !owned_status_changed(&current, &desired) {
            return Ok(());
        }
        let name = scope.name();
        let patch = owned_status_patch(&desired);
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!("Updated status of build {}", name);
        Ok(())
    }

    /// Error policy hook: advances the build's Fibonacci backoff and
    /// returns the requeue action for a failed tick.
    pub fn failure_backoff(&self, build: &GCPBuild, err: &ControllerError) -> Action {
        let namespace = build.metadata.namespace.as_deref().unwrap_or("default");
        let name = build.metadata.name.as_deref().unwrap_or("<unknown>");
        let key = format!("{namespace}/{name}");

        let (errors, delay) = self.backoffs.failure(&key);
        error!(
            "Reconciliation of build {} failed ({} consecutive errors, retrying in {:?}): {}",
            key, errors, delay, err
        );
        Action::requeue(delay)
    }
}

/// Merge-patch body carrying only the status fields this controller
/// owns: `ready`, `artifactRef`, `failureMessage`. `provisionerReady`
/// belongs to the external provisioning agent; a body carrying it would
/// race the agent's write and reset the flag.
fn owned_status_patch(desired: &GCPBuildStatus) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "ready": desired.ready,
            "artifactRef": desired.artifact_ref,
            "failureMessage": desired.failure_message,
        }
    })
}

fn owned_status_changed(current: &GCPBuildStatus, desired: &GCPBuildStatus) -> bool {
    current.ready != desired.ready
        || current.artifact_ref != desired.artifact_ref
        || current.failure_message != desired.failure_message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_patch_never_touches_the_agent_flag() {
        // The common transient-failure path: only failureMessage set.
        let desired = GCPBuildStatus {
            failure_message: Some("compute API error: quota exceeded".to_string()),
            ..GCPBuildStatus::default()
        };

        let patch = owned_status_patch(&desired);
        let status = &patch["status"];
        assert!(status.get("provisionerReady").is_none());
        assert_eq!(status["ready"], false);
        assert_eq!(status["failureMessage"], "compute API error: quota exceeded");
        assert!(status["artifactRef"].is_null());
    }

    #[test]
    fn status_patch_carries_the_artifact_once_captured() {
        let desired = GCPBuildStatus {
            ready: true,
            artifact_ref: Some("projects/p/global/images/img-b1".to_string()),
            ..GCPBuildStatus::default()
        };

        let patch = owned_status_patch(&desired);
        let status = &patch["status"];
        assert!(status.get("provisionerReady").is_none());
        assert_eq!(status["ready"], true);
        assert_eq!(status["artifactRef"], "projects/p/global/images/img-b1");
    }

    #[test]
    fn agent_flag_alone_does_not_trigger_a_patch() {
        // The agent flipping provisionerReady mid-tick is its write to
        // make; the controller has nothing of its own to record.
        let current = GCPBuildStatus {
            provisioner_ready: true,
            ..GCPBuildStatus::default()
        };
        assert!(!owned_status_changed(&current, &GCPBuildStatus::default()));

        let done = GCPBuildStatus {
            ready: true,
            artifact_ref: Some("projects/p/global/images/img-b1".to_string()),
            ..GCPBuildStatus::default()
        };
        assert!(owned_status_changed(&current, &done));
    }
}
