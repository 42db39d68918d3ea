//! Compute instance reconciler.
//!
//! Ensures exactly one instance matching the build's spec exists, and
//! keeps its instance group membership in sync when a group is
//! declared. Instance specs are immutable post-creation: resizing or
//! retyping requires recreation, which never happens automatically
//! while provisioning work may be in progress.

use super::Reconciler;
use crate::error::ControllerError;
use crate::scope::BuildScope;
use gcp_compute_client::models::Instance;
use gcp_compute_client::{InstanceGroupsApi, InstancesApi};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "instances";

/// The slice of scope the instance reconciler consumes.
pub trait InstanceScope: Send + Sync {
    /// Build name; doubles as the instance name.
    fn name(&self) -> &str;
    /// Project the instance lives in.
    fn project(&self) -> &str;
    /// Zone the instance runs in.
    fn zone(&self) -> &str;
    /// Desired instance body.
    fn instance_spec(&self) -> Instance;
    /// Instance group to register with, if any.
    fn instance_group(&self) -> Option<String>;
}

impl InstanceScope for BuildScope {
    fn name(&self) -> &str {
        BuildScope::name(self)
    }

    fn project(&self) -> &str {
        BuildScope::project(self)
    }

    fn zone(&self) -> &str {
        BuildScope::zone(self)
    }

    fn instance_spec(&self) -> Instance {
        BuildScope::instance_spec(self)
    }

    fn instance_group(&self) -> Option<String> {
        BuildScope::instance_group(self)
    }
}

/// Reconciles the build's compute instance.
pub struct Service<S> {
    scope: Arc<S>,
    instances: Arc<dyn InstancesApi>,
    instance_groups: Arc<dyn InstanceGroupsApi>,
}

impl<S: InstanceScope> Service<S> {
    /// Creates a new instance service.
    pub fn new(
        scope: Arc<S>,
        instances: Arc<dyn InstancesApi>,
        instance_groups: Arc<dyn InstanceGroupsApi>,
    ) -> Self {
        Self {
            scope,
            instances,
            instance_groups,
        }
    }

    /// Ensures the live instance is a member of its declared group. A
    /// missing group is logged and skipped: group provisioning is
    /// outside this build's ownership.
    async fn ensure_group_membership(&self, live: &Instance) -> Result<(), ControllerError> {
        let Some(group) = self.scope.instance_group() else {
            return Ok(());
        };
        if live.self_link.is_empty() {
            // Freshly inserted this tick; membership catches up next tick.
            return Ok(());
        }
        let project = self.scope.project();
        let zone = self.scope.zone();

        let members = match self
            .instance_groups
            .list_instance_group_instances(project, zone, &group)
            .await
        {
            Ok(members) => members,
            Err(e) if e.is_not_found() => {
                warn!("Instance group {} not found, skipping registration", group);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if members.iter().any(|m| m.instance == live.self_link) {
            debug!("Instance {} already in group {}", live.name, group);
            return Ok(());
        }

        info!("Adding instance {} to group {}", live.name, group);
        self.instance_groups
            .add_instance_to_group(project, zone, &group, &live.self_link)
            .await?;
        Ok(())
    }

    /// Removes the instance from its declared group before deletion,
    /// tolerating a group or membership that is already gone.
    async fn remove_group_membership(&self, live: &Instance) -> Result<(), ControllerError> {
        let Some(group) = self.scope.instance_group() else {
            return Ok(());
        };
        if live.self_link.is_empty() {
            return Ok(());
        }
        let project = self.scope.project();
        let zone = self.scope.zone();

        info!("Removing instance {} from group {}", live.name, group);
        match self
            .instance_groups
            .remove_instance_from_group(project, zone, &group, &live.self_link)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl<S: InstanceScope> Reconciler for Service<S> {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    async fn reconcile(&self) -> Result<(), ControllerError> {
        let project = self.scope.project();
        let zone = self.scope.zone();
        let name = self.scope.name();

        match self.instances.get_instance(project, zone, name).await {
            Ok(live) => {
                debug!("Instance {} already exists", name);
                self.ensure_group_membership(&live).await
            }
            Err(e) if e.is_not_found() => {
                let desired = self.scope.instance_spec();
                info!("Creating instance {} in zone {}", name, zone);
                self.instances.insert_instance(project, zone, &desired).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self) -> Result<(), ControllerError> {
        let project = self.scope.project();
        let zone = self.scope.zone();
        let name = self.scope.name();

        let live = match self.instances.get_instance(project, zone, name).await {
            Ok(live) => live,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.remove_group_membership(&live).await?;

        info!("Deleting instance {} in zone {}", name, zone);
        match self.instances.delete_instance(project, zone, name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_build, test_scope};
    use gcp_compute_client::MockComputeClient;

    fn service(scope: Arc<BuildScope>, mock: &MockComputeClient) -> Service<BuildScope> {
        Service::new(scope, Arc::new(mock.clone()), Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn creates_instance_once() {
        let mock = MockComputeClient::new();
        let svc = service(test_scope(test_build("b1")), &mock);

        assert!(svc.reconcile().await.is_ok());
        assert!(svc.reconcile().await.is_ok());
        assert_eq!(mock.call_count("instances.insert"), 1);
        assert!(mock.has_instance("p", "us-central1-a", "b1"));
    }

    #[tokio::test]
    async fn registers_instance_with_group() {
        let mut build = test_build("b1");
        build.spec.instance.instance_group = Some("build-workers".to_string());
        let mock = MockComputeClient::new();
        mock.add_instance_group("p", "us-central1-a", "build-workers", Vec::new());
        let svc = service(test_scope(build), &mock);

        // First tick inserts; second tick sees the self link and joins.
        assert!(svc.reconcile().await.is_ok());
        assert!(svc.reconcile().await.is_ok());
        let members = mock.group_members("p", "us-central1-a", "build-workers");
        assert_eq!(members.map(|m| m.len()), Some(1));

        // Already a member: no second add.
        assert!(svc.reconcile().await.is_ok());
        assert_eq!(mock.call_count("instanceGroups.addInstances"), 1);
    }

    #[tokio::test]
    async fn missing_group_does_not_fail_reconcile() {
        let mut build = test_build("b1");
        build.spec.instance.instance_group = Some("no-such-group".to_string());
        let mock = MockComputeClient::new();
        let svc = service(test_scope(build), &mock);

        assert!(svc.reconcile().await.is_ok());
        assert!(svc.reconcile().await.is_ok());
        assert_eq!(mock.call_count("instanceGroups.addInstances"), 0);
    }

    #[tokio::test]
    async fn delete_removes_membership_then_instance() {
        let mut build = test_build("b1");
        build.spec.instance.instance_group = Some("build-workers".to_string());
        let mock = MockComputeClient::new();
        mock.add_instance_group("p", "us-central1-a", "build-workers", Vec::new());
        let svc = service(test_scope(build), &mock);

        assert!(svc.reconcile().await.is_ok());
        assert!(svc.reconcile().await.is_ok());
        assert!(svc.delete().await.is_ok());

        assert!(!mock.has_instance("p", "us-central1-a", "b1"));
        let members = mock.group_members("p", "us-central1-a", "build-workers");
        assert_eq!(members.map(|m| m.len()), Some(0));
    }

    #[tokio::test]
    async fn delete_of_absent_instance_is_success() {
        let mock = MockComputeClient::new();
        let svc = service(test_scope(test_build("b1")), &mock);

        assert!(svc.delete().await.is_ok());
        assert_eq!(mock.call_count("instances.delete"), 0);
    }
}
