//! Subnetwork reconciler.
//!
//! Ensures each declared subnet exists in its target region. Live
//! subnets are never updated in place: spec drift is left uncorrected
//! to avoid disrupting a network carrying traffic. Deletion is gated on
//! the ownership tag written into the subnet description at creation.

use super::Reconciler;
use crate::error::ControllerError;
use crate::scope::BuildScope;
use crds::labels::build_tag_key;
use gcp_compute_client::SubnetworksApi;
use gcp_compute_client::models::Subnetwork;
use std::sync::Arc;
use tracing::{debug, info};

const SERVICE_NAME: &str = "subnets";

/// The slice of scope the subnet reconciler consumes.
pub trait SubnetScope: Send + Sync {
    /// Build name, used for the ownership tag.
    fn name(&self) -> &str;
    /// Default region for subnets that don't pin one.
    fn region(&self) -> &str;
    /// Project the subnets live in.
    fn network_project(&self) -> &str;
    /// True when subnets are owned by a shared-VPC host project.
    fn is_shared_vpc(&self) -> bool;
    /// Desired subnetwork bodies; regions may be empty.
    fn subnet_specs(&self) -> Vec<Subnetwork>;
}

impl SubnetScope for BuildScope {
    fn name(&self) -> &str {
        BuildScope::name(self)
    }

    fn region(&self) -> &str {
        BuildScope::region(self)
    }

    fn network_project(&self) -> &str {
        BuildScope::network_project(self)
    }

    fn is_shared_vpc(&self) -> bool {
        BuildScope::is_shared_vpc(self)
    }

    fn subnet_specs(&self) -> Vec<Subnetwork> {
        BuildScope::subnet_specs(self)
    }
}

/// Reconciles the build's subnetworks.
pub struct Service<S> {
    scope: Arc<S>,
    subnetworks: Arc<dyn SubnetworksApi>,
}

impl<S: SubnetScope> Service<S> {
    /// Creates a new subnet service.
    pub fn new(scope: Arc<S>, subnetworks: Arc<dyn SubnetworksApi>) -> Self {
        Self { scope, subnetworks }
    }

    /// Desired subnets with their regions resolved against the build's
    /// default region.
    fn resolved_specs(&self) -> Vec<Subnetwork> {
        let default_region = self.scope.region().to_string();
        self.scope
            .subnet_specs()
            .into_iter()
            .map(|mut subnet| {
                if subnet.region.is_empty() {
                    subnet.region = default_region.clone();
                }
                subnet
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl<S: SubnetScope> Reconciler for Service<S> {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    async fn reconcile(&self) -> Result<(), ControllerError> {
        let project = self.scope.network_project();
        for desired in self.resolved_specs() {
            match self
                .subnetworks
                .get_subnetwork(project, &desired.region, &desired.name)
                .await
            {
                Ok(_) => {
                    // No update-in-place: drift is not corrected.
                    debug!("Subnetwork {} already exists", desired.name);
                }
                Err(e) if e.is_not_found() => {
                    if self.scope.is_shared_vpc() {
                        return Err(ControllerError::SharedVpcResourceMissing(format!(
                            "subnetwork {} not found in host project {project}",
                            desired.name
                        )));
                    }
                    info!(
                        "Creating subnetwork {} in region {}",
                        desired.name, desired.region
                    );
                    self.subnetworks
                        .insert_subnetwork(project, &desired.region, &desired)
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn delete(&self) -> Result<(), ControllerError> {
        if self.scope.is_shared_vpc() {
            debug!("Shared VPC mode, skipping subnetwork deletion");
            return Ok(());
        }
        let project = self.scope.network_project();
        let owned_tag = build_tag_key(self.scope.name());

        // Ownership gate, checked for every live subnet before the
        // first deletion: a subnet whose description matches neither
        // our tag nor the declared description is externally managed,
        // and a single foreign subnet halts the whole pass so nothing
        // gets partially torn down.
        let mut deletable = Vec::new();
        for desired in self.resolved_specs() {
            let live = match self
                .subnetworks
                .get_subnetwork(project, &desired.region, &desired.name)
                .await
            {
                Ok(live) => live,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };

            if live.description != owned_tag && live.description != desired.description {
                return Err(ControllerError::ForeignSubnet(format!(
                    "subnetwork {} (description {:?}) is not managed by build {}",
                    desired.name,
                    live.description,
                    self.scope.name()
                )));
            }
            deletable.push(desired);
        }

        for desired in deletable {
            info!(
                "Deleting subnetwork {} in region {}",
                desired.name, desired.region
            );
            match self
                .subnetworks
                .delete_subnetwork(project, &desired.region, &desired.name)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
