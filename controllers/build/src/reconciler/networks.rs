//! VPC network reconciler.
//!
//! Ensures the build's VPC network exists. In shared-VPC mode the
//! network lives in the host project and must pre-exist; it is never
//! created or deleted from here.

use super::Reconciler;
use crate::error::ControllerError;
use crate::scope::BuildScope;
use crds::labels::build_tag_key;
use gcp_compute_client::NetworksApi;
use gcp_compute_client::models::Network;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "networks";

/// The slice of scope the network reconciler consumes.
pub trait NetworkScope: Send + Sync {
    /// Build name, used for the ownership tag.
    fn name(&self) -> &str;
    /// Project the network lives in.
    fn network_project(&self) -> &str;
    /// True when the network is owned by a shared-VPC host project.
    fn is_shared_vpc(&self) -> bool;
    /// Desired network body.
    fn network_spec(&self) -> Network;
}

impl NetworkScope for BuildScope {
    fn name(&self) -> &str {
        BuildScope::name(self)
    }

    fn network_project(&self) -> &str {
        BuildScope::network_project(self)
    }

    fn is_shared_vpc(&self) -> bool {
        BuildScope::is_shared_vpc(self)
    }

    fn network_spec(&self) -> Network {
        BuildScope::network_spec(self)
    }
}

/// Reconciles the build's VPC network.
pub struct Service<S> {
    scope: Arc<S>,
    networks: Arc<dyn NetworksApi>,
}

impl<S: NetworkScope> Service<S> {
    /// Creates a new network service.
    pub fn new(scope: Arc<S>, networks: Arc<dyn NetworksApi>) -> Self {
        Self { scope, networks }
    }
}

#[async_trait::async_trait]
impl<S: NetworkScope> Reconciler for Service<S> {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    async fn reconcile(&self) -> Result<(), ControllerError> {
        let desired = self.scope.network_spec();
        let project = self.scope.network_project();

        match self.networks.get_network(project, &desired.name).await {
            Ok(_) => {
                debug!("Network {} already exists", desired.name);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                if self.scope.is_shared_vpc() {
                    return Err(ControllerError::SharedVpcResourceMissing(format!(
                        "network {} not found in host project {project}",
                        desired.name
                    )));
                }
                info!("Creating network {} in project {}", desired.name, project);
                self.networks.insert_network(project, &desired).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self) -> Result<(), ControllerError> {
        if self.scope.is_shared_vpc() {
            debug!("Shared VPC mode, skipping network deletion");
            return Ok(());
        }
        let desired = self.scope.network_spec();
        let project = self.scope.network_project();

        let live = match self.networks.get_network(project, &desired.name).await {
            Ok(live) => live,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if live.description != build_tag_key(self.scope.name()) {
            warn!(
                "Network {} is not tagged for build {}, leaving it in place",
                desired.name,
                self.scope.name()
            );
            return Ok(());
        }

        info!("Deleting network {} in project {}", desired.name, project);
        match self.networks.delete_network(project, &desired.name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
