//! Compute client traits
//!
//! One narrow trait per resource type, so each reconciler depends only
//! on the calls it makes and tests can substitute mock implementations.
//! All methods take the project explicitly: a build may target a
//! different project than its shared-VPC host project.

use crate::error::ComputeError;
use crate::models::*;

/// Subnetwork operations (regional).
#[async_trait::async_trait]
pub trait SubnetworksApi: Send + Sync {
    /// Fetch a subnetwork by (name, region).
    async fn get_subnetwork(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Subnetwork, ComputeError>;

    /// Create a subnetwork.
    async fn insert_subnetwork(
        &self,
        project: &str,
        region: &str,
        subnetwork: &Subnetwork,
    ) -> Result<(), ComputeError>;

    /// Delete a subnetwork by (name, region).
    async fn delete_subnetwork(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<(), ComputeError>;
}

/// VPC network operations (global).
#[async_trait::async_trait]
pub trait NetworksApi: Send + Sync {
    /// Fetch a network by name.
    async fn get_network(&self, project: &str, name: &str) -> Result<Network, ComputeError>;

    /// Create a network.
    async fn insert_network(&self, project: &str, network: &Network) -> Result<(), ComputeError>;

    /// Delete a network by name.
    async fn delete_network(&self, project: &str, name: &str) -> Result<(), ComputeError>;
}

/// Firewall rule operations (global). Firewalls are never updated in
/// place; drift is not corrected.
#[async_trait::async_trait]
pub trait FirewallsApi: Send + Sync {
    /// Fetch a firewall rule by name.
    async fn get_firewall(&self, project: &str, name: &str) -> Result<Firewall, ComputeError>;

    /// Create a firewall rule.
    async fn insert_firewall(&self, project: &str, firewall: &Firewall)
    -> Result<(), ComputeError>;

    /// Delete a firewall rule by name.
    async fn delete_firewall(&self, project: &str, name: &str) -> Result<(), ComputeError>;
}

/// Instance operations (zonal).
#[async_trait::async_trait]
pub trait InstancesApi: Send + Sync {
    /// Fetch an instance by (name, zone).
    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Instance, ComputeError>;

    /// Create an instance.
    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &Instance,
    ) -> Result<(), ComputeError>;

    /// Delete an instance by (name, zone).
    async fn delete_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<(), ComputeError>;

    /// Stop an instance. Stopping an instance that is already stopping
    /// is not an error.
    async fn stop_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<(), ComputeError>;
}

/// Instance group membership operations (zonal).
#[async_trait::async_trait]
pub trait InstanceGroupsApi: Send + Sync {
    /// List the members of an instance group, following pagination.
    async fn list_instance_group_instances(
        &self,
        project: &str,
        zone: &str,
        group: &str,
    ) -> Result<Vec<InstanceWithNamedPorts>, ComputeError>;

    /// Add an instance (by full URL) to a group.
    async fn add_instance_to_group(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instance_url: &str,
    ) -> Result<(), ComputeError>;

    /// Remove an instance (by full URL) from a group.
    async fn remove_instance_from_group(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instance_url: &str,
    ) -> Result<(), ComputeError>;
}

/// Disk image operations (global).
#[async_trait::async_trait]
pub trait ImagesApi: Send + Sync {
    /// Fetch an image by name.
    async fn get_image(&self, project: &str, name: &str) -> Result<Image, ComputeError>;

    /// Create an image.
    async fn insert_image(&self, project: &str, image: &Image) -> Result<(), ComputeError>;

    /// Delete an image by name.
    async fn delete_image(&self, project: &str, name: &str) -> Result<(), ComputeError>;
}

/// The full compute API surface the provisioner consumes.
pub trait ComputeClientTrait:
    SubnetworksApi + NetworksApi + FirewallsApi + InstancesApi + InstanceGroupsApi + ImagesApi
{
}

impl<T> ComputeClientTrait for T where
    T: SubnetworksApi + NetworksApi + FirewallsApi + InstancesApi + InstanceGroupsApi + ImagesApi
{
}
