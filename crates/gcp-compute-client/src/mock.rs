//! Mock compute client for unit testing
//!
//! In-memory implementation of the compute traits so reconcilers can be
//! tested without a cloud project. Stores resources per (project, key)
//! and counts every call, letting tests assert idempotency ("second
//! reconcile makes zero insert calls") and skip behavior ("shared-VPC
//! delete makes zero API calls").

use crate::error::ComputeError;
use crate::models::*;
use crate::{
    FirewallsApi, ImagesApi, InstanceGroupsApi, InstancesApi, NetworksApi, SubnetworksApi,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Key2 = (String, String);
type Key3 = (String, String, String);

/// Mock compute client backed by in-memory stores.
#[derive(Debug, Clone, Default)]
pub struct MockComputeClient {
    networks: Arc<Mutex<HashMap<Key2, Network>>>,
    subnetworks: Arc<Mutex<HashMap<Key3, Subnetwork>>>,
    firewalls: Arc<Mutex<HashMap<Key2, Firewall>>>,
    instances: Arc<Mutex<HashMap<Key3, Instance>>>,
    instance_groups: Arc<Mutex<HashMap<Key3, Vec<String>>>>,
    images: Arc<Mutex<HashMap<Key2, Image>>>,
    calls: Arc<Mutex<HashMap<&'static str, u32>>>,
}

impl MockComputeClient {
    /// Create an empty mock client.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
    }

    /// Number of times the given operation was called, e.g.
    /// "subnetworks.insert".
    pub fn call_count(&self, op: &str) -> u32 {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Total number of API calls made against the mock.
    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    /// Seed a network (for test setup).
    pub fn add_network(&self, project: &str, network: Network) {
        self.networks
            .lock()
            .unwrap()
            .insert((project.to_string(), network.name.clone()), network);
    }

    /// Seed a subnetwork (for test setup).
    pub fn add_subnetwork(&self, project: &str, region: &str, subnetwork: Subnetwork) {
        self.subnetworks.lock().unwrap().insert(
            (
                project.to_string(),
                region.to_string(),
                subnetwork.name.clone(),
            ),
            subnetwork,
        );
    }

    /// Seed a firewall rule (for test setup).
    pub fn add_firewall(&self, project: &str, firewall: Firewall) {
        self.firewalls
            .lock()
            .unwrap()
            .insert((project.to_string(), firewall.name.clone()), firewall);
    }

    /// Seed an instance (for test setup).
    pub fn add_instance(&self, project: &str, zone: &str, instance: Instance) {
        self.instances.lock().unwrap().insert(
            (
                project.to_string(),
                zone.to_string(),
                instance.name.clone(),
            ),
            instance,
        );
    }

    /// Seed an (empty or pre-populated) instance group (for test setup).
    pub fn add_instance_group(&self, project: &str, zone: &str, group: &str, members: Vec<String>) {
        self.instance_groups.lock().unwrap().insert(
            (project.to_string(), zone.to_string(), group.to_string()),
            members,
        );
    }

    /// Seed an image (for test setup).
    pub fn add_image(&self, project: &str, image: Image) {
        self.images
            .lock()
            .unwrap()
            .insert((project.to_string(), image.name.clone()), image);
    }

    /// Force an instance's observed lifecycle state.
    pub fn set_instance_status(&self, project: &str, zone: &str, name: &str, status: InstanceStatus) {
        if let Some(instance) = self.instances.lock().unwrap().get_mut(&(
            project.to_string(),
            zone.to_string(),
            name.to_string(),
        )) {
            instance.status = Some(status);
        }
    }

    /// Force an image's observed state.
    pub fn set_image_status(&self, project: &str, name: &str, status: ImageStatus) {
        if let Some(image) = self
            .images
            .lock()
            .unwrap()
            .get_mut(&(project.to_string(), name.to_string()))
        {
            image.status = Some(status);
        }
    }

    /// Current members of an instance group, if it exists.
    pub fn group_members(&self, project: &str, zone: &str, group: &str) -> Option<Vec<String>> {
        self.instance_groups
            .lock()
            .unwrap()
            .get(&(project.to_string(), zone.to_string(), group.to_string()))
            .cloned()
    }

    /// True if the named subnetwork exists in the store.
    pub fn has_subnetwork(&self, project: &str, region: &str, name: &str) -> bool {
        self.subnetworks.lock().unwrap().contains_key(&(
            project.to_string(),
            region.to_string(),
            name.to_string(),
        ))
    }

    /// True if the named image exists in the store.
    pub fn has_image(&self, project: &str, name: &str) -> bool {
        self.images
            .lock()
            .unwrap()
            .contains_key(&(project.to_string(), name.to_string()))
    }

    /// True if the named instance exists in the store.
    pub fn has_instance(&self, project: &str, zone: &str, name: &str) -> bool {
        self.instances.lock().unwrap().contains_key(&(
            project.to_string(),
            zone.to_string(),
            name.to_string(),
        ))
    }

    /// Fetch a stored image (for assertions on insert bodies).
    pub fn image(&self, project: &str, name: &str) -> Option<Image> {
        self.images
            .lock()
            .unwrap()
            .get(&(project.to_string(), name.to_string()))
            .cloned()
    }

    fn instance_self_link(project: &str, zone: &str, name: &str) -> String {
        format!("https://compute.mock/projects/{project}/zones/{zone}/instances/{name}")
    }
}

#[async_trait::async_trait]
impl SubnetworksApi for MockComputeClient {
    async fn get_subnetwork(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Subnetwork, ComputeError> {
        self.record("subnetworks.get");
        self.subnetworks
            .lock()
            .unwrap()
            .get(&(project.to_string(), region.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ComputeError::NotFound(format!("subnetwork {name}")))
    }

    async fn insert_subnetwork(
        &self,
        project: &str,
        region: &str,
        subnetwork: &Subnetwork,
    ) -> Result<(), ComputeError> {
        self.record("subnetworks.insert");
        let mut stored = subnetwork.clone();
        stored.region = region.to_string();
        self.subnetworks.lock().unwrap().insert(
            (
                project.to_string(),
                region.to_string(),
                stored.name.clone(),
            ),
            stored,
        );
        Ok(())
    }

    async fn delete_subnetwork(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<(), ComputeError> {
        self.record("subnetworks.delete");
        self.subnetworks
            .lock()
            .unwrap()
            .remove(&(project.to_string(), region.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| ComputeError::NotFound(format!("subnetwork {name}")))
    }
}

#[async_trait::async_trait]
impl NetworksApi for MockComputeClient {
    async fn get_network(&self, project: &str, name: &str) -> Result<Network, ComputeError> {
        self.record("networks.get");
        self.networks
            .lock()
            .unwrap()
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ComputeError::NotFound(format!("network {name}")))
    }

    async fn insert_network(&self, project: &str, network: &Network) -> Result<(), ComputeError> {
        self.record("networks.insert");
        self.networks
            .lock()
            .unwrap()
            .insert((project.to_string(), network.name.clone()), network.clone());
        Ok(())
    }

    async fn delete_network(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        self.record("networks.delete");
        self.networks
            .lock()
            .unwrap()
            .remove(&(project.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| ComputeError::NotFound(format!("network {name}")))
    }
}

#[async_trait::async_trait]
impl FirewallsApi for MockComputeClient {
    async fn get_firewall(&self, project: &str, name: &str) -> Result<Firewall, ComputeError> {
        self.record("firewalls.get");
        self.firewalls
            .lock()
            .unwrap()
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ComputeError::NotFound(format!("firewall {name}")))
    }

    async fn insert_firewall(
        &self,
        project: &str,
        firewall: &Firewall,
    ) -> Result<(), ComputeError> {
        self.record("firewalls.insert");
        self.firewalls.lock().unwrap().insert(
            (project.to_string(), firewall.name.clone()),
            firewall.clone(),
        );
        Ok(())
    }

    async fn delete_firewall(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        self.record("firewalls.delete");
        self.firewalls
            .lock()
            .unwrap()
            .remove(&(project.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| ComputeError::NotFound(format!("firewall {name}")))
    }
}

#[async_trait::async_trait]
impl InstancesApi for MockComputeClient {
    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Instance, ComputeError> {
        self.record("instances.get");
        self.instances
            .lock()
            .unwrap()
            .get(&(project.to_string(), zone.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ComputeError::NotFound(format!("instance {name}")))
    }

    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &Instance,
    ) -> Result<(), ComputeError> {
        self.record("instances.insert");
        let mut stored = instance.clone();
        stored.status = Some(InstanceStatus::Running);
        stored.self_link = Self::instance_self_link(project, zone, &stored.name);
        stored.zone = zone.to_string();
        self.instances.lock().unwrap().insert(
            (project.to_string(), zone.to_string(), stored.name.clone()),
            stored,
        );
        Ok(())
    }

    async fn delete_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<(), ComputeError> {
        self.record("instances.delete");
        self.instances
            .lock()
            .unwrap()
            .remove(&(project.to_string(), zone.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| ComputeError::NotFound(format!("instance {name}")))
    }

    async fn stop_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<(), ComputeError> {
        self.record("instances.stop");
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .get_mut(&(project.to_string(), zone.to_string(), name.to_string()))
            .ok_or_else(|| ComputeError::NotFound(format!("instance {name}")))?;
        // Stop is asynchronous on the real API; tests flip the status to
        // Terminated themselves via set_instance_status.
        if instance.status != Some(InstanceStatus::Terminated) {
            instance.status = Some(InstanceStatus::Stopping);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl InstanceGroupsApi for MockComputeClient {
    async fn list_instance_group_instances(
        &self,
        project: &str,
        zone: &str,
        group: &str,
    ) -> Result<Vec<InstanceWithNamedPorts>, ComputeError> {
        self.record("instanceGroups.listInstances");
        let groups = self.instance_groups.lock().unwrap();
        let members = groups
            .get(&(project.to_string(), zone.to_string(), group.to_string()))
            .ok_or_else(|| ComputeError::NotFound(format!("instance group {group}")))?;
        Ok(members
            .iter()
            .map(|url| InstanceWithNamedPorts {
                instance: url.clone(),
                status: "RUNNING".to_string(),
            })
            .collect())
    }

    async fn add_instance_to_group(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instance_url: &str,
    ) -> Result<(), ComputeError> {
        self.record("instanceGroups.addInstances");
        let mut groups = self.instance_groups.lock().unwrap();
        let members = groups
            .get_mut(&(project.to_string(), zone.to_string(), group.to_string()))
            .ok_or_else(|| ComputeError::NotFound(format!("instance group {group}")))?;
        if !members.iter().any(|m| m == instance_url) {
            members.push(instance_url.to_string());
        }
        Ok(())
    }

    async fn remove_instance_from_group(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instance_url: &str,
    ) -> Result<(), ComputeError> {
        self.record("instanceGroups.removeInstances");
        let mut groups = self.instance_groups.lock().unwrap();
        let members = groups
            .get_mut(&(project.to_string(), zone.to_string(), group.to_string()))
            .ok_or_else(|| ComputeError::NotFound(format!("instance group {group}")))?;
        members.retain(|m| m != instance_url);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ImagesApi for MockComputeClient {
    async fn get_image(&self, project: &str, name: &str) -> Result<Image, ComputeError> {
        self.record("images.get");
        self.images
            .lock()
            .unwrap()
            .get(&(project.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ComputeError::NotFound(format!("image {name}")))
    }

    async fn insert_image(&self, project: &str, image: &Image) -> Result<(), ComputeError> {
        self.record("images.insert");
        let mut stored = image.clone();
        stored.status = Some(ImageStatus::Pending);
        self.images
            .lock()
            .unwrap()
            .insert((project.to_string(), stored.name.clone()), stored);
        Ok(())
    }

    async fn delete_image(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        self.record("images.delete");
        self.images
            .lock()
            .unwrap()
            .remove(&(project.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| ComputeError::NotFound(format!("image {name}")))
    }
}
