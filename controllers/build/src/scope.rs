//! Per-build scope.
//!
//! `BuildScope` bundles everything a reconciler needs for one build:
//! identity (project, region, zone, name), the desired compute resource
//! bodies derived from the spec, and accessors for the status fields.
//! Each reconciler module declares the minimal trait it consumes;
//! `BuildScope` implements all of them.
//!
//! Status writes go through a mutex. Ticks for the same build never run
//! concurrently, so the lock is uncontended; it only lets the mutators
//! take `&self`.

use crate::error::ControllerError;
use crds::labels::{self, BuildParams, ResourceLifecycle, build_tag_key};
use crds::{GCPBuild, GCPBuildStatus};
use gcp_compute_client::models::{
    AttachedDisk, AttachedDiskInitializeParams, Firewall, FirewallAllowed, Instance, Metadata,
    MetadataItem, Network, NetworkInterface, Subnetwork, SubnetworkSecondaryRange, Tags,
};
use std::sync::{Arc, Mutex, PoisonError};

/// Capability bundle for one build's reconciliation tick.
pub struct BuildScope {
    build: Arc<GCPBuild>,
    name: String,
    status: Mutex<GCPBuildStatus>,
}

impl BuildScope {
    /// Creates a scope for the given build.
    pub fn new(build: Arc<GCPBuild>) -> Result<Self, ControllerError> {
        let name = build
            .metadata
            .name
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig("GCPBuild missing name".to_string()))?;
        let status = build.status.clone().unwrap_or_default();
        Ok(Self {
            build,
            name,
            status: Mutex::new(status),
        })
    }

    /// Name of the build; doubles as the instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Project the build's resources are created in.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.build.spec.project
    }

    /// Default region for regional resources.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.build.spec.region
    }

    /// Zone the build instance runs in.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.build.spec.zone
    }

    /// True when the build uses a shared-VPC host project.
    #[must_use]
    pub fn is_shared_vpc(&self) -> bool {
        self.build.spec.network.host_project.is_some()
    }

    /// Project the network resources live in: the shared-VPC host
    /// project when set, the build's own project otherwise.
    #[must_use]
    pub fn network_project(&self) -> &str {
        self.build
            .spec
            .network
            .host_project
            .as_deref()
            .unwrap_or(&self.build.spec.project)
    }

    /// Name of the VPC network, defaulting to the build name.
    #[must_use]
    pub fn network_name(&self) -> &str {
        self.build
            .spec
            .network
            .name
            .as_deref()
            .unwrap_or(&self.name)
    }

    /// Name of the disk image to capture, defaulting to "img-<name>".
    #[must_use]
    pub fn image_name(&self) -> String {
        self.build
            .spec
            .image_name
            .clone()
            .unwrap_or_else(|| format!("img-{}", self.name))
    }

    /// Instance group to register the instance with, if any.
    #[must_use]
    pub fn instance_group(&self) -> Option<String> {
        self.build.spec.instance.instance_group.clone()
    }

    /// True once the external agent finished configuring the instance.
    #[must_use]
    pub fn is_provisioner_ready(&self) -> bool {
        self.lock_status().provisioner_ready
    }

    /// True once the image export completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lock_status().ready
    }

    /// The captured image's fully-qualified identifier, if set.
    #[must_use]
    pub fn artifact_ref(&self) -> Option<String> {
        self.lock_status().artifact_ref.clone()
    }

    /// Records the captured image's identifier. Owned by the image
    /// reconciler; no other writer touches this field.
    pub fn set_artifact_ref(&self, artifact: String) {
        self.lock_status().artifact_ref = Some(artifact);
    }

    /// Marks the build ready. Owned by the tick driver, set once the
    /// artifact reference is present.
    pub fn set_ready(&self) {
        self.lock_status().ready = true;
    }

    /// Records or clears the last failure message.
    pub fn set_failure_message(&self, message: Option<String>) {
        self.lock_status().failure_message = message;
    }

    /// Snapshot of the status as mutated during this tick.
    #[must_use]
    pub fn status(&self) -> GCPBuildStatus {
        self.lock_status().clone()
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, GCPBuildStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Partial URL of the VPC network, usable in resource bodies.
    #[must_use]
    pub fn network_url(&self) -> String {
        format!(
            "projects/{}/global/networks/{}",
            self.network_project(),
            self.network_name()
        )
    }

    /// Desired VPC network body.
    #[must_use]
    pub fn network_spec(&self) -> Network {
        let net = &self.build.spec.network;
        Network {
            name: self.network_name().to_string(),
            description: build_tag_key(&self.name),
            auto_create_subnetworks: net.auto_create_subnetworks.unwrap_or(true),
            mtu: net.mtu,
            self_link: String::new(),
        }
    }

    /// Desired subnetwork bodies. A subnet's region may be empty here;
    /// the subnet reconciler resolves it against the build's region.
    #[must_use]
    pub fn subnet_specs(&self) -> Vec<Subnetwork> {
        self.build
            .spec
            .network
            .subnets
            .iter()
            .map(|s| Subnetwork {
                name: s.name.clone(),
                ip_cidr_range: s.cidr_block.clone(),
                region: s.region.clone().unwrap_or_default(),
                description: s
                    .description
                    .clone()
                    .unwrap_or_else(|| build_tag_key(&self.name)),
                network: self.network_url(),
                private_ip_google_access: s.private_google_access.unwrap_or(false),
                enable_flow_logs: s.enable_flow_logs.unwrap_or(false),
                purpose: s.purpose.map(|p| p.as_str().to_string()).unwrap_or_default(),
                secondary_ip_ranges: s
                    .secondary_cidr_blocks
                    .iter()
                    .map(|(name, cidr)| SubnetworkSecondaryRange {
                        range_name: name.clone(),
                        ip_cidr_range: cidr.clone(),
                    })
                    .collect(),
                self_link: String::new(),
            })
            .collect()
    }

    /// Desired firewall rule bodies.
    #[must_use]
    pub fn firewall_rules_spec(&self) -> Vec<Firewall> {
        self.build
            .spec
            .firewalls
            .iter()
            .map(|f| Firewall {
                name: f.name.clone(),
                description: f
                    .description
                    .clone()
                    .unwrap_or_else(|| build_tag_key(&self.name)),
                network: self.network_url(),
                direction: "INGRESS".to_string(),
                allowed: f
                    .allowed
                    .iter()
                    .map(|a| FirewallAllowed {
                        ip_protocol: a.protocol.clone(),
                        ports: a.ports.clone(),
                    })
                    .collect(),
                source_ranges: f.source_ranges.clone(),
                target_tags: f.target_tags.clone(),
                self_link: String::new(),
            })
            .collect()
    }

    /// Desired instance body, including ownership labels and the boot
    /// disk from `instance_image_spec`.
    #[must_use]
    pub fn instance_spec(&self) -> Instance {
        let spec = &self.build.spec.instance;
        let instance_labels = labels::build(&BuildParams {
            lifecycle: ResourceLifecycle::Owned,
            build_name: self.name.clone(),
            additional: spec.additional_labels.clone(),
        });

        let network_interface = match &spec.subnet {
            Some(subnet) => NetworkInterface {
                network: String::new(),
                subnetwork: format!(
                    "projects/{}/regions/{}/subnetworks/{}",
                    self.network_project(),
                    self.region(),
                    subnet
                ),
            },
            None => NetworkInterface {
                network: self.network_url(),
                subnetwork: String::new(),
            },
        };

        Instance {
            name: self.name.clone(),
            machine_type: format!("zones/{}/machineTypes/{}", self.zone(), spec.machine_type),
            status: None,
            disks: vec![self.instance_image_spec()],
            network_interfaces: vec![network_interface],
            labels: instance_labels.0,
            tags: (!spec.network_tags.is_empty()).then(|| Tags {
                items: spec.network_tags.clone(),
            }),
            metadata: (!spec.metadata.is_empty()).then(|| Metadata {
                items: spec
                    .metadata
                    .iter()
                    .map(|(key, value)| MetadataItem {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            }),
            self_link: String::new(),
            zone: String::new(),
        }
    }

    /// Boot disk attachment derived from the instance spec.
    #[must_use]
    pub fn instance_image_spec(&self) -> AttachedDisk {
        let spec = &self.build.spec.instance;
        AttachedDisk {
            auto_delete: true,
            boot: true,
            initialize_params: Some(AttachedDiskInitializeParams {
                source_image: spec.source_image.clone(),
                disk_size_gb: Some(spec.root_disk_size_gb.unwrap_or(10)),
                disk_type: spec
                    .root_disk_type
                    .as_ref()
                    .map(|t| format!("zones/{}/diskTypes/{t}", self.zone()))
                    .unwrap_or_default(),
            }),
            source: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_build;

    fn scope(build: GCPBuild) -> BuildScope {
        BuildScope::new(Arc::new(build)).expect("build has a name")
    }

    #[test]
    fn network_project_prefers_host_project() {
        let mut build = test_build("b1");
        assert_eq!(scope(build.clone()).network_project(), "p");
        assert!(!scope(build.clone()).is_shared_vpc());

        build.spec.network.host_project = Some("host-p".to_string());
        let shared = scope(build);
        assert_eq!(shared.network_project(), "host-p");
        assert!(shared.is_shared_vpc());
    }

    #[test]
    fn image_name_defaults_to_build_name() {
        assert_eq!(scope(test_build("b1")).image_name(), "img-b1");

        let mut build = test_build("b1");
        build.spec.image_name = Some("golden".to_string());
        assert_eq!(scope(build).image_name(), "golden");
    }

    #[test]
    fn instance_spec_carries_ownership_label() {
        let instance = scope(test_build("b1")).instance_spec();
        assert_eq!(
            instance.labels.get("forge-gcpbuild-b1").map(String::as_str),
            Some("owned")
        );
        assert_eq!(instance.name, "b1");
        assert!(instance.disks[0].boot);
    }

    #[test]
    fn subnet_description_defaults_to_ownership_tag() {
        let subnets = scope(test_build("b1")).subnet_specs();
        assert_eq!(subnets.len(), 1);
        assert_eq!(subnets[0].description, "forge-gcpbuild-b1");
        // Region left for the reconciler to resolve.
        assert!(subnets[0].region.is_empty());
    }
}
