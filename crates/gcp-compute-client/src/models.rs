//! Compute API models
//!
//! These models mirror the subset of the GCP Compute v1 REST resources
//! the provisioner touches. Field names follow the API's camelCase.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// VPC network resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Network {
    pub name: String,
    pub description: String,
    pub auto_create_subnetworks: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub self_link: String,
}

/// Subnetwork resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subnetwork {
    pub name: String,
    pub ip_cidr_range: String,
    /// Region, possibly empty on desired specs (resolved by the
    /// reconciler against the build's default region).
    pub region: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub network: String,
    pub private_ip_google_access: bool,
    pub enable_flow_logs: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub purpose: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_ip_ranges: Vec<SubnetworkSecondaryRange>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub self_link: String,
}

/// Secondary IP range of a subnetwork.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubnetworkSecondaryRange {
    pub range_name: String,
    pub ip_cidr_range: String,
}

/// Firewall rule resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Firewall {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub network: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub direction: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<FirewallAllowed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_ranges: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub target_tags: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub self_link: String,
}

/// A single allow entry of a firewall rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallAllowed {
    /// The API spells this field "IPProtocol".
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}

/// Compute instance resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub machine_type: String,
    /// Live lifecycle state; absent on insert bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<AttachedDisk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub self_link: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zone: String,
}

/// State of a live compute instance, mirroring the provider's instance
/// lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Stopped,
    Suspending,
    Suspended,
    Repairing,
    Terminated,
}

/// Disk attached to an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachedDisk {
    pub auto_delete: bool,
    pub boot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initialize_params: Option<AttachedDiskInitializeParams>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
}

/// Parameters for a disk created alongside the instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachedDiskInitializeParams {
    pub source_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub disk_type: String,
}

/// Network attachment of an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInterface {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub network: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subnetwork: String,
}

/// Network tags of an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tags {
    pub items: Vec<String>,
}

/// Instance metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub items: Vec<MetadataItem>,
}

/// One metadata key/value pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

/// Disk image resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_disk: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Live state; absent on insert bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ImageStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub self_link: String,
}

/// State of a disk image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageStatus {
    Pending,
    Ready,
    Failed,
    Deleting,
}

/// Member of an instance group as returned by the listInstances call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceWithNamedPorts {
    /// Full URL of the member instance.
    pub instance: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
}

/// Long-running operation handle returned by mutating calls.
///
/// The provisioner never polls operations: each tick re-derives state
/// from live resource queries instead, so operations are only logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Operation {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target_link: String,
}

/// Paged response of the instance group listInstances call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceGroupsListInstances {
    pub items: Vec<InstanceWithNamedPorts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}
