//! Compute instance types for a build.

use crate::labels::Labels;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired configuration of the build instance.
///
/// Instance specs are immutable post-creation: the reconciler never
/// resizes or retypes a live instance, it only creates one when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Machine type, for example "e2-medium".
    pub machine_type: String,

    /// Source image the boot disk is initialized from, for example
    /// "projects/debian-cloud/global/images/family/debian-12".
    pub source_image: String,

    /// Boot disk size in GB. Defaults to 10.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_disk_size_gb: Option<i64>,

    /// Boot disk type, for example "pd-standard" or "pd-ssd".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_disk_type: Option<String>,

    /// Subnet to attach the instance to. Defaults to the first declared
    /// subnet, or the network's auto-created subnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,

    /// Network tags applied to the instance (firewall targeting).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_tags: Vec<String>,

    /// Additional labels applied to the instance alongside the
    /// ownership label.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub additional_labels: Labels,

    /// Instance metadata key/value pairs (startup scripts, ssh keys).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    /// Instance group to register the instance with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_group: Option<String>,
}
