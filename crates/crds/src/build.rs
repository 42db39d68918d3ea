//! GCPBuild CRD
//!
//! The unit of work for the provisioner: a declarative description of
//! the network, firewall, and instance infrastructure to stand up, and
//! of the disk image to capture once an external agent has provisioned
//! the instance.

use crate::firewall::FirewallSpec;
use crate::instance::InstanceSpec;
use crate::network::{LoadBalancerSpec, NetworkSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.forge.build",
    version = "v1alpha1",
    kind = "GCPBuild",
    namespaced,
    status = "GCPBuildStatus",
    shortname = "gcpbuild"
)]
#[serde(rename_all = "camelCase")]
pub struct GCPBuildSpec {
    /// Project the build's resources are created in.
    pub project: String,

    /// Default region for regional resources (subnets).
    pub region: String,

    /// Zone the build instance runs in.
    pub zone: String,

    /// Network topology to converge toward.
    #[serde(default)]
    pub network: NetworkSpec,

    /// Firewall rules to converge toward.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub firewalls: Vec<FirewallSpec>,

    /// Build instance configuration.
    pub instance: InstanceSpec,

    /// Load balancer configuration, consumed read-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerSpec>,

    /// Name of the disk image to capture. Defaults to "img-<build name>".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
}

/// Observed state of a build.
///
/// `provisioner_ready` is written by the external provisioning agent;
/// `artifact_ref` by the image reconciler; `ready` by the tick driver
/// once the artifact reference is present. No other writer touches
/// another writer's field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GCPBuildStatus {
    /// True once the external agent finished configuring the instance.
    #[serde(default)]
    pub provisioner_ready: bool,

    /// True once the image export completed.
    #[serde(default)]
    pub ready: bool,

    /// Fully-qualified identifier of the captured disk image, empty
    /// until the image reports READY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,

    /// Message of the last reconciliation failure, cleared on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}
