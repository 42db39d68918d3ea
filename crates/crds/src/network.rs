//! Network topology types for a build.
//!
//! A build declares an optional VPC network and zero-or-more subnets.
//! In shared-VPC mode (`hostProject` set) the network and its subnets
//! are owned by the host project and are never created or deleted here.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired VPC network configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Name of the network to be used. Defaults to the build name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// When true the VPC network is created in "auto" mode with one
    /// subnet per region; when false in "custom" mode. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_create_subnetworks: Option<bool>,

    /// Subnets configuration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<SubnetSpec>,

    /// Load balancer backend port override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_backend_port: Option<i32>,

    /// Name of the project hosting shared VPC network resources. Setting
    /// this puts the build in shared-VPC mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_project: Option<String>,

    /// Maximum transmission unit in bytes (1300..=8896). Defaults to 1460
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<i64>,
}

impl NetworkSpec {
    /// Returns the subnet with the given name, if declared.
    #[must_use]
    pub fn subnet_by_name(&self, name: &str) -> Option<&SubnetSpec> {
        self.subnets.iter().find(|s| s.name == name)
    }

    /// Returns all declared subnets that live in the given region.
    #[must_use]
    pub fn subnets_in_region(&self, region: &str) -> Vec<&SubnetSpec> {
        self.subnets
            .iter()
            .filter(|s| s.region.as_deref() == Some(region))
            .collect()
    }
}

/// Desired configuration of a single subnet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Unique identifier for this subnet within the build.
    pub name: String,

    /// Range of internal addresses owned by this subnetwork, for example
    /// 10.0.0.0/24. Only settable at creation time.
    pub cidr_block: String,

    /// Optional description associated with the resource. When unset the
    /// provisioner writes its ownership tag as the description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Secondary CIDR ranges from which secondary IP ranges of an
    /// instance may be allocated, keyed by range name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secondary_cidr_blocks: BTreeMap<String, String>,

    /// Region the subnetwork resides in. Defaults to the build's region
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Whether instances in this subnet can reach Google services without
    /// external IP addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_google_access: Option<bool>,

    /// Whether to enable flow logging for this subnetwork.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_flow_logs: Option<bool>,

    /// Purpose of the subnet. Defaults to PRIVATE_RFC_1918.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<SubnetPurpose>,
}

impl SubnetSpec {
    /// Resolves the subnet's region, falling back to the given default.
    #[must_use]
    pub fn region_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.region.as_deref() {
            Some(r) if !r.is_empty() => r,
            _ => default,
        }
    }
}

impl std::fmt::Display for SubnetSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "name={}/region={}",
            self.name,
            self.region.as_deref().unwrap_or_default()
        )
    }
}

/// Purpose of a subnet, mirroring the compute API enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubnetPurpose {
    /// Subnet reserved for internal HTTP(S) load balancing.
    InternalHttpsLoadBalancer,
    /// Regular user created or automatically created subnet.
    Private,
    /// Regular user created or automatically created subnet.
    PrivateRfc1918,
    /// Subnetworks created for Private Service Connect.
    PrivateServiceConnect,
    /// Subnetwork used for regional managed proxies.
    RegionalManagedProxy,
}

impl SubnetPurpose {
    /// The compute API spelling of this purpose.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubnetPurpose::InternalHttpsLoadBalancer => "INTERNAL_HTTPS_LOAD_BALANCER",
            SubnetPurpose::Private => "PRIVATE",
            SubnetPurpose::PrivateRfc1918 => "PRIVATE_RFC_1918",
            SubnetPurpose::PrivateServiceConnect => "PRIVATE_SERVICE_CONNECT",
            SubnetPurpose::RegionalManagedProxy => "REGIONAL_MANAGED_PROXY",
        }
    }
}

/// Type of load balancer to front the build's instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum LoadBalancerType {
    /// Global external proxy load balancer (the default).
    External,
    /// Regional internal passthrough load balancer.
    Internal,
    /// Both external and internal load balancers.
    InternalExternal,
}

/// Configuration for one or more load balancers. Consumed read-only by
/// the reconcilers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    /// Overrides the tag used when creating the instance group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_group_tag_override: Option<String>,

    /// Type of load balancer to create. Defaults to External.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_type: Option<LoadBalancerType>,

    /// Configuration for an internal passthrough load balancer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_load_balancer: Option<LoadBalancer>,
}

/// Configuration of a single load balancer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// Name of the load balancer; a service default is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Subnet to use for a regional load balancer; the first configured
    /// subnet is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
}
