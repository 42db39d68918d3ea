//! Firewall rule types for a build.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired configuration of a single firewall rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FirewallSpec {
    /// Name of the firewall rule, unique within the project.
    pub name: String,

    /// Optional description associated with the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Traffic the rule permits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<FirewallAllowRule>,

    /// Source CIDR ranges the rule applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_ranges: Vec<String>,

    /// Network tags of the instances the rule applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_tags: Vec<String>,
}

/// A single allow entry of a firewall rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FirewallAllowRule {
    /// IP protocol (tcp, udp, icmp, ...).
    pub protocol: String,

    /// Ports or port ranges, for example "22" or "8000-8080". Empty
    /// means all ports of the protocol.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
}
