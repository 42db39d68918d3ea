//! GCPBuild CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the GCP build provisioner,
//! plus the pure labeling/tagging utility used to mark cloud resources
//! as owned by a build.

pub mod build;
pub mod firewall;
pub mod instance;
pub mod labels;
pub mod network;

pub use build::*;
pub use firewall::*;
pub use instance::*;
pub use labels::*;
pub use network::*;
