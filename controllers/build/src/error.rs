//! Controller-specific error types.
//!
//! This module defines error types specific to the build controller
//! that are not covered by upstream library errors.

use gcp_compute_client::ComputeError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the build controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Compute API error
    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),

    /// A shared-VPC resource that must pre-exist in the host project is
    /// missing. Shared VPC networks and subnets are created by the host
    /// project owner, never by this controller.
    #[error("Shared VPC resource missing: {0}")]
    SharedVpcResourceMissing(String),

    /// A subnet slated for deletion is not tagged as owned by this build.
    /// Raised before any deletion happens; a single foreign subnet halts
    /// the whole delete pass.
    #[error("Subnet not managed by this build: {0}")]
    ForeignSubnet(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
