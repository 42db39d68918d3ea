//! GCP Compute API client for the build provisioner
//!
//! A thin async client over the Compute v1 REST API covering the
//! resources the provisioner manages: networks, subnetworks, firewall
//! rules, instances, instance groups, and disk images. The API surface
//! is split into one trait per resource so consumers can depend on the
//! narrow slice they use and tests can swap in the in-memory mock
//! (enable the `test-util` feature).
//!
//! # Example
//!
//! ```no_run
//! use gcp_compute_client::{GcpComputeClient, NetworksApi};
//!
//! # async fn run() -> Result<(), gcp_compute_client::ComputeError> {
//! let client = GcpComputeClient::new(
//!     "https://compute.googleapis.com/compute/v1".to_string(),
//!     std::env::var("GCP_ACCESS_TOKEN").unwrap_or_default(),
//! )?;
//! client.validate_access("my-project").await?;
//! let network = client.get_network("my-project", "default").await?;
//! println!("network self link: {}", network.self_link);
//! # Ok(())
//! # }
//! ```

pub mod client;
#[path = "trait.rs"]
pub mod compute_trait;
pub mod error;
#[cfg(feature = "test-util")]
pub mod mock;
pub mod models;

pub use client::{DEFAULT_COMPUTE_API, GcpComputeClient};
pub use compute_trait::{
    ComputeClientTrait, FirewallsApi, ImagesApi, InstanceGroupsApi, InstancesApi, NetworksApi,
    SubnetworksApi,
};
pub use error::ComputeError;
#[cfg(feature = "test-util")]
pub use mock::MockComputeClient;
