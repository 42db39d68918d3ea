//! GCP Build Controller
//!
//! Provisions the cloud infrastructure a `GCPBuild` declares — VPC
//! network, subnets, firewall rules, and a build instance — waits for
//! an external agent to provision the instance, then captures it as a
//! reusable disk image and records the artifact on the build's status.

mod backoff;
mod controller;
mod error;
mod reconciler;
mod scope;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::error::ControllerError;
use controller::Controller;
use gcp_compute_client::DEFAULT_COMPUTE_API;
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting GCP Build Controller");

    // Load configuration from environment variables
    let compute_api =
        env::var("GCP_COMPUTE_API").unwrap_or_else(|_| DEFAULT_COMPUTE_API.to_string());
    let access_token = env::var("GCP_ACCESS_TOKEN").map_err(|_| {
        ControllerError::InvalidConfig(
            "GCP_ACCESS_TOKEN environment variable is required".to_string(),
        )
    })?;
    let validation_project = env::var("GCP_PROJECT").ok();
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!("  Compute API: {}", compute_api);
    info!(
        "  Validation project: {}",
        validation_project.as_deref().unwrap_or("none")
    );
    info!(
        "  Namespace: {}",
        namespace.as_deref().unwrap_or("all namespaces")
    );

    // Initialize and run controller
    let controller = Controller::new(compute_api, access_token, validation_project, namespace).await?;
    controller.run().await?;

    Ok(())
}
