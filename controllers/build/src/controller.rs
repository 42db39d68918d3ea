//! Main controller implementation.
//!
//! Wires the Kubernetes client, the compute client, the build
//! reconciler, and the watcher together, then runs until shutdown.

use crate::error::ControllerError;
use crate::reconciler::BuildReconciler;
use crate::watcher::Watcher;
use crds::GCPBuild;
use gcp_compute_client::GcpComputeClient;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for GCPBuild management.
pub struct Controller {
    build_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(
        compute_api: String,
        access_token: String,
        validation_project: Option<String>,
        namespace: Option<String>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing build controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await?;

        // Create compute client
        let compute = GcpComputeClient::new(compute_api.clone(), access_token)
            .map_err(ControllerError::Compute)?;

        // Validate the token against a known project before proceeding,
        // when one is configured. Builds may target other projects; this
        // only catches dead credentials at startup.
        if let Some(project) = &validation_project {
            info!("Validating compute API access against project {project}...");
            compute.validate_access(project).await.map_err(|e| {
                error!("Failed to validate compute API access: {}", e);
                error!("Please ensure:");
                error!("  1. GCP_ACCESS_TOKEN is set and not expired");
                error!("  2. The token can reach {}", compute_api);
                error!("  3. The token has compute permissions on {}", project);
                ControllerError::Compute(e)
            })?;
            info!("Compute API access validated");
        }

        // Create API client for the CRD
        let build_api: Api<GCPBuild> = match namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };

        // Create reconciler and watcher
        let reconciler = Arc::new(BuildReconciler::new(kube_client, Arc::new(compute)));
        let watcher_instance = Watcher::new(reconciler, build_api);

        // Start the watcher in a background task
        let build_watcher = tokio::spawn(async move { watcher_instance.watch_builds().await });

        Ok(Self { build_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Build controller running");

        let result = (&mut self.build_watcher).await;
        result
            .map_err(|e| ControllerError::Watch(format!("GCPBuild watcher panicked: {e}")))?
            .map_err(|e| ControllerError::Watch(format!("GCPBuild watcher error: {e}")))?;

        Ok(())
    }
}
