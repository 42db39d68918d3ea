//! Kubernetes resource watcher.
//!
//! Runs the kube_runtime `Controller` loop over GCPBuild resources.
//! The Controller handles reconnection and requeueing; failed ticks go
//! through the reconciler's Fibonacci backoff policy.

use crate::error::ControllerError;
use crate::reconciler::BuildReconciler;
use crds::GCPBuild;
use futures::StreamExt;
use kube::Api;
use kube_runtime::{
    Controller,
    controller::{Action, Config as ControllerConfig},
    watcher,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Watches GCPBuild resources for changes.
pub struct Watcher {
    reconciler: Arc<BuildReconciler>,
    build_api: Api<GCPBuild>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<BuildReconciler>, build_api: Api<GCPBuild>) -> Self {
        Self {
            reconciler,
            build_api,
        }
    }

    /// Starts watching GCPBuild resources. Runs until shutdown.
    pub async fn watch_builds(&self) -> Result<(), ControllerError> {
        info!("Starting GCPBuild watcher");

        let reconcile = |build: Arc<GCPBuild>, ctx: Arc<BuildReconciler>| async move {
            ctx.reconcile(build).await
        };

        let error_policy =
            |build: Arc<GCPBuild>, error: &ControllerError, ctx: Arc<BuildReconciler>| -> Action {
                ctx.failure_backoff(&build, error)
            };

        // Debounce batches bursts of status updates; a small concurrency
        // cap keeps the compute API call volume bounded. Ticks for the
        // same build are never concurrent regardless.
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(2))
            .concurrency(4);

        Controller::new(self.build_api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|result| async move {
                match result {
                    Ok((build, _)) => debug!("Reconciled GCPBuild {:?}", build),
                    Err(e) => error!("Controller error: {}", e),
                }
            })
            .await;

        Ok(())
    }
}
