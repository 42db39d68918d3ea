//! Disk image export.
//!
//! Converts the provisioned, stopped instance into an immutable disk
//! image, exactly once. The whole flow is a state machine driven once
//! per tick: every call re-derives the current state from live provider
//! queries, advances it by at most one step, and returns. Interruption
//! at any point is safe because no step depends on process memory.
//!
//! `delete` is a no-op: images produced here are long-lived artifacts
//! that intentionally outlive the build.

use super::Reconciler;
use crate::error::ControllerError;
use crate::scope::BuildScope;
use gcp_compute_client::models::{Image, ImageStatus, InstanceStatus};
use gcp_compute_client::{ImagesApi, InstancesApi};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "images";

/// Grace period after deleting a conflicting image, giving the
/// provider's eventual consistency time to catch up before the
/// follow-up existence probe.
const IMAGE_DELETION_GRACE: Duration = Duration::from_secs(5);

/// Description written on captured images. Also the ownership check: a
/// same-named image carrying this description is our own (possibly
/// in-flight) artifact and must never be deleted by the export path.
pub(crate) fn image_description(instance: &str) -> String {
    format!("Custom disk image created from instance: {instance}")
}

/// The slice of scope the image reconciler consumes.
pub trait ImageScope: Send + Sync {
    /// Build name; doubles as the source instance name.
    fn name(&self) -> &str;
    /// Project the instance and image live in.
    fn project(&self) -> &str;
    /// Zone of the source instance.
    fn zone(&self) -> &str;
    /// Name of the image to capture.
    fn image_name(&self) -> String;
    /// True once the external agent finished configuring the instance.
    fn is_provisioner_ready(&self) -> bool;
    /// True once the image export completed.
    fn is_ready(&self) -> bool;
    /// Records the captured image's identifier.
    fn set_artifact_ref(&self, artifact: String);
}

impl ImageScope for BuildScope {
    fn name(&self) -> &str {
        BuildScope::name(self)
    }

    fn project(&self) -> &str {
        BuildScope::project(self)
    }

    fn zone(&self) -> &str {
        BuildScope::zone(self)
    }

    fn image_name(&self) -> String {
        BuildScope::image_name(self)
    }

    fn is_provisioner_ready(&self) -> bool {
        BuildScope::is_provisioner_ready(self)
    }

    fn is_ready(&self) -> bool {
        BuildScope::is_ready(self)
    }

    fn set_artifact_ref(&self, artifact: String) {
        BuildScope::set_artifact_ref(self, artifact);
    }
}

/// Exports the build instance as a disk image.
pub struct Service<S> {
    scope: Arc<S>,
    instances: Arc<dyn InstancesApi>,
    images: Arc<dyn ImagesApi>,
}

impl<S: ImageScope> Service<S> {
    /// Creates a new image service.
    pub fn new(scope: Arc<S>, instances: Arc<dyn InstancesApi>, images: Arc<dyn ImagesApi>) -> Self {
        Self {
            scope,
            instances,
            images,
        }
    }

    /// Ensures the source instance is terminated. Returns true when the
    /// export may proceed this tick.
    async fn ensure_instance_terminated(&self) -> Result<bool, ControllerError> {
        let project = self.scope.project();
        let zone = self.scope.zone();
        let name = self.scope.name();

        let live = match self.instances.get_instance(project, zone, name).await {
            Ok(live) => live,
            Err(e) if e.is_not_found() => {
                // The instance reconciler may have inserted it only this
                // tick; retry once it is observable.
                warn!("Instance {} not visible yet, delaying image capture", name);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if live.status == Some(InstanceStatus::Terminated) {
            return Ok(true);
        }

        info!(
            "Stopping instance {} for image capture (status {:?})",
            name, live.status
        );
        // Stop on an already-stopping instance is not an error.
        self.instances.stop_instance(project, zone, name).await?;
        Ok(false)
    }

    /// Handles a pre-existing image with the target name. Returns true
    /// when the insert may be issued this tick.
    async fn ensure_no_conflicting_image(
        &self,
        image_name: &str,
        description: &str,
    ) -> Result<bool, ControllerError> {
        let project = self.scope.project();

        let live = match self.images.get_image(project, image_name).await {
            Ok(live) => live,
            Err(e) if e.is_not_found() => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        if live.description == description {
            // Our own artifact; creation already happened.
            match live.status {
                Some(ImageStatus::Ready) => {
                    let artifact = format!("projects/{project}/global/images/{image_name}");
                    info!("Image {} ready, artifact {}", image_name, artifact);
                    self.scope.set_artifact_ref(artifact);
                }
                status => {
                    debug!("Image {} not ready yet (status {:?})", image_name, status);
                }
            }
            return Ok(false);
        }

        info!("Deleting conflicting image {}", image_name);
        match self.images.delete_image(project, image_name).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        // Deletion propagates asynchronously. Wait the grace period,
        // then re-probe; only create in the same tick once the image is
        // actually gone.
        tokio::time::sleep(IMAGE_DELETION_GRACE).await;
        match self.images.get_image(project, image_name).await {
            Ok(_) => {
                debug!("Image {} still visible after delete, retrying next tick", image_name);
                Ok(false)
            }
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl<S: ImageScope> Reconciler for Service<S> {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    async fn reconcile(&self) -> Result<(), ControllerError> {
        // Export is due only after the agent finished and before the
        // build reached its terminal state.
        if !self.scope.is_provisioner_ready() || self.scope.is_ready() {
            debug!("Image export not due for build {}", self.scope.name());
            return Ok(());
        }

        if !self.ensure_instance_terminated().await? {
            return Ok(());
        }

        let image_name = self.scope.image_name();
        let description = image_description(self.scope.name());
        if !self
            .ensure_no_conflicting_image(&image_name, &description)
            .await?
        {
            return Ok(());
        }

        let project = self.scope.project();
        let image = Image {
            name: image_name.clone(),
            source_disk: format!(
                "projects/{project}/zones/{}/disks/{}",
                self.scope.zone(),
                self.scope.name()
            ),
            description,
            status: None,
            self_link: String::new(),
        };
        info!(
            "Creating image {} from instance {}",
            image_name,
            self.scope.name()
        );
        self.images.insert_image(project, &image).await?;
        Ok(())
    }

    async fn delete(&self) -> Result<(), ControllerError> {
        // Captured images outlive the build.
        debug!("Images are retained on build deletion");
        Ok(())
    }
}
