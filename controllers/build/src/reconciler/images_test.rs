//! Image export tests: the export guard, stop-before-capture ordering,
//! conflict handling, and artifact publication.

use super::Reconciler;
use super::images::{Service, image_description};
use crate::scope::BuildScope;
use crate::test_utils::{test_build_with_status, test_scope};
use crds::GCPBuildStatus;
use gcp_compute_client::MockComputeClient;
use gcp_compute_client::models::{Image, ImageStatus, Instance, InstanceStatus};
use std::sync::Arc;

fn service(scope: Arc<BuildScope>, mock: &MockComputeClient) -> Service<BuildScope> {
    Service::new(scope, Arc::new(mock.clone()), Arc::new(mock.clone()))
}

fn provisioned_status() -> GCPBuildStatus {
    GCPBuildStatus {
        provisioner_ready: true,
        ..Default::default()
    }
}

fn seeded_instance(name: &str, status: InstanceStatus) -> Instance {
    Instance {
        name: name.to_string(),
        status: Some(status),
        ..Default::default()
    }
}

#[tokio::test]
async fn export_waits_for_the_provisioning_agent() {
    let mock = MockComputeClient::new();
    let build = test_build_with_status("b1", GCPBuildStatus::default());
    let svc = service(test_scope(build), &mock);

    assert!(svc.reconcile().await.is_ok());
    assert_eq!(mock.total_calls(), 0);
}

#[tokio::test]
async fn export_is_a_noop_once_ready() {
    let mock = MockComputeClient::new();
    let build = test_build_with_status(
        "b1",
        GCPBuildStatus {
            provisioner_ready: true,
            ready: true,
            artifact_ref: Some("projects/p/global/images/img-b1".to_string()),
            ..Default::default()
        },
    );
    let svc = service(test_scope(build), &mock);

    assert!(svc.reconcile().await.is_ok());
    assert_eq!(mock.total_calls(), 0);
}

#[tokio::test]
async fn running_instance_is_stopped_not_imaged() {
    let mock = MockComputeClient::new();
    mock.add_instance(
        "p",
        "us-central1-a",
        seeded_instance("b1", InstanceStatus::Running),
    );
    let build = test_build_with_status("b1", provisioned_status());
    let svc = service(test_scope(build), &mock);

    // Tick 1: running, issue stop. Tick 2: stopping, stop again (not an
    // error). Never an insert while the instance is not terminated.
    assert!(svc.reconcile().await.is_ok());
    assert!(svc.reconcile().await.is_ok());
    assert_eq!(mock.call_count("instances.stop"), 2);
    assert_eq!(mock.call_count("images.insert"), 0);
}

#[tokio::test]
async fn terminated_instance_is_captured_exactly_once() {
    let mock = MockComputeClient::new();
    mock.add_instance(
        "p",
        "us-central1-a",
        seeded_instance("b1", InstanceStatus::Terminated),
    );
    let build = test_build_with_status("b1", provisioned_status());
    let scope = test_scope(build);
    let svc = service(scope.clone(), &mock);

    assert!(svc.reconcile().await.is_ok());
    assert_eq!(mock.call_count("images.insert"), 1);
    let image = mock.image("p", "img-b1");
    assert_eq!(
        image.as_ref().map(|i| i.source_disk.as_str()),
        Some("projects/p/zones/us-central1-a/disks/b1")
    );
    assert_eq!(
        image.as_ref().map(|i| i.description.clone()),
        Some(image_description("b1"))
    );

    // The mock stores fresh images as PENDING: no artifact yet, and no
    // duplicate insert on the next tick.
    assert!(svc.reconcile().await.is_ok());
    assert_eq!(mock.call_count("images.insert"), 1);
    assert_eq!(scope.artifact_ref(), None);

    // Once the image reports READY the artifact reference lands.
    mock.set_image_status("p", "img-b1", ImageStatus::Ready);
    assert!(svc.reconcile().await.is_ok());
    assert_eq!(
        scope.artifact_ref().as_deref(),
        Some("projects/p/global/images/img-b1")
    );
}

#[tokio::test(start_paused = true)]
async fn conflicting_image_is_replaced_in_one_tick() {
    let mock = MockComputeClient::new();
    mock.add_instance(
        "p",
        "us-central1-a",
        seeded_instance("b1", InstanceStatus::Terminated),
    );
    // A stranger's image already holds the target name.
    mock.add_image(
        "p",
        Image {
            name: "img-b1".to_string(),
            description: "somebody else's image".to_string(),
            status: Some(ImageStatus::Ready),
            ..Default::default()
        },
    );
    let build = test_build_with_status("b1", provisioned_status());
    let svc = service(test_scope(build), &mock);

    // The mock deletes synchronously, so the post-grace probe sees the
    // image gone and the insert happens in the same tick.
    assert!(svc.reconcile().await.is_ok());
    assert_eq!(mock.call_count("images.delete"), 1);
    assert_eq!(mock.call_count("images.insert"), 1);
    let image = mock.image("p", "img-b1");
    assert_eq!(
        image.map(|i| i.description),
        Some(image_description("b1"))
    );
}

#[tokio::test]
async fn own_in_flight_image_is_never_deleted() {
    let mock = MockComputeClient::new();
    mock.add_instance(
        "p",
        "us-central1-a",
        seeded_instance("b1", InstanceStatus::Terminated),
    );
    mock.add_image(
        "p",
        Image {
            name: "img-b1".to_string(),
            description: image_description("b1"),
            status: Some(ImageStatus::Pending),
            ..Default::default()
        },
    );
    let build = test_build_with_status("b1", provisioned_status());
    let scope = test_scope(build);
    let svc = service(scope.clone(), &mock);

    assert!(svc.reconcile().await.is_ok());
    assert_eq!(mock.call_count("images.delete"), 0);
    assert_eq!(mock.call_count("images.insert"), 0);
    assert_eq!(scope.artifact_ref(), None);
}

#[tokio::test]
async fn build_deletion_retains_the_image() {
    let mock = MockComputeClient::new();
    mock.add_image(
        "p",
        Image {
            name: "img-b1".to_string(),
            description: image_description("b1"),
            status: Some(ImageStatus::Ready),
            ..Default::default()
        },
    );
    let build = test_build_with_status("b1", provisioned_status());
    let svc = service(test_scope(build), &mock);

    assert!(svc.delete().await.is_ok());
    assert_eq!(mock.total_calls(), 0);
    assert!(mock.has_image("p", "img-b1"));
}
