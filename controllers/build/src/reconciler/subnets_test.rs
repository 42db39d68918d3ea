//! Subnet reconciler tests: region resolution, idempotency, the
//! ownership gate, and the shared-VPC rules.

use super::Reconciler;
use super::subnets::Service;
use crate::error::ControllerError;
use crate::scope::BuildScope;
use crate::test_utils::{test_build, test_scope};
use crds::{GCPBuild, SubnetSpec};
use gcp_compute_client::MockComputeClient;
use gcp_compute_client::models::Subnetwork;
use std::sync::Arc;

fn service(scope: Arc<BuildScope>, mock: &MockComputeClient) -> Service<BuildScope> {
    Service::new(scope, Arc::new(mock.clone()))
}

fn shared_vpc_build(name: &str) -> GCPBuild {
    let mut build = test_build(name);
    build.spec.network.host_project = Some("host-p".to_string());
    build
}

#[tokio::test]
async fn resolves_default_region_and_creates_once() {
    let mock = MockComputeClient::new();
    let svc = service(test_scope(test_build("b1")), &mock);

    assert!(svc.reconcile().await.is_ok());
    // "sub-a" has no pinned region; the build's region wins.
    assert!(mock.has_subnetwork("p", "us-central1", "sub-a"));

    // Second pass with no external change: zero insert calls.
    assert!(svc.reconcile().await.is_ok());
    assert_eq!(mock.call_count("subnetworks.insert"), 1);
}

#[tokio::test]
async fn pinned_region_is_respected() {
    let mut build = test_build("b1");
    build.spec.network.subnets[0].region = Some("europe-west4".to_string());
    let mock = MockComputeClient::new();
    let svc = service(test_scope(build), &mock);

    assert!(svc.reconcile().await.is_ok());
    assert!(mock.has_subnetwork("p", "europe-west4", "sub-a"));
    assert!(!mock.has_subnetwork("p", "us-central1", "sub-a"));
}

#[tokio::test]
async fn shared_vpc_missing_subnet_is_hard_error() {
    let mock = MockComputeClient::new();
    let svc = service(test_scope(shared_vpc_build("b1")), &mock);

    let result = svc.reconcile().await;
    assert!(matches!(
        result,
        Err(ControllerError::SharedVpcResourceMissing(_))
    ));
    // Shared VPC subnets are the host project owner's to create.
    assert_eq!(mock.call_count("subnetworks.insert"), 0);
}

#[tokio::test]
async fn shared_vpc_existing_subnet_is_left_alone() {
    let mock = MockComputeClient::new();
    mock.add_subnetwork(
        "host-p",
        "us-central1",
        Subnetwork {
            name: "sub-a".to_string(),
            ip_cidr_range: "10.0.0.0/24".to_string(),
            ..Default::default()
        },
    );
    let svc = service(test_scope(shared_vpc_build("b1")), &mock);

    assert!(svc.reconcile().await.is_ok());
    assert_eq!(mock.call_count("subnetworks.insert"), 0);
}

#[tokio::test]
async fn shared_vpc_delete_makes_zero_api_calls() {
    let mock = MockComputeClient::new();
    let svc = service(test_scope(shared_vpc_build("b1")), &mock);

    assert!(svc.delete().await.is_ok());
    assert_eq!(mock.total_calls(), 0);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let mock = MockComputeClient::new();
    let svc = service(test_scope(test_build("b1")), &mock);

    assert!(svc.reconcile().await.is_ok());
    assert!(svc.delete().await.is_ok());
    assert!(!mock.has_subnetwork("p", "us-central1", "sub-a"));

    // Already gone: success, no further delete calls.
    assert!(svc.delete().await.is_ok());
    assert_eq!(mock.call_count("subnetworks.delete"), 1);
}

#[tokio::test]
async fn foreign_subnet_halts_the_whole_delete_pass() {
    let mut build = test_build("b1");
    build.spec.network.subnets = vec![
        SubnetSpec {
            name: "sub-a".to_string(),
            cidr_block: "10.0.0.0/24".to_string(),
            ..Default::default()
        },
        SubnetSpec {
            name: "sub-b".to_string(),
            cidr_block: "10.0.1.0/24".to_string(),
            ..Default::default()
        },
    ];
    let mock = MockComputeClient::new();
    // "sub-a" exists but belongs to someone else.
    mock.add_subnetwork(
        "p",
        "us-central1",
        Subnetwork {
            name: "sub-a".to_string(),
            ip_cidr_range: "10.0.0.0/24".to_string(),
            description: "managed elsewhere".to_string(),
            ..Default::default()
        },
    );
    mock.add_subnetwork(
        "p",
        "us-central1",
        Subnetwork {
            name: "sub-b".to_string(),
            ip_cidr_range: "10.0.1.0/24".to_string(),
            description: "forge-gcpbuild-b1".to_string(),
            ..Default::default()
        },
    );
    let svc = service(test_scope(build), &mock);

    let result = svc.delete().await;
    assert!(matches!(result, Err(ControllerError::ForeignSubnet(_))));
    // Nothing was deleted, including the subnet we do own.
    assert_eq!(mock.call_count("subnetworks.delete"), 0);
    assert!(mock.has_subnetwork("p", "us-central1", "sub-a"));
    assert!(mock.has_subnetwork("p", "us-central1", "sub-b"));
}

#[tokio::test]
async fn foreign_subnet_late_in_the_list_still_blocks_every_deletion() {
    let mut build = test_build("b1");
    build.spec.network.subnets = vec![
        SubnetSpec {
            name: "sub-a".to_string(),
            cidr_block: "10.0.0.0/24".to_string(),
            ..Default::default()
        },
        SubnetSpec {
            name: "sub-b".to_string(),
            cidr_block: "10.0.1.0/24".to_string(),
            ..Default::default()
        },
    ];
    let mock = MockComputeClient::new();
    // We own "sub-a"; "sub-b", declared after it, belongs to someone
    // else. Ownership is checked for the whole list before the first
    // delete, so the owned subnet must survive too.
    mock.add_subnetwork(
        "p",
        "us-central1",
        Subnetwork {
            name: "sub-a".to_string(),
            ip_cidr_range: "10.0.0.0/24".to_string(),
            description: "forge-gcpbuild-b1".to_string(),
            ..Default::default()
        },
    );
    mock.add_subnetwork(
        "p",
        "us-central1",
        Subnetwork {
            name: "sub-b".to_string(),
            ip_cidr_range: "10.0.1.0/24".to_string(),
            description: "managed elsewhere".to_string(),
            ..Default::default()
        },
    );
    let svc = service(test_scope(build), &mock);

    let result = svc.delete().await;
    assert!(matches!(result, Err(ControllerError::ForeignSubnet(_))));
    assert_eq!(mock.call_count("subnetworks.delete"), 0);
    assert!(mock.has_subnetwork("p", "us-central1", "sub-a"));
    assert!(mock.has_subnetwork("p", "us-central1", "sub-b"));
}

#[tokio::test]
async fn declared_description_also_passes_the_ownership_gate() {
    let mut build = test_build("b1");
    build.spec.network.subnets[0].description = Some("build scratch subnet".to_string());
    let mock = MockComputeClient::new();
    mock.add_subnetwork(
        "p",
        "us-central1",
        Subnetwork {
            name: "sub-a".to_string(),
            ip_cidr_range: "10.0.0.0/24".to_string(),
            description: "build scratch subnet".to_string(),
            ..Default::default()
        },
    );
    let svc = service(test_scope(build), &mock);

    assert!(svc.delete().await.is_ok());
    assert_eq!(mock.call_count("subnetworks.delete"), 1);
}
