//! Shared helpers for reconciler unit tests.

use crate::scope::BuildScope;
use crds::{GCPBuild, GCPBuildSpec, GCPBuildStatus, InstanceSpec, NetworkSpec, SubnetSpec};
use std::sync::Arc;

/// A minimal build: project "p", region "us-central1", zone
/// "us-central1-a", one subnet "sub-a" with no pinned region.
pub fn test_build(name: &str) -> GCPBuild {
    let spec = GCPBuildSpec {
        project: "p".to_string(),
        region: "us-central1".to_string(),
        zone: "us-central1-a".to_string(),
        network: NetworkSpec {
            name: Some(name.to_string()),
            auto_create_subnetworks: Some(false),
            subnets: vec![SubnetSpec {
                name: "sub-a".to_string(),
                cidr_block: "10.0.0.0/24".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        },
        firewalls: Vec::new(),
        instance: InstanceSpec {
            machine_type: "e2-medium".to_string(),
            source_image: "projects/debian-cloud/global/images/family/debian-12".to_string(),
            ..Default::default()
        },
        load_balancer: None,
        image_name: None,
    };
    let mut build = GCPBuild::new(name, spec);
    build.metadata.namespace = Some("default".to_string());
    build
}

/// Same as [`test_build`] but with a preset status.
pub fn test_build_with_status(name: &str, status: GCPBuildStatus) -> GCPBuild {
    let mut build = test_build(name);
    build.status = Some(status);
    build
}

/// Wraps a build in a scope.
pub fn test_scope(build: GCPBuild) -> Arc<BuildScope> {
    Arc::new(BuildScope::new(Arc::new(build)).expect("test build has a name"))
}
