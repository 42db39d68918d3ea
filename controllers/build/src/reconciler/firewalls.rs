//! Firewall rule reconciler.
//!
//! Thinner than subnets: every declared rule is created if absent, and
//! deletion removes exactly the rules this build declared, tolerating
//! not-found. Rules are never updated in place.

use super::Reconciler;
use crate::error::ControllerError;
use crate::scope::BuildScope;
use gcp_compute_client::FirewallsApi;
use gcp_compute_client::models::Firewall;
use std::sync::Arc;
use tracing::{debug, info};

const SERVICE_NAME: &str = "firewalls";

/// The slice of scope the firewall reconciler consumes.
pub trait FirewallScope: Send + Sync {
    /// Project the firewall rules live in.
    fn project(&self) -> &str;
    /// Desired firewall rule bodies.
    fn firewall_rules_spec(&self) -> Vec<Firewall>;
}

impl FirewallScope for BuildScope {
    fn project(&self) -> &str {
        BuildScope::project(self)
    }

    fn firewall_rules_spec(&self) -> Vec<Firewall> {
        BuildScope::firewall_rules_spec(self)
    }
}

/// Reconciles the build's firewall rules.
pub struct Service<S> {
    scope: Arc<S>,
    firewalls: Arc<dyn FirewallsApi>,
}

impl<S: FirewallScope> Service<S> {
    /// Creates a new firewall service.
    pub fn new(scope: Arc<S>, firewalls: Arc<dyn FirewallsApi>) -> Self {
        Self { scope, firewalls }
    }
}

#[async_trait::async_trait]
impl<S: FirewallScope> Reconciler for Service<S> {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    async fn reconcile(&self) -> Result<(), ControllerError> {
        let project = self.scope.project();
        for desired in self.scope.firewall_rules_spec() {
            match self.firewalls.get_firewall(project, &desired.name).await {
                Ok(_) => {
                    debug!("Firewall rule {} already exists", desired.name);
                }
                Err(e) if e.is_not_found() => {
                    info!("Creating firewall rule {}", desired.name);
                    self.firewalls.insert_firewall(project, &desired).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn delete(&self) -> Result<(), ControllerError> {
        let project = self.scope.project();
        for desired in self.scope.firewall_rules_spec() {
            info!("Deleting firewall rule {}", desired.name);
            match self.firewalls.delete_firewall(project, &desired.name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!("Firewall rule {} already gone", desired.name);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_build, test_scope};
    use crds::FirewallAllowRule;
    use gcp_compute_client::MockComputeClient;

    fn build_with_rules(name: &str) -> crds::GCPBuild {
        let mut build = test_build(name);
        build.spec.firewalls = vec![crds::FirewallSpec {
            name: format!("{name}-allow-ssh"),
            allowed: vec![FirewallAllowRule {
                protocol: "tcp".to_string(),
                ports: vec!["22".to_string()],
            }],
            source_ranges: vec!["0.0.0.0/0".to_string()],
            ..Default::default()
        }];
        build
    }

    fn service(scope: Arc<BuildScope>, mock: &MockComputeClient) -> Service<BuildScope> {
        Service::new(scope, Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let mock = MockComputeClient::new();
        let svc = service(test_scope(build_with_rules("b1")), &mock);

        assert!(svc.reconcile().await.is_ok());
        assert!(svc.reconcile().await.is_ok());
        assert_eq!(mock.call_count("firewalls.insert"), 1);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_rules() {
        let mock = MockComputeClient::new();
        let svc = service(test_scope(build_with_rules("b1")), &mock);

        // Never created: delete is still success.
        assert!(svc.delete().await.is_ok());
        assert_eq!(mock.call_count("firewalls.delete"), 1);
    }

    #[tokio::test]
    async fn delete_removes_declared_rules() {
        let mock = MockComputeClient::new();
        let svc = service(test_scope(build_with_rules("b1")), &mock);

        assert!(svc.reconcile().await.is_ok());
        assert!(svc.delete().await.is_ok());
        // Re-reconcile after delete recreates the rule.
        assert!(svc.reconcile().await.is_ok());
        assert_eq!(mock.call_count("firewalls.insert"), 2);
    }
}
