//! GCP Compute REST API client
//!
//! Implements the narrow per-resource traits against the Compute v1
//! REST endpoints. Mutating calls return long-running operations; the
//! client logs them and returns, because callers re-derive state from
//! live queries on the next tick rather than polling operations.

use crate::error::ComputeError;
use crate::models::*;
use crate::{
    FirewallsApi, ImagesApi, InstanceGroupsApi, InstancesApi, NetworksApi, SubnetworksApi,
};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Default Compute v1 endpoint.
pub const DEFAULT_COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";

/// Compute API client bound to an access token, not to a project.
pub struct GcpComputeClient {
    client: Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for GcpComputeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpComputeClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GcpComputeClient {
    /// Create a new compute client.
    ///
    /// # Arguments
    /// * `base_url` - Compute API base URL (see [`DEFAULT_COMPUTE_API`])
    /// * `token` - OAuth2 access token for authentication
    pub fn new(base_url: String, token: String) -> Result<Self, ComputeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ComputeError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Validate the access token by listing networks in the project.
    ///
    /// Makes a lightweight authenticated request so misconfiguration is
    /// reported at startup instead of on the first reconcile tick.
    pub async fn validate_access(&self, project: &str) -> Result<(), ComputeError> {
        let url = format!(
            "{}/projects/{}/global/networks?maxResults=1",
            self.base_url, project
        );
        debug!("Validating compute API access for project {}", project);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ComputeError::Http)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == 401 || status == 403 {
            return Err(ComputeError::Authentication(format!(
                "Invalid access token: {status} - {body}"
            )));
        }
        if !status.is_success() {
            return Err(ComputeError::Api(format!(
                "Failed to validate access: {status} - {body}"
            )));
        }

        debug!("Compute API access validated");
        Ok(())
    }

    async fn get_json<T: for<'de> serde::Deserialize<'de>>(
        &self,
        url: &str,
    ) -> Result<T, ComputeError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ComputeError::Http)?;

        let status = response.status();
        if status == 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::NotFound(format!(
                "Resource not found: {url} - {body}"
            )));
        }
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::Authentication(format!("{status} - {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::Api(format!(
                "GET {url} failed: {status} - {body}"
            )));
        }

        response.json().await.map_err(ComputeError::Http)
    }

    /// POST a mutation and log the returned operation.
    async fn post_operation(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<(), ComputeError> {
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(ComputeError::Http)?;

        let status = response.status();
        if status == 404 {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ComputeError::NotFound(format!(
                "Resource not found: {url} - {body_text}"
            )));
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ComputeError::Api(format!(
                "POST {url} failed: {status} - {body_text}"
            )));
        }

        let op: Operation = response.json().await.map_err(ComputeError::Http)?;
        debug!("Operation {} ({}) accepted", op.name, op.status);
        Ok(())
    }

    /// DELETE a resource and log the returned operation. 404 surfaces
    /// as [`ComputeError::NotFound`] so callers can treat an
    /// already-absent resource as success.
    async fn delete_operation(&self, url: &str) -> Result<(), ComputeError> {
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(ComputeError::Http)?;

        let status = response.status();
        if status == 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::NotFound(format!(
                "Resource not found: {url} - {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ComputeError::Api(format!(
                "DELETE {url} failed: {status} - {body}"
            )));
        }

        let op: Operation = response.json().await.map_err(ComputeError::Http)?;
        debug!("Operation {} ({}) accepted", op.name, op.status);
        Ok(())
    }

    fn regional_url(&self, project: &str, region: &str, collection: &str, name: &str) -> String {
        let mut url = format!(
            "{}/projects/{}/regions/{}/{}",
            self.base_url, project, region, collection
        );
        if !name.is_empty() {
            url.push('/');
            url.push_str(name);
        }
        url
    }

    fn global_url(&self, project: &str, collection: &str, name: &str) -> String {
        let mut url = format!("{}/projects/{}/global/{}", self.base_url, project, collection);
        if !name.is_empty() {
            url.push('/');
            url.push_str(name);
        }
        url
    }

    fn zonal_url(&self, project: &str, zone: &str, collection: &str, name: &str) -> String {
        let mut url = format!(
            "{}/projects/{}/zones/{}/{}",
            self.base_url, project, zone, collection
        );
        if !name.is_empty() {
            url.push('/');
            url.push_str(name);
        }
        url
    }

    fn to_body<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ComputeError> {
        serde_json::to_value(value).map_err(ComputeError::Serialization)
    }
}

#[async_trait::async_trait]
impl SubnetworksApi for GcpComputeClient {
    async fn get_subnetwork(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<Subnetwork, ComputeError> {
        let url = self.regional_url(project, region, "subnetworks", name);
        self.get_json(&url).await
    }

    async fn insert_subnetwork(
        &self,
        project: &str,
        region: &str,
        subnetwork: &Subnetwork,
    ) -> Result<(), ComputeError> {
        let url = self.regional_url(project, region, "subnetworks", "");
        self.post_operation(&url, &Self::to_body(subnetwork)?).await
    }

    async fn delete_subnetwork(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<(), ComputeError> {
        let url = self.regional_url(project, region, "subnetworks", name);
        self.delete_operation(&url).await
    }
}

#[async_trait::async_trait]
impl NetworksApi for GcpComputeClient {
    async fn get_network(&self, project: &str, name: &str) -> Result<Network, ComputeError> {
        let url = self.global_url(project, "networks", name);
        self.get_json(&url).await
    }

    async fn insert_network(&self, project: &str, network: &Network) -> Result<(), ComputeError> {
        let url = self.global_url(project, "networks", "");
        self.post_operation(&url, &Self::to_body(network)?).await
    }

    async fn delete_network(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        let url = self.global_url(project, "networks", name);
        self.delete_operation(&url).await
    }
}

#[async_trait::async_trait]
impl FirewallsApi for GcpComputeClient {
    async fn get_firewall(&self, project: &str, name: &str) -> Result<Firewall, ComputeError> {
        let url = self.global_url(project, "firewalls", name);
        self.get_json(&url).await
    }

    async fn insert_firewall(
        &self,
        project: &str,
        firewall: &Firewall,
    ) -> Result<(), ComputeError> {
        let url = self.global_url(project, "firewalls", "");
        self.post_operation(&url, &Self::to_body(firewall)?).await
    }

    async fn delete_firewall(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        let url = self.global_url(project, "firewalls", name);
        self.delete_operation(&url).await
    }
}

#[async_trait::async_trait]
impl InstancesApi for GcpComputeClient {
    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Instance, ComputeError> {
        let url = self.zonal_url(project, zone, "instances", name);
        self.get_json(&url).await
    }

    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &Instance,
    ) -> Result<(), ComputeError> {
        let url = self.zonal_url(project, zone, "instances", "");
        self.post_operation(&url, &Self::to_body(instance)?).await
    }

    async fn delete_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<(), ComputeError> {
        let url = self.zonal_url(project, zone, "instances", name);
        self.delete_operation(&url).await
    }

    async fn stop_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<(), ComputeError> {
        let url = format!("{}/stop", self.zonal_url(project, zone, "instances", name));
        self.post_operation(&url, &serde_json::json!({})).await
    }
}

#[async_trait::async_trait]
impl InstanceGroupsApi for GcpComputeClient {
    async fn list_instance_group_instances(
        &self,
        project: &str,
        zone: &str,
        group: &str,
    ) -> Result<Vec<InstanceWithNamedPorts>, ComputeError> {
        let base = format!(
            "{}/listInstances",
            self.zonal_url(project, zone, "instanceGroups", group)
        );

        let mut members = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = match &page_token {
                Some(token) => format!("{}?pageToken={}", base, urlencoding::encode(token)),
                None => base.clone(),
            };
            debug!("POST {}", url);

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.token)
                .header("Accept", "application/json")
                .header("Content-Type", "application/json")
                .json(&serde_json::json!({ "instanceState": "ALL" }))
                .send()
                .await
                .map_err(ComputeError::Http)?;

            let status = response.status();
            if status == 404 {
                let body = response.text().await.unwrap_or_default();
                return Err(ComputeError::NotFound(format!(
                    "Instance group not found: {group} - {body}"
                )));
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ComputeError::Api(format!(
                    "POST {url} failed: {status} - {body}"
                )));
            }

            let page: InstanceGroupsListInstances =
                response.json().await.map_err(ComputeError::Http)?;
            members.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(members)
    }

    async fn add_instance_to_group(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instance_url: &str,
    ) -> Result<(), ComputeError> {
        let url = format!(
            "{}/addInstances",
            self.zonal_url(project, zone, "instanceGroups", group)
        );
        let body = serde_json::json!({ "instances": [{ "instance": instance_url }] });
        self.post_operation(&url, &body).await
    }

    async fn remove_instance_from_group(
        &self,
        project: &str,
        zone: &str,
        group: &str,
        instance_url: &str,
    ) -> Result<(), ComputeError> {
        let url = format!(
            "{}/removeInstances",
            self.zonal_url(project, zone, "instanceGroups", group)
        );
        let body = serde_json::json!({ "instances": [{ "instance": instance_url }] });
        self.post_operation(&url, &body).await
    }
}

#[async_trait::async_trait]
impl ImagesApi for GcpComputeClient {
    async fn get_image(&self, project: &str, name: &str) -> Result<Image, ComputeError> {
        let url = self.global_url(project, "images", name);
        self.get_json(&url).await
    }

    async fn insert_image(&self, project: &str, image: &Image) -> Result<(), ComputeError> {
        let url = self.global_url(project, "images", "");
        self.post_operation(&url, &Self::to_body(image)?).await
    }

    async fn delete_image(&self, project: &str, name: &str) -> Result<(), ComputeError> {
        let url = self.global_url(project, "images", name);
        self.delete_operation(&url).await
    }
}
