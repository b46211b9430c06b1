//! REST client for the Azure resource manager and graph endpoints
//!
//! Tokens are acquired with the client-credentials grant against the
//! directory endpoint. The graph and management audiences are distinct and
//! cached separately: identity calls authenticated with a management token
//! fail opaquely, so every request picks the authorizer matching its
//! endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::api::{
    DirectoryService, DnsService, ManagedClusterService, OperationFuture, PublicIpService,
};
use super::credentials::AzureCredentials;
use super::model::{
    Application, ApplicationCreateParameters, CredentialResults, DnsZone, ManagedCluster,
    PublicIpAddress, RecordSet, RecordType, RoleAssignment, RoleAssignmentParameters,
    RoleDefinition, ServicePrincipal, ServicePrincipalCreateParameters,
};
use crate::{Error, Result};

/// Directory endpoint used when the credentials file does not carry one
pub const DEFAULT_ACTIVE_DIRECTORY_ENDPOINT: &str = "https://login.microsoftonline.com";
/// Resource manager endpoint used when the credentials file does not carry one
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
/// Graph endpoint, audience of the identity calls
pub const GRAPH_ENDPOINT: &str = "https://graph.windows.net";

const CONTAINER_SERVICE_API_VERSION: &str = "2019-08-01";
const NETWORK_API_VERSION: &str = "2019-02-01";
const DNS_API_VERSION: &str = "2018-05-01";
const GRAPH_API_VERSION: &str = "1.6";
const AUTHORIZATION_API_VERSION: &str = "2015-07-01";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Tokens are refreshed this long before their reported expiry
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Audience a request authenticates against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Audience {
    Management,
    Graph,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct TokenCache {
    inner: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct AsyncOperationStatus {
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default)]
    next_link: Option<String>,
}

/// REST implementation of the Azure capability traits
pub struct ArmRestClient {
    http: reqwest::Client,
    credentials: AzureCredentials,
    management_token: TokenCache,
    graph_token: TokenCache,
}

impl ArmRestClient {
    /// Create a client for the given credentials.
    pub fn new(credentials: AzureCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::internal(format!("cannot build http client: {}", e)))?;
        Ok(Self {
            http,
            credentials,
            management_token: TokenCache::default(),
            graph_token: TokenCache::default(),
        })
    }

    fn directory_base(&self) -> String {
        let endpoint = if self.credentials.active_directory_endpoint_url.is_empty() {
            DEFAULT_ACTIVE_DIRECTORY_ENDPOINT
        } else {
            &self.credentials.active_directory_endpoint_url
        };
        endpoint.trim_end_matches('/').to_string()
    }

    fn management_base(&self) -> String {
        let endpoint = if self.credentials.resource_manager_endpoint_url.is_empty() {
            DEFAULT_MANAGEMENT_ENDPOINT
        } else {
            &self.credentials.resource_manager_endpoint_url
        };
        endpoint.trim_end_matches('/').to_string()
    }

    async fn token(&self, audience: Audience) -> Result<String> {
        let cache = match audience {
            Audience::Management => &self.management_token,
            Audience::Graph => &self.graph_token,
        };
        let mut guard = cache.inner.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let resource = match audience {
            Audience::Management => format!("{}/", self.management_base()),
            Audience::Graph => format!("{}/", GRAPH_ENDPOINT),
        };
        let url = format!(
            "{}/{}/oauth2/token",
            self.directory_base(),
            self.credentials.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("resource", resource.as_str()),
        ];
        let response = self.http.post(&url).form(&params).send().await?;
        let response = check_response(response, "cannot obtain access token").await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::internal(format!("cannot decode token response: {}", e)))?;

        let lifetime = token
            .expires_in
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(3600);
        let expires_at = Instant::now() + Duration::from_secs(lifetime)
            - TOKEN_REFRESH_MARGIN.min(Duration::from_secs(lifetime / 2));
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        audience: Audience,
        url: &str,
        context: &str,
    ) -> Result<T> {
        let token = self.token(audience).await?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        let response = check_response(response, context).await?;
        response
            .json()
            .await
            .map_err(|e| Error::internal(format!("{}: cannot decode response: {}", context, e)))
    }

    async fn put_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        audience: Audience,
        url: &str,
        body: &B,
        context: &str,
    ) -> Result<T> {
        let token = self.token(audience).await?;
        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let response = check_response(response, context).await?;
        response
            .json()
            .await
            .map_err(|e| Error::internal(format!("{}: cannot decode response: {}", context, e)))
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        audience: Audience,
        url: &str,
        body: &B,
        context: &str,
    ) -> Result<T> {
        let token = self.token(audience).await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let response = check_response(response, context).await?;
        response
            .json()
            .await
            .map_err(|e| Error::internal(format!("{}: cannot decode response: {}", context, e)))
    }

    /// Issue a mutation and capture the status-monitor handle from the
    /// response headers.
    async fn begin_mutation(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<serde_json::Value>,
        context: &str,
    ) -> Result<OperationFuture> {
        let token = self.token(Audience::Management).await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let response = check_response(response, context).await?;
        let monitor_url = response
            .headers()
            .get("azure-asyncoperation")
            .or_else(|| response.headers().get("location"))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(OperationFuture {
            monitor_url,
            resource_url: url.to_string(),
        })
    }

    /// Drive a long-running operation to completion under a deadline.
    async fn wait_for_completion(
        &self,
        future: &OperationFuture,
        deadline: Duration,
        context: &str,
    ) -> Result<()> {
        let start = Instant::now();
        loop {
            if start.elapsed() > deadline {
                return Err(Error::internal(format!(
                    "{}: operation did not complete within {}s",
                    context,
                    deadline.as_secs()
                )));
            }
            let state = match &future.monitor_url {
                Some(monitor) => {
                    let status: AsyncOperationStatus =
                        self.get_json(Audience::Management, monitor, context).await?;
                    status.status
                }
                None => {
                    let resource: serde_json::Value = self
                        .get_json(Audience::Management, &future.resource_url, context)
                        .await?;
                    resource
                        .pointer("/properties/provisioningState")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                }
            };
            debug!(context, state = %state, "polled long-running operation");
            match state.as_str() {
                "Succeeded" => return Ok(()),
                "Failed" | "Canceled" => {
                    return Err(Error::internal(format!(
                        "{}: operation finished with state {}",
                        context, state
                    )));
                }
                _ => {}
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn cluster_url(&self, resource_group: &str, resource_name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}?api-version={}",
            self.management_base(),
            self.credentials.subscription_id,
            resource_group,
            resource_name,
            CONTAINER_SERVICE_API_VERSION
        )
    }

    fn public_ip_url(&self, resource_group: &str, address_name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/publicIPAddresses/{}?api-version={}",
            self.management_base(),
            self.credentials.subscription_id,
            resource_group,
            address_name,
            NETWORK_API_VERSION
        )
    }

    fn record_set_url(
        &self,
        resource_group: &str,
        zone_name: &str,
        record_type: RecordType,
        record_name: &str,
    ) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnsZones/{}/{}/{}?api-version={}",
            self.management_base(),
            self.credentials.subscription_id,
            resource_group,
            zone_name,
            record_type.as_str(),
            record_name,
            DNS_API_VERSION
        )
    }

    async fn collect_pages<T: DeserializeOwned>(&self, first_url: String, context: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first_url);
        while let Some(url) = next {
            let page: Page<T> = self.get_json(Audience::Management, &url, context).await?;
            items.extend(page.value);
            next = page.next_link;
        }
        Ok(items)
    }
}

async fn check_response(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = truncate_body(&body);
    match status {
        StatusCode::NOT_FOUND => Err(Error::not_found(format!("{}: {}", context, detail))),
        _ => Err(Error::internal(format!(
            "{}: request failed with status {}: {}",
            context, status, detail
        ))),
    }
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 512;
    if body.len() <= LIMIT {
        body.to_string()
    } else {
        let boundary = body
            .char_indices()
            .take_while(|(index, _)| *index < LIMIT)
            .map(|(index, c)| index + c.len_utf8())
            .last()
            .unwrap_or(0);
        format!("{}...", &body[..boundary])
    }
}

#[async_trait]
impl ManagedClusterService for ArmRestClient {
    async fn get_cluster(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> Result<ManagedCluster> {
        self.get_json(
            Audience::Management,
            &self.cluster_url(resource_group, resource_name),
            "cannot retrieve managed cluster",
        )
        .await
    }

    async fn begin_create_or_update(
        &self,
        resource_group: &str,
        resource_name: &str,
        parameters: ManagedCluster,
    ) -> Result<OperationFuture> {
        let body = serde_json::to_value(&parameters)
            .map_err(|e| Error::internal(format!("cannot encode cluster request: {}", e)))?;
        self.begin_mutation(
            reqwest::Method::PUT,
            &self.cluster_url(resource_group, resource_name),
            Some(body),
            "cannot create AKS cluster",
        )
        .await
    }

    async fn begin_delete(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> Result<OperationFuture> {
        self.begin_mutation(
            reqwest::Method::DELETE,
            &self.cluster_url(resource_group, resource_name),
            None,
            "cannot delete AKS cluster",
        )
        .await
    }

    async fn wait_for_cluster(
        &self,
        future: OperationFuture,
        deadline: Duration,
    ) -> Result<ManagedCluster> {
        self.wait_for_completion(&future, deadline, "AKS cluster operation")
            .await?;
        self.get_json(
            Audience::Management,
            &future.resource_url,
            "cannot retrieve managed cluster after completion",
        )
        .await
    }

    async fn wait_for_deletion(&self, future: OperationFuture, deadline: Duration) -> Result<()> {
        match &future.monitor_url {
            Some(_) => {
                self.wait_for_completion(&future, deadline, "AKS cluster deletion")
                    .await
            }
            None => {
                // Without a monitor the resource itself is polled until it
                // disappears.
                let start = Instant::now();
                loop {
                    if start.elapsed() > deadline {
                        return Err(Error::internal(format!(
                            "AKS cluster deletion did not complete within {}s",
                            deadline.as_secs()
                        )));
                    }
                    let result: Result<serde_json::Value> = self
                        .get_json(
                            Audience::Management,
                            &future.resource_url,
                            "AKS cluster deletion",
                        )
                        .await;
                    match result {
                        Err(Error::NotFound(_)) => return Ok(()),
                        Err(err) => return Err(err),
                        Ok(_) => tokio::time::sleep(POLL_INTERVAL).await,
                    }
                }
            }
        }
    }

    async fn list_cluster_user_credentials(
        &self,
        resource_group: &str,
        resource_name: &str,
    ) -> Result<CredentialResults> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}/listClusterUserCredential?api-version={}",
            self.management_base(),
            self.credentials.subscription_id,
            resource_group,
            resource_name,
            CONTAINER_SERVICE_API_VERSION
        );
        self.post_json(
            Audience::Management,
            &url,
            &serde_json::json!({}),
            "cannot obtain cluster credentials",
        )
        .await
    }
}

#[async_trait]
impl PublicIpService for ArmRestClient {
    async fn begin_create_or_update(
        &self,
        resource_group: &str,
        address_name: &str,
        parameters: PublicIpAddress,
    ) -> Result<OperationFuture> {
        let body = serde_json::to_value(&parameters)
            .map_err(|e| Error::internal(format!("cannot encode IP address request: {}", e)))?;
        self.begin_mutation(
            reqwest::Method::PUT,
            &self.public_ip_url(resource_group, address_name),
            Some(body),
            "cannot create IP address",
        )
        .await
    }

    async fn wait_for_address(
        &self,
        future: OperationFuture,
        deadline: Duration,
    ) -> Result<PublicIpAddress> {
        self.wait_for_completion(&future, deadline, "IP address creation")
            .await?;
        self.get_json(
            Audience::Management,
            &future.resource_url,
            "cannot retrieve IP address after completion",
        )
        .await
    }
}

#[async_trait]
impl DnsService for ArmRestClient {
    async fn list_zones(&self) -> Result<Vec<DnsZone>> {
        let url = format!(
            "{}/subscriptions/{}/providers/Microsoft.Network/dnszones?api-version={}",
            self.management_base(),
            self.credentials.subscription_id,
            DNS_API_VERSION
        );
        self.collect_pages(url, "cannot retrieve list of zones").await
    }

    async fn create_or_update_record_set(
        &self,
        resource_group: &str,
        zone_name: &str,
        record_type: RecordType,
        record_name: &str,
        parameters: RecordSet,
    ) -> Result<RecordSet> {
        self.put_json(
            Audience::Management,
            &self.record_set_url(resource_group, zone_name, record_type, record_name),
            &parameters,
            "cannot create DNS entry",
        )
        .await
    }

    async fn delete_record_set(
        &self,
        resource_group: &str,
        zone_name: &str,
        record_type: RecordType,
        record_name: &str,
    ) -> Result<()> {
        let token = self.token(Audience::Management).await?;
        let url = self.record_set_url(resource_group, zone_name, record_type, record_name);
        let response = self.http.delete(&url).bearer_auth(token).send().await?;
        check_response(response, "cannot delete DNS entry").await?;
        Ok(())
    }

    async fn list_record_sets_by_suffix(
        &self,
        resource_group: &str,
        zone_name: &str,
        record_type: RecordType,
        name_suffix: &str,
    ) -> Result<Vec<RecordSet>> {
        let url = format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnsZones/{}/{}?api-version={}&$recordsetnamesuffix={}",
            self.management_base(),
            self.credentials.subscription_id,
            resource_group,
            zone_name,
            record_type.as_str(),
            DNS_API_VERSION,
            name_suffix
        );
        self.collect_pages(url, "cannot retrieve list of record sets")
            .await
    }
}

#[async_trait]
impl DirectoryService for ArmRestClient {
    async fn create_application(
        &self,
        parameters: ApplicationCreateParameters,
    ) -> Result<Application> {
        let url = format!(
            "{}/{}/applications?api-version={}",
            GRAPH_ENDPOINT, self.credentials.tenant_id, GRAPH_API_VERSION
        );
        self.post_json_graph(&url, &parameters, "cannot create application entity")
            .await
    }

    async fn create_service_principal(
        &self,
        parameters: ServicePrincipalCreateParameters,
    ) -> Result<ServicePrincipal> {
        let url = format!(
            "{}/{}/servicePrincipals?api-version={}",
            GRAPH_ENDPOINT, self.credentials.tenant_id, GRAPH_API_VERSION
        );
        self.post_json_graph(&url, &parameters, "creation of associated service principal failed")
            .await
    }

    async fn list_role_definitions(&self, scope: &str) -> Result<Vec<RoleDefinition>> {
        let url = format!(
            "{}{}/providers/Microsoft.Authorization/roleDefinitions?api-version={}",
            self.management_base(),
            scope,
            AUTHORIZATION_API_VERSION
        );
        self.collect_pages(url, "cannot retrieve list of roles").await
    }

    async fn create_role_assignment(
        &self,
        scope: &str,
        assignment_name: &str,
        parameters: RoleAssignmentParameters,
    ) -> Result<RoleAssignment> {
        let url = format!(
            "{}{}/providers/Microsoft.Authorization/roleAssignments/{}?api-version={}",
            self.management_base(),
            scope,
            assignment_name,
            AUTHORIZATION_API_VERSION
        );
        self.put_json(Audience::Management, &url, &parameters, "cannot assign role")
            .await
    }
}

impl ArmRestClient {
    async fn post_json_graph<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        context: &str,
    ) -> Result<T> {
        let token = self.token(Audience::Graph).await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let response = check_response(response, context).await?;
        response
            .json()
            .await
            .map_err(|e| Error::internal(format!("{}: cannot decode response: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ArmRestClient {
        ArmRestClient::new(AzureCredentials {
            subscription_id: "sub-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            ..AzureCredentials::default()
        })
        .unwrap()
    }

    #[test]
    fn cluster_url_targets_the_container_service_provider() {
        let url = client().cluster_url("dev", "mngt-dev01");
        assert!(url.starts_with("https://management.azure.com/subscriptions/sub-1/"));
        assert!(url.contains("/resourceGroups/dev/"));
        assert!(url.contains("Microsoft.ContainerService/managedClusters/mngt-dev01"));
        assert!(url.ends_with(&format!("api-version={}", CONTAINER_SERVICE_API_VERSION)));
    }

    #[test]
    fn record_set_url_includes_the_record_type_segment() {
        let url = client().record_set_url("dns-rg", "example.tech", RecordType::Ns, "ep.dev01");
        assert!(url.contains("/dnsZones/example.tech/NS/ep.dev01?"));
    }

    #[test]
    fn custom_management_endpoint_is_honoured() {
        let client = ArmRestClient::new(AzureCredentials {
            subscription_id: "sub-1".to_string(),
            resource_manager_endpoint_url: "https://management.usgovcloudapi.net/".to_string(),
            ..AzureCredentials::default()
        })
        .unwrap();
        assert_eq!(
            client.management_base(),
            "https://management.usgovcloudapi.net"
        );
    }

    #[test]
    fn token_response_accepts_string_lifetimes() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc", "expires_in": "3599"}"#).unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_in.as_deref(), Some("3599"));
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let truncated = truncate_body(&body);
        assert!(truncated.len() < 600);
        assert!(truncated.ends_with("..."));
    }
}
