//! Lifecycle request messages and their validation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::provider::azure::AzureCredentials;
use crate::{Error, Result};

/// Target platform determining the infrastructure provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Platform {
    /// Microsoft Azure AKS
    Azure,
    /// Baremetal deployment. Declared extension point, not yet supported.
    Baremetal,
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_uppercase().as_str() {
            "AZURE" => Ok(Platform::Azure),
            "BAREMETAL" => Ok(Platform::Baremetal),
            other => Err(Error::invalid_argument(format!(
                "unknown target platform [{}]",
                other
            ))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Azure => write!(f, "AZURE"),
            Platform::Baremetal => write!(f, "BAREMETAL"),
        }
    }
}

impl TryFrom<String> for Platform {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.to_string()
    }
}

/// Provisioning options specific to Azure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureOptions {
    /// Resource group where the cluster lives
    #[serde(default)]
    pub resource_group: String,
    /// Name of the DNS zone where the cluster entries are managed
    #[serde(default)]
    pub dns_zone_name: String,
}

/// Request to provision a new cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionClusterRequest {
    /// Request identifier for tracking purposes
    #[serde(default)]
    pub request_id: String,
    /// Organization that owns the cluster
    #[serde(default)]
    pub organization_id: String,
    /// Cluster identifier. For management clusters it matches the cluster name.
    #[serde(default)]
    pub cluster_id: String,
    /// Name of the cluster as provided by the user
    #[serde(default)]
    pub cluster_name: String,
    /// Kubernetes version to be installed
    #[serde(default)]
    pub kubernetes_version: String,
    /// Number of nodes of the cluster to be created
    #[serde(default)]
    pub num_nodes: i64,
    /// Type of node to be requested. Must exist in the target provider.
    #[serde(default)]
    pub node_type: String,
    /// Zone where the cluster will be provisioned
    #[serde(default)]
    pub zone: String,
    /// Whether the cluster is a management or an application cluster
    #[serde(default)]
    pub is_management_cluster: bool,
    /// Whether the cluster serves a production environment
    #[serde(default)]
    pub is_production: bool,
    /// Target platform determining the provider
    pub target_platform: Platform,
    /// Credentials for the Azure provider
    #[serde(default)]
    pub azure_credentials: Option<AzureCredentials>,
    /// Azure specific options
    #[serde(default)]
    pub azure_options: Option<AzureOptions>,
}

/// Request to scale an existing cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleClusterRequest {
    /// Request identifier for tracking purposes
    #[serde(default)]
    pub request_id: String,
    /// Organization that owns the cluster
    #[serde(default)]
    pub organization_id: String,
    /// Cluster identifier
    #[serde(default)]
    pub cluster_id: String,
    /// Target number of nodes. A floor of three nodes is enforced at execution.
    #[serde(default)]
    pub num_nodes: i64,
    /// Whether the cluster is a management or an application cluster
    #[serde(default)]
    pub is_management_cluster: bool,
    /// Target platform determining the provider
    pub target_platform: Platform,
    /// Credentials for the Azure provider
    #[serde(default)]
    pub azure_credentials: Option<AzureCredentials>,
    /// Azure specific options
    #[serde(default)]
    pub azure_options: Option<AzureOptions>,
}

/// Request to decommission an existing cluster.
///
/// The DNS zone is read from the cluster tags at execution time, never from
/// the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecommissionClusterRequest {
    /// Request identifier for tracking purposes
    #[serde(default)]
    pub request_id: String,
    /// Organization that owns the cluster
    #[serde(default)]
    pub organization_id: String,
    /// Cluster identifier
    #[serde(default)]
    pub cluster_id: String,
    /// Whether the cluster is a management or an application cluster
    #[serde(default)]
    pub is_management_cluster: bool,
    /// Target platform determining the provider
    pub target_platform: Platform,
    /// Credentials for the Azure provider
    #[serde(default)]
    pub azure_credentials: Option<AzureCredentials>,
    /// Azure specific options
    #[serde(default)]
    pub azure_options: Option<AzureOptions>,
}

/// Request for a management operation on an existing cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequest {
    /// Request identifier for tracking purposes
    #[serde(default)]
    pub request_id: String,
    /// Organization that owns the cluster
    #[serde(default)]
    pub organization_id: String,
    /// Cluster identifier
    #[serde(default)]
    pub cluster_id: String,
    /// Whether the cluster is a management or an application cluster
    #[serde(default)]
    pub is_management_cluster: bool,
    /// Target platform determining the provider
    pub target_platform: Platform,
    /// Credentials for the Azure provider
    #[serde(default)]
    pub azure_credentials: Option<AzureCredentials>,
    /// Azure specific options
    #[serde(default)]
    pub azure_options: Option<AzureOptions>,
}

fn require_azure_options(
    platform: Platform,
    options: &Option<AzureOptions>,
    need_dns_zone: bool,
) -> Result<()> {
    if platform != Platform::Azure {
        return Ok(());
    }
    let options = options
        .as_ref()
        .ok_or_else(|| Error::invalid_argument("azure_options must be set when type is Azure"))?;
    if options.resource_group.is_empty() {
        return Err(Error::invalid_argument(
            "azure_options.resource_group cannot be empty",
        ));
    }
    if need_dns_zone && options.dns_zone_name.is_empty() {
        return Err(Error::invalid_argument(
            "azure_options.dns_zone_name cannot be empty",
        ));
    }
    Ok(())
}

fn require_azure_credentials(
    platform: Platform,
    credentials: &Option<AzureCredentials>,
) -> Result<()> {
    if platform == Platform::Azure && credentials.is_none() {
        return Err(Error::invalid_argument(
            "azure_credentials must be set when type is Azure",
        ));
    }
    Ok(())
}

/// Validate a request to provision a new cluster
pub fn valid_provision_cluster_request(request: &ProvisionClusterRequest) -> Result<()> {
    if request.request_id.is_empty() {
        return Err(Error::invalid_argument("request_id must be set"));
    }
    if !request.is_management_cluster && request.organization_id.is_empty() {
        return Err(Error::invalid_argument("organization_id must be set"));
    }
    if !request.is_management_cluster && request.cluster_id.is_empty() {
        return Err(Error::invalid_argument("cluster_id must be set"));
    }
    if request.num_nodes <= 0 {
        return Err(Error::invalid_argument("num_nodes must be positive"));
    }
    if request.node_type.is_empty() {
        return Err(Error::invalid_argument("node_type must be set"));
    }
    require_azure_credentials(request.target_platform, &request.azure_credentials)?;
    require_azure_options(request.target_platform, &request.azure_options, true)
}

/// Validate a request to scale an existing cluster
pub fn valid_scale_cluster_request(request: &ScaleClusterRequest) -> Result<()> {
    if request.request_id.is_empty() {
        return Err(Error::invalid_argument("request_id must be set"));
    }
    if request.cluster_id.is_empty() {
        return Err(Error::invalid_argument("cluster_id must be set"));
    }
    if request.num_nodes <= 0 {
        return Err(Error::invalid_argument("num_nodes must be positive"));
    }
    require_azure_credentials(request.target_platform, &request.azure_credentials)?;
    require_azure_options(request.target_platform, &request.azure_options, false)
}

/// Validate a request to decommission an existing cluster
pub fn valid_decommission_cluster_request(request: &DecommissionClusterRequest) -> Result<()> {
    if request.request_id.is_empty() {
        return Err(Error::invalid_argument("request_id must be set"));
    }
    if request.cluster_id.is_empty() {
        return Err(Error::invalid_argument("cluster_id must be set"));
    }
    require_azure_credentials(request.target_platform, &request.azure_credentials)?;
    require_azure_options(request.target_platform, &request.azure_options, false)
}

/// Validate a management cluster request
pub fn valid_cluster_request(request: &ClusterRequest) -> Result<()> {
    if request.request_id.is_empty() {
        return Err(Error::invalid_argument("request_id must be set"));
    }
    if request.organization_id.is_empty() {
        return Err(Error::invalid_argument("organization_id cannot be empty"));
    }
    if request.cluster_id.is_empty() {
        return Err(Error::invalid_argument("cluster_id cannot be empty"));
    }
    require_azure_options(request.target_platform, &request.azure_options, false)
}

/// Internal provision request handed to the provider
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Request identifier
    pub request_id: String,
    /// Organization that owns the cluster
    pub organization_id: String,
    /// Cluster identifier
    pub cluster_id: String,
    /// Name of the cluster as provided by the user
    pub cluster_name: String,
    /// Kubernetes version to be installed
    pub kubernetes_version: String,
    /// Number of nodes of the cluster to be created
    pub num_nodes: i64,
    /// Type of node to be requested
    pub node_type: String,
    /// Zone where the cluster will be provisioned
    pub zone: String,
    /// Whether the cluster is a management or an application cluster
    pub is_management_cluster: bool,
    /// Whether the cluster serves a production environment
    pub is_production: bool,
    /// Azure specific options
    pub azure_options: AzureOptions,
}

impl From<&ProvisionClusterRequest> for ProvisionRequest {
    fn from(request: &ProvisionClusterRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            organization_id: request.organization_id.clone(),
            cluster_id: request.cluster_id.clone(),
            cluster_name: request.cluster_name.clone(),
            kubernetes_version: request.kubernetes_version.clone(),
            num_nodes: request.num_nodes,
            node_type: request.node_type.clone(),
            zone: request.zone.clone(),
            is_management_cluster: request.is_management_cluster,
            is_production: request.is_production,
            azure_options: request.azure_options.clone().unwrap_or_default(),
        }
    }
}

/// Internal scale request handed to the provider
#[derive(Debug, Clone)]
pub struct ScaleRequest {
    /// Request identifier
    pub request_id: String,
    /// Organization that owns the cluster
    pub organization_id: String,
    /// Cluster identifier
    pub cluster_id: String,
    /// Target number of nodes
    pub num_nodes: i64,
    /// Whether the cluster is a management or an application cluster
    pub is_management_cluster: bool,
    /// Azure specific options
    pub azure_options: AzureOptions,
}

impl From<&ScaleClusterRequest> for ScaleRequest {
    fn from(request: &ScaleClusterRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            organization_id: request.organization_id.clone(),
            cluster_id: request.cluster_id.clone(),
            num_nodes: request.num_nodes,
            is_management_cluster: request.is_management_cluster,
            azure_options: request.azure_options.clone().unwrap_or_default(),
        }
    }
}

/// Internal decommission request handed to the provider
#[derive(Debug, Clone)]
pub struct DecommissionRequest {
    /// Request identifier
    pub request_id: String,
    /// Organization that owns the cluster
    pub organization_id: String,
    /// Cluster identifier
    pub cluster_id: String,
    /// Whether the cluster is a management or an application cluster
    pub is_management_cluster: bool,
    /// Azure specific options
    pub azure_options: AzureOptions,
}

impl From<&DecommissionClusterRequest> for DecommissionRequest {
    fn from(request: &DecommissionClusterRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            organization_id: request.organization_id.clone(),
            cluster_id: request.cluster_id.clone(),
            is_management_cluster: request.is_management_cluster,
            azure_options: request.azure_options.clone().unwrap_or_default(),
        }
    }
}

/// Internal management request handed to the provider
#[derive(Debug, Clone)]
pub struct ManagementRequest {
    /// Request identifier
    pub request_id: String,
    /// Organization that owns the cluster
    pub organization_id: String,
    /// Cluster identifier
    pub cluster_id: String,
    /// Whether the cluster is a management or an application cluster
    pub is_management_cluster: bool,
    /// Azure specific options
    pub azure_options: AzureOptions,
}

impl From<&ClusterRequest> for ManagementRequest {
    fn from(request: &ClusterRequest) -> Self {
        Self {
            request_id: request.request_id.clone(),
            organization_id: request.organization_id.clone(),
            cluster_id: request.cluster_id.clone(),
            is_management_cluster: request.is_management_cluster,
            azure_options: request.azure_options.clone().unwrap_or_default(),
        }
    }
}
