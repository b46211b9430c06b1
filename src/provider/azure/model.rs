//! Wire models for the Azure resource manager and graph APIs
//!
//! Only the fields the workflows read or write are modelled; everything else
//! is left to the provider's defaults. Output-only fields are optional.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported VM sizes for AKS agent pools. Node type lookups run against
/// this closed set.
pub const POSSIBLE_VM_SIZES: &[&str] = &[
    "Standard_A1",
    "Standard_A10",
    "Standard_A11",
    "Standard_A1_v2",
    "Standard_A2",
    "Standard_A2_v2",
    "Standard_A2m_v2",
    "Standard_A3",
    "Standard_A4",
    "Standard_A4_v2",
    "Standard_A4m_v2",
    "Standard_A5",
    "Standard_A6",
    "Standard_A7",
    "Standard_A8",
    "Standard_A8_v2",
    "Standard_A8m_v2",
    "Standard_A9",
    "Standard_B2ms",
    "Standard_B2s",
    "Standard_B4ms",
    "Standard_B8ms",
    "Standard_D1",
    "Standard_D11",
    "Standard_D11_v2",
    "Standard_D12",
    "Standard_D12_v2",
    "Standard_D13",
    "Standard_D13_v2",
    "Standard_D14",
    "Standard_D14_v2",
    "Standard_D15_v2",
    "Standard_D16_v3",
    "Standard_D16s_v3",
    "Standard_D1_v2",
    "Standard_D2",
    "Standard_D2_v2",
    "Standard_D2_v3",
    "Standard_D2s_v3",
    "Standard_D3",
    "Standard_D32_v3",
    "Standard_D32s_v3",
    "Standard_D3_v2",
    "Standard_D4",
    "Standard_D4_v2",
    "Standard_D4_v3",
    "Standard_D4s_v3",
    "Standard_D5_v2",
    "Standard_D64_v3",
    "Standard_D64s_v3",
    "Standard_D8_v3",
    "Standard_D8s_v3",
    "Standard_DS1",
    "Standard_DS11",
    "Standard_DS11_v2",
    "Standard_DS12",
    "Standard_DS12_v2",
    "Standard_DS13",
    "Standard_DS13_v2",
    "Standard_DS14",
    "Standard_DS14_v2",
    "Standard_DS15_v2",
    "Standard_DS1_v2",
    "Standard_DS2",
    "Standard_DS2_v2",
    "Standard_DS3",
    "Standard_DS3_v2",
    "Standard_DS4",
    "Standard_DS4_v2",
    "Standard_DS5_v2",
    "Standard_E16_v3",
    "Standard_E16s_v3",
    "Standard_E2_v3",
    "Standard_E2s_v3",
    "Standard_E32_v3",
    "Standard_E32s_v3",
    "Standard_E4_v3",
    "Standard_E4s_v3",
    "Standard_E64_v3",
    "Standard_E64s_v3",
    "Standard_E8_v3",
    "Standard_E8s_v3",
    "Standard_F1",
    "Standard_F16",
    "Standard_F16s",
    "Standard_F16s_v2",
    "Standard_F1s",
    "Standard_F2",
    "Standard_F2s",
    "Standard_F2s_v2",
    "Standard_F32s_v2",
    "Standard_F4",
    "Standard_F4s",
    "Standard_F4s_v2",
    "Standard_F64s_v2",
    "Standard_F72s_v2",
    "Standard_F8",
    "Standard_F8s",
    "Standard_F8s_v2",
    "Standard_G1",
    "Standard_G2",
    "Standard_G3",
    "Standard_G4",
    "Standard_G5",
    "Standard_GS1",
    "Standard_GS2",
    "Standard_GS3",
    "Standard_GS4",
    "Standard_GS5",
    "Standard_L16s",
    "Standard_L32s",
    "Standard_L4s",
    "Standard_L8s",
    "Standard_M128-32ms",
    "Standard_M128-64ms",
    "Standard_M128ms",
    "Standard_M128s",
    "Standard_M64-16ms",
    "Standard_M64-32ms",
    "Standard_M64ms",
    "Standard_M64s",
    "Standard_NC12",
    "Standard_NC12s_v2",
    "Standard_NC12s_v3",
    "Standard_NC24",
    "Standard_NC24r",
    "Standard_NC24rs_v2",
    "Standard_NC24rs_v3",
    "Standard_NC24s_v2",
    "Standard_NC24s_v3",
    "Standard_NC6",
    "Standard_NC6s_v2",
    "Standard_NC6s_v3",
    "Standard_ND12s",
    "Standard_ND24rs",
    "Standard_ND24s",
    "Standard_ND6s",
    "Standard_NV12",
    "Standard_NV24",
    "Standard_NV6",
];

/// A managed AKS cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCluster {
    /// Fully qualified resource identifier. Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Resource name. Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Region where the cluster lives
    #[serde(default)]
    pub location: String,
    /// Resource tags. Carry the cluster lineage markers.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Cluster properties
    #[serde(default)]
    pub properties: ManagedClusterProperties,
}

/// Properties of a managed cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterProperties {
    /// Provisioning state of the cluster. Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    /// Kubernetes version running on the cluster
    #[serde(default)]
    pub kubernetes_version: String,
    /// DNS prefix of the API server
    #[serde(default)]
    pub dns_prefix: String,
    /// Fully qualified domain name of the API server. Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    /// Agent pools backing the cluster
    #[serde(default)]
    pub agent_pool_profiles: Vec<ManagedClusterAgentPoolProfile>,
    /// Service principal the cluster uses against the Azure APIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_principal_profile: Option<ManagedClusterServicePrincipalProfile>,
    /// Auto-generated resource group holding the worker VMs. Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_resource_group: Option<String>,
    /// Whether Kubernetes RBAC is enabled
    #[serde(default, rename = "enableRBAC")]
    pub enable_rbac: bool,
    /// Network configuration of the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_profile: Option<NetworkProfile>,
}

/// An agent pool of a managed cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAgentPoolProfile {
    /// Name of the agent pool
    pub name: String,
    /// Number of agents in the pool
    pub count: i32,
    /// VM size used by the agents
    pub vm_size: String,
    /// OS disk size in GB. Zero selects the provider default.
    #[serde(default)]
    pub os_disk_size_gb: i32,
    /// Operating system of the agents
    #[serde(default)]
    pub os_type: String,
    /// Maximum pods per node. Unset selects the provider default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<i32>,
    /// Whether the autoscaler manages this pool
    #[serde(default)]
    pub enable_auto_scaling: bool,
    /// Agent pool type
    #[serde(default, rename = "type")]
    pub pool_type: String,
    /// Kubernetes version running on the agents
    #[serde(default)]
    pub orchestrator_version: String,
    /// Whether agents receive their own public IP
    #[serde(default, rename = "enableNodePublicIP")]
    pub enable_node_public_ip: bool,
    /// Taints applied to new nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_taints: Option<Vec<String>>,
}

/// Service principal used by the cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterServicePrincipalProfile {
    /// Application (client) identifier
    pub client_id: String,
    /// Secret associated with the application
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
}

/// Network configuration of a managed cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    /// Network plugin used by the cluster
    #[serde(default)]
    pub network_plugin: String,
    /// SKU of the cluster load balancer
    #[serde(default)]
    pub load_balancer_sku: String,
}

/// Credentials of a managed cluster
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResults {
    /// Kubeconfig documents, base64 encoded
    #[serde(default)]
    pub kubeconfigs: Vec<CredentialResult>,
}

/// One kubeconfig entry of the credential results
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResult {
    /// Name of the credential
    #[serde(default)]
    pub name: String,
    /// Base64 encoded kubeconfig contents
    #[serde(default)]
    pub value: String,
}

/// A public IP address resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpAddress {
    /// Resource name. Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Region where the address is reserved
    #[serde(default)]
    pub location: String,
    /// Resource tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Address properties
    #[serde(default)]
    pub properties: PublicIpAddressProperties,
}

/// Properties of a public IP address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIpAddressProperties {
    /// Allocation method of the address
    #[serde(default, rename = "publicIPAllocationMethod")]
    pub public_ip_allocation_method: String,
    /// Idle timeout in minutes
    #[serde(default)]
    pub idle_timeout_in_minutes: i32,
    /// The reserved address. Output only.
    #[serde(default, rename = "ipAddress", skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// A DNS zone
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsZone {
    /// Fully qualified resource identifier
    #[serde(default)]
    pub id: String,
    /// Name of the zone
    #[serde(default)]
    pub name: String,
}

/// Type of a DNS record set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Address record
    A,
    /// Name server record
    Ns,
}

impl RecordType {
    /// Path segment of the record type in the DNS API
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Ns => "NS",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A DNS record set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Fully qualified resource identifier. Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Relative name of the record set. Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Record set properties
    #[serde(default)]
    pub properties: RecordSetProperties,
}

/// Properties of a DNS record set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSetProperties {
    /// Time to live of the records, in seconds
    #[serde(default, rename = "TTL")]
    pub ttl: i64,
    /// Fully qualified domain name of the record set. Output only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    /// Address records
    #[serde(default, rename = "ARecords", skip_serializing_if = "Option::is_none")]
    pub a_records: Option<Vec<ARecord>>,
    /// Name server records
    #[serde(default, rename = "NSRecords", skip_serializing_if = "Option::is_none")]
    pub ns_records: Option<Vec<NsRecord>>,
}

/// An address record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ARecord {
    /// IPv4 address the record points at
    pub ipv4_address: String,
}

/// A name server record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsRecord {
    /// Name server domain name
    pub nsdname: String,
}

/// A directory application entity
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Object identifier of the application
    #[serde(default)]
    pub object_id: String,
    /// Application (client) identifier
    #[serde(default)]
    pub app_id: String,
    /// Display name of the application
    #[serde(default)]
    pub display_name: String,
}

/// Parameters to create a directory application
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCreateParameters {
    /// Display name of the application
    pub display_name: String,
    /// Identifier URIs of the application
    pub identifier_uris: Vec<String>,
    /// Whether the application is visible to other tenants
    pub available_to_other_tenants: bool,
    /// Homepage of the application
    pub homepage: String,
    /// Password credentials attached to the application
    pub password_credentials: Vec<PasswordCredential>,
}

/// A password credential of a directory application
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordCredential {
    /// Start of the validity period, RFC 3339
    pub start_date: String,
    /// End of the validity period, RFC 3339
    pub end_date: String,
    /// Key identifier
    pub key_id: String,
    /// Secret value
    pub value: String,
}

/// A directory service principal entity
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    /// Object identifier of the service principal
    #[serde(default)]
    pub object_id: String,
    /// Application the principal is associated with
    #[serde(default)]
    pub app_id: String,
}

/// Parameters to create a service principal
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipalCreateParameters {
    /// Application the principal is associated with
    pub app_id: String,
    /// Whether the account is enabled
    pub account_enabled: bool,
    /// Tags attached to the principal
    pub tags: Vec<String>,
}

/// A role definition
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinition {
    /// Fully qualified identifier of the role
    #[serde(default)]
    pub id: String,
    /// Role properties
    #[serde(default)]
    pub properties: RoleDefinitionProperties,
}

/// Properties of a role definition
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinitionProperties {
    /// Display name of the role
    #[serde(default)]
    pub role_name: String,
}

/// Parameters to create a role assignment
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentParameters {
    /// Assignment properties
    pub properties: RoleAssignmentProperties,
}

/// Properties of a role assignment
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentProperties {
    /// Role being assigned
    pub role_definition_id: String,
    /// Principal receiving the role
    pub principal_id: String,
}

/// A role assignment
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    /// Fully qualified identifier of the assignment
    #[serde(default)]
    pub id: String,
}
