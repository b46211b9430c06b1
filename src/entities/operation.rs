//! Operation contract shared by every infrastructure workflow

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

/// Name of the reserved ingress address
pub const INGRESS_IP_ADDRESS_NAME: &str = "ingressPublicIPAddress";
/// Name of the reserved DNS server address
pub const DNS_PUBLIC_IP_ADDRESS_NAME: &str = "dnsPublicIPAddress";
/// Name of the reserved CoreDNS address
pub const COREDNS_PUBLIC_IP_ADDRESS_NAME: &str = "corednsPublicIPAddress";
/// Name of the reserved VPN server address
pub const VPNSERVER_PUBLIC_IP_ADDRESS_NAME: &str = "vpnserverPublicIPAddress";

/// Progress of a given infrastructure operation
///
/// The order is total: `Init → Registered → InProgress → {Finished | Error}`.
/// Once a terminal state is reached no field of the operation mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskProgress {
    /// The operation has been built but not yet admitted
    Init,
    /// The operation has been admitted by the executor
    Registered,
    /// The operation body is running
    InProgress,
    /// The operation failed
    Error,
    /// The operation completed successfully
    Finished,
}

impl TaskProgress {
    /// Whether the operation has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskProgress::Error | TaskProgress::Finished)
    }
}

impl fmt::Display for TaskProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskProgress::Init => "Init",
            TaskProgress::Registered => "Registered",
            TaskProgress::InProgress => "InProgress",
            TaskProgress::Error => "Error",
            TaskProgress::Finished => "Finished",
        };
        write!(f, "{}", name)
    }
}

/// Type of operation being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    /// Provision a new cluster
    Provision,
    /// Scale an existing cluster
    Scale,
    /// Decommission an existing cluster
    Decommission,
    /// Management operation such as kubeconfig retrieval
    Management,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationType::Provision => "Provision",
            OperationType::Scale => "Scale",
            OperationType::Decommission => "Decommission",
            OperationType::Management => "Management",
        };
        write!(f, "{}", name)
    }
}

/// Metadata associated with an operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationMetadata {
    /// Organization that triggered the operation
    pub organization_id: String,
    /// Cluster target of the operation
    pub cluster_id: String,
    /// Request identifier for tracking purposes
    pub request_id: String,
}

/// Static IP addresses reserved during a provision operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticIpAddresses {
    /// Address serving ingress traffic
    #[serde(default)]
    pub ingress: String,
    /// Address of the platform DNS server
    #[serde(default)]
    pub dns: String,
    /// ZeroTier planet address. Never populated by any workflow.
    #[serde(default)]
    pub zt_planet: String,
    /// Address of the externally exposed CoreDNS
    #[serde(default)]
    pub coredns_ext: String,
    /// Address of the VPN server
    #[serde(default)]
    pub vpn_server: String,
}

impl StaticIpAddresses {
    /// Assign a reserved address to the slot matching its reservation name.
    pub fn set_ip_address(&mut self, address_name: &str, ip: &str) {
        match address_name {
            INGRESS_IP_ADDRESS_NAME => self.ingress = ip.to_string(),
            DNS_PUBLIC_IP_ADDRESS_NAME => self.dns = ip.to_string(),
            COREDNS_PUBLIC_IP_ADDRESS_NAME => self.coredns_ext = ip.to_string(),
            VPNSERVER_PUBLIC_IP_ADDRESS_NAME => self.vpn_server = ip.to_string(),
            other => warn!(address_name = other, "unknown IP address reservation name"),
        }
    }
}

/// Result of a successful provisioning
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResult {
    /// Normalized name of the cluster
    pub cluster_name: String,
    /// Hostname where the cluster is reachable
    pub hostname: String,
    /// Contents of the resulting kubeconfig file
    pub raw_kube_config: String,
    /// Addresses reserved for the cluster
    pub static_ip_addresses: StaticIpAddresses,
}

/// Result of a management operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagementResult {
    /// Contents of the retrieved kubeconfig file
    pub raw_kube_config: String,
}

/// Typed payload of an operation result. The variant is determined by the
/// operation type; the response-mapping layer switches on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedResult {
    /// Provisioning payload
    Provision(ProvisionResult),
    /// Scaling carries progress only
    Scale,
    /// Decommissioning carries progress only
    Decommission,
    /// Management payload
    Management(ManagementResult),
}

/// Snapshot of the state of an operation
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// Request identifier
    pub request_id: String,
    /// Type of operation being executed
    pub operation_type: OperationType,
    /// State of the operation
    pub progress: TaskProgress,
    /// Time since the operation was launched, in nanoseconds
    pub elapsed_nanos: i64,
    /// Description of the error in case the operation failed
    pub error_message: String,
    /// Typed payload
    pub typed: TypedResult,
}

/// Callback invoked when an operation finishes its execution, successfully
/// or not. Receives the request identifier of the finished operation.
pub type CompletionCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// An ongoing operation performed by an infrastructure provider.
///
/// Implementations must be safe to inspect concurrently with their own
/// execution: `log`, `progress` and `result` return point-in-time snapshots.
#[async_trait]
pub trait InfrastructureOperation: Send + Sync {
    /// Request identifier associated with this operation
    fn request_id(&self) -> String;

    /// Metadata associated with this operation
    fn metadata(&self) -> OperationMetadata;

    /// Snapshot of the append-only execution log
    fn log(&self) -> Vec<String>;

    /// Current operation state
    fn progress(&self) -> TaskProgress;

    /// Set a new progress on the ongoing operation
    fn set_progress(&self, progress: TaskProgress);

    /// Trigger the execution of the operation. The callback is invoked
    /// exactly once when the operation finishes, independently of status.
    async fn execute(&self, callback: CompletionCallback);

    /// Trigger the cancellation of the operation
    fn cancel(&self) -> Result<()>;

    /// Snapshot of the operation result
    fn result(&self) -> OperationResult;
}
