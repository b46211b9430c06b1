//! Response messages and the mapping from operation results

use serde::{Deserialize, Serialize};

use super::operation::{OperationResult, OperationType, StaticIpAddresses, TaskProgress, TypedResult};
use crate::{Error, Result};

/// Response to a cluster provisioning request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionClusterResponse {
    /// Request identifier
    pub request_id: String,
    /// State of the operation
    pub state: TaskProgress,
    /// Time since the operation was launched, in nanoseconds
    pub elapsed_time: i64,
    /// Description of the error, if any
    #[serde(default)]
    pub error: String,
    /// Normalized name of the provisioned cluster
    #[serde(default)]
    pub cluster_name: String,
    /// Hostname where the cluster is reachable
    #[serde(default)]
    pub hostname: String,
    /// Contents of the resulting kubeconfig file
    #[serde(default)]
    pub raw_kube_config: String,
    /// Addresses reserved for the cluster
    #[serde(default)]
    pub static_ip_addresses: Option<StaticIpAddresses>,
}

/// Response to a cluster scaling request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleClusterResponse {
    /// Request identifier
    pub request_id: String,
    /// State of the operation
    pub state: TaskProgress,
    /// Time since the operation was launched, in nanoseconds
    pub elapsed_time: i64,
    /// Description of the error, if any
    #[serde(default)]
    pub error: String,
}

/// Response to an operation that carries progress only
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResponse {
    /// Request identifier
    pub request_id: String,
    /// State of the operation
    pub state: TaskProgress,
    /// Time since the operation was launched, in nanoseconds
    pub elapsed_time: i64,
    /// Description of the error, if any
    #[serde(default)]
    pub error: String,
}

/// Response carrying the kubeconfig of a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeConfigResponse {
    /// Request identifier
    pub request_id: String,
    /// State of the operation
    pub state: TaskProgress,
    /// Time since the operation was launched, in nanoseconds
    pub elapsed_time: i64,
    /// Description of the error, if any
    #[serde(default)]
    pub error: String,
    /// Contents of the retrieved kubeconfig file
    #[serde(default)]
    pub raw_kube_config: String,
}

impl OperationResult {
    /// Map this result into a provision cluster response.
    pub fn to_provision_cluster_response(&self) -> Result<ProvisionClusterResponse> {
        if self.operation_type != OperationType::Provision {
            return Err(Error::internal(format!(
                "cannot create provision cluster response for a {} operation",
                self.operation_type
            )));
        }
        let mut response = ProvisionClusterResponse {
            request_id: self.request_id.clone(),
            state: self.progress,
            elapsed_time: self.elapsed_nanos,
            error: self.error_message.clone(),
            cluster_name: String::new(),
            hostname: String::new(),
            raw_kube_config: String::new(),
            static_ip_addresses: None,
        };
        if let TypedResult::Provision(provision) = &self.typed {
            response.cluster_name = provision.cluster_name.clone();
            response.hostname = provision.hostname.clone();
            response.raw_kube_config = provision.raw_kube_config.clone();
            response.static_ip_addresses = Some(provision.static_ip_addresses.clone());
        }
        Ok(response)
    }

    /// Map this result into a scale cluster response.
    pub fn to_scale_cluster_response(&self) -> Result<ScaleClusterResponse> {
        if self.operation_type != OperationType::Scale {
            return Err(Error::internal(format!(
                "cannot create scale cluster response for a {} operation",
                self.operation_type
            )));
        }
        Ok(ScaleClusterResponse {
            request_id: self.request_id.clone(),
            state: self.progress,
            elapsed_time: self.elapsed_nanos,
            error: self.error_message.clone(),
        })
    }

    /// Map this result into a plain operation response.
    pub fn to_op_response(&self) -> Result<OpResponse> {
        if self.operation_type != OperationType::Decommission {
            return Err(Error::internal(format!(
                "cannot create operation response for a {} operation",
                self.operation_type
            )));
        }
        Ok(OpResponse {
            request_id: self.request_id.clone(),
            state: self.progress,
            elapsed_time: self.elapsed_nanos,
            error: self.error_message.clone(),
        })
    }

    /// Map this result into a kubeconfig response.
    pub fn to_kube_config_response(&self) -> Result<KubeConfigResponse> {
        if self.operation_type != OperationType::Management {
            return Err(Error::internal(format!(
                "cannot create kubeconfig response for a {} operation",
                self.operation_type
            )));
        }
        let raw_kube_config = match &self.typed {
            TypedResult::Management(management) => management.raw_kube_config.clone(),
            _ => String::new(),
        };
        Ok(KubeConfigResponse {
            request_id: self.request_id.clone(),
            state: self.progress,
            elapsed_time: self.elapsed_nanos,
            error: self.error_message.clone(),
            raw_kube_config,
        })
    }
}
