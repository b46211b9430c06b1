//! Azure infrastructure provider
//!
//! Implements the four lifecycle operations against AKS: provisioning,
//! scaling, decommissioning and kubeconfig retrieval.

mod api;
mod credentials;
mod decommission;
mod management;
mod model;
mod operation;
mod provision;
mod rest;
mod scale;

pub use api::{
    AzureApi, DirectoryService, DnsService, ManagedClusterService, OperationFuture,
    PublicIpService,
};
pub use credentials::AzureCredentials;
pub use decommission::{DecommissionerOperation, CLUSTER_DECOMMISSION_DEADLINE};
pub use management::{ManagementOperation, ManagementOperationType};
pub use model::{
    DnsZone, ManagedCluster, ManagedClusterAgentPoolProfile, PublicIpAddress, RecordSet,
    RecordType, POSSIBLE_VM_SIZES,
};
pub use operation::{
    normalize_cluster_name, AzureOperation, AZURE_RETRIES, CLUSTER_ID_TAG, CLUSTER_NAME_TAG,
    CONTRIBUTOR_ROLE, CREATED_BY_TAG, CREATED_BY_VALUE, DNS_ZONE_TAG,
    IP_ADDRESS_CREATE_DEADLINE, ORGANIZATION_ID_TAG,
};
pub use provision::{
    ProvisionerOperation, APPLICATION_IP_ADDRESS_NAMES, CLUSTER_CREATE_DEADLINE,
    MANAGEMENT_IP_ADDRESS_NAMES,
};
pub use rest::ArmRestClient;
pub use scale::ScalerOperation;

use std::sync::Arc;

use crate::config::Config;
use crate::entities::{
    DecommissionRequest, InfrastructureOperation, ManagementRequest, ProvisionRequest,
    ScaleRequest,
};
use crate::provider::InfrastructureProvider;
use crate::Result;

/// Infrastructure provider backed by the Azure APIs
pub struct AzureInfrastructureProvider {
    credentials: AzureCredentials,
    api: AzureApi,
    config: Config,
}

impl AzureInfrastructureProvider {
    /// Create a provider for a set of credentials.
    ///
    /// Fails only on credential preparation problems.
    pub fn new(credentials: AzureCredentials, config: Config) -> Result<Self> {
        let api = AzureApi::connect(&credentials)?;
        Ok(Self {
            credentials,
            api,
            config,
        })
    }
}

impl InfrastructureProvider for AzureInfrastructureProvider {
    fn provision(&self, request: ProvisionRequest) -> Result<Arc<dyn InfrastructureOperation>> {
        Ok(Arc::new(ProvisionerOperation::new(
            self.credentials.clone(),
            self.api.clone(),
            request,
            &self.config,
        )))
    }

    fn scale(&self, request: ScaleRequest) -> Result<Arc<dyn InfrastructureOperation>> {
        Ok(Arc::new(ScalerOperation::new(
            self.credentials.clone(),
            self.api.clone(),
            request,
        )))
    }

    fn decommission(
        &self,
        request: DecommissionRequest,
    ) -> Result<Arc<dyn InfrastructureOperation>> {
        Ok(Arc::new(DecommissionerOperation::new(
            self.credentials.clone(),
            self.api.clone(),
            request,
        )))
    }

    fn get_kube_config(
        &self,
        request: ManagementRequest,
    ) -> Result<Arc<dyn InfrastructureOperation>> {
        Ok(Arc::new(ManagementOperation::new(
            self.credentials.clone(),
            self.api.clone(),
            request,
            ManagementOperationType::GetKubeConfig,
        )))
    }
}
