//! Request, response and operation entities shared across the crate

mod operation;
mod request;
mod response;

pub use operation::{
    CompletionCallback, InfrastructureOperation, ManagementResult, OperationMetadata,
    OperationResult, OperationType, ProvisionResult, StaticIpAddresses, TaskProgress, TypedResult,
    COREDNS_PUBLIC_IP_ADDRESS_NAME, DNS_PUBLIC_IP_ADDRESS_NAME, INGRESS_IP_ADDRESS_NAME,
    VPNSERVER_PUBLIC_IP_ADDRESS_NAME,
};
pub use request::{
    valid_cluster_request, valid_decommission_cluster_request, valid_provision_cluster_request,
    valid_scale_cluster_request, AzureOptions, ClusterRequest, DecommissionClusterRequest,
    DecommissionRequest, ManagementRequest, Platform, ProvisionClusterRequest, ProvisionRequest,
    ScaleClusterRequest, ScaleRequest,
};
pub use response::{
    KubeConfigResponse, OpResponse, ProvisionClusterResponse, ScaleClusterResponse,
};
