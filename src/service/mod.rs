//! Request managers and the API service
//!
//! Each lifecycle kind has a manager holding the operations it accepted,
//! keyed by request identifier. Managers validate, build the operation
//! through the provider factory, schedule it on the executor and answer
//! progress queries by mapping operation results into responses.

mod decommissioner;
mod management;
mod provisioner;
mod scaler;
mod server;

pub use decommissioner::DecommissionManager;
pub use management::ManagementManager;
pub use provisioner::ProvisionManager;
pub use scaler::ScaleManager;
pub use server::{router, AppState, Service};

use crate::config::Config;
use crate::entities::Platform;
use crate::provider::azure::AzureCredentials;
use crate::provider::{new_infrastructure_provider, InfrastructureProvider};
use crate::Result;

/// Builds infrastructure providers for incoming requests.
///
/// The default implementation delegates to the platform factory; tests
/// substitute their own to avoid touching the cloud.
pub trait ProviderFactory: Send + Sync {
    /// Create a provider for the requested platform
    fn create(
        &self,
        target_platform: Platform,
        azure_credentials: Option<&AzureCredentials>,
        config: &Config,
    ) -> Result<Box<dyn InfrastructureProvider>>;
}

/// Factory backed by the real platform providers
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn create(
        &self,
        target_platform: Platform,
        azure_credentials: Option<&AzureCredentials>,
        config: &Config,
    ) -> Result<Box<dyn InfrastructureProvider>> {
        new_infrastructure_provider(target_platform, azure_credentials, config)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::entities::{
        CompletionCallback, DecommissionRequest, InfrastructureOperation, ManagementRequest,
        ManagementResult, OperationMetadata, OperationResult, OperationType, ProvisionRequest,
        ProvisionResult, ScaleRequest, TaskProgress, TypedResult,
    };
    use crate::{Error, Result};

    /// Operation stub that completes immediately with `Finished`.
    pub(crate) struct StubOperation {
        request_id: String,
        operation_type: OperationType,
        progress: Mutex<TaskProgress>,
        executions: AtomicUsize,
    }

    impl StubOperation {
        pub fn new(request_id: &str, operation_type: OperationType) -> Arc<Self> {
            Arc::new(Self {
                request_id: request_id.to_string(),
                operation_type,
                progress: Mutex::new(TaskProgress::Init),
                executions: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl InfrastructureOperation for StubOperation {
        fn request_id(&self) -> String {
            self.request_id.clone()
        }

        fn metadata(&self) -> OperationMetadata {
            OperationMetadata {
                request_id: self.request_id.clone(),
                ..OperationMetadata::default()
            }
        }

        fn log(&self) -> Vec<String> {
            vec!["stub operation".to_string()]
        }

        fn progress(&self) -> TaskProgress {
            *self.progress.lock().unwrap()
        }

        fn set_progress(&self, progress: TaskProgress) {
            *self.progress.lock().unwrap() = progress;
        }

        async fn execute(&self, callback: CompletionCallback) {
            self.executions.fetch_add(1, Ordering::SeqCst);
            self.set_progress(TaskProgress::Finished);
            callback(&self.request_id);
        }

        fn cancel(&self) -> Result<()> {
            Err(Error::unimplemented("cancel is not supported"))
        }

        fn result(&self) -> OperationResult {
            let typed = match self.operation_type {
                OperationType::Provision => TypedResult::Provision(ProvisionResult::default()),
                OperationType::Scale => TypedResult::Scale,
                OperationType::Decommission => TypedResult::Decommission,
                OperationType::Management => TypedResult::Management(ManagementResult {
                    raw_kube_config: "contexts: []".to_string(),
                }),
            };
            OperationResult {
                request_id: self.request_id.clone(),
                operation_type: self.operation_type,
                progress: self.progress(),
                elapsed_nanos: 1,
                error_message: String::new(),
                typed,
            }
        }
    }

    /// Provider stub handing out [`StubOperation`]s.
    pub(crate) struct StubProvider;

    impl InfrastructureProvider for StubProvider {
        fn provision(
            &self,
            request: ProvisionRequest,
        ) -> Result<Arc<dyn InfrastructureOperation>> {
            Ok(StubOperation::new(&request.request_id, OperationType::Provision))
        }

        fn scale(&self, request: ScaleRequest) -> Result<Arc<dyn InfrastructureOperation>> {
            Ok(StubOperation::new(&request.request_id, OperationType::Scale))
        }

        fn decommission(
            &self,
            request: DecommissionRequest,
        ) -> Result<Arc<dyn InfrastructureOperation>> {
            Ok(StubOperation::new(
                &request.request_id,
                OperationType::Decommission,
            ))
        }

        fn get_kube_config(
            &self,
            request: ManagementRequest,
        ) -> Result<Arc<dyn InfrastructureOperation>> {
            Ok(StubOperation::new(
                &request.request_id,
                OperationType::Management,
            ))
        }
    }

    /// Factory stub returning [`StubProvider`]s.
    pub(crate) struct StubFactory;

    impl ProviderFactory for StubFactory {
        fn create(
            &self,
            _target_platform: Platform,
            _azure_credentials: Option<&AzureCredentials>,
            _config: &Config,
        ) -> Result<Box<dyn InfrastructureProvider>> {
            Ok(Box::new(StubProvider))
        }
    }

    pub(crate) fn test_credentials() -> AzureCredentials {
        AzureCredentials {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            subscription_id: "sub".to_string(),
            tenant_id: "tenant".to_string(),
            ..AzureCredentials::default()
        }
    }
}
