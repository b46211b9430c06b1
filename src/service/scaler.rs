//! Manager for cluster scaling requests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use super::{DefaultProviderFactory, ProviderFactory};
use crate::config::Config;
use crate::entities::{
    valid_scale_cluster_request, InfrastructureOperation, ScaleClusterRequest,
    ScaleClusterResponse, ScaleRequest, TaskProgress,
};
use crate::executor::Executor;
use crate::{Error, Result};

/// Accepts scaling requests and tracks their operations
pub struct ScaleManager {
    config: Config,
    executor: Arc<Executor>,
    factory: Arc<dyn ProviderFactory>,
    /// Operation per request identifier
    operations: Mutex<HashMap<String, Arc<dyn InfrastructureOperation>>>,
}

impl ScaleManager {
    /// Create a manager bound to the process-wide executor.
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, Executor::global(), Arc::new(DefaultProviderFactory))
    }

    /// Create a manager with explicit collaborators.
    pub fn with_parts(
        config: Config,
        executor: Arc<Executor>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            config,
            executor,
            factory,
            operations: Mutex::new(HashMap::new()),
        }
    }

    /// Trigger the scaling operation on the requested infrastructure
    /// provider.
    pub fn scale_cluster(&self, request: &ScaleClusterRequest) -> Result<ScaleClusterResponse> {
        valid_scale_cluster_request(request)?;
        debug!(
            request_id = %request.request_id,
            num_nodes = request.num_nodes,
            "Scale request received"
        );
        let provider = self.factory.create(
            request.target_platform,
            request.azure_credentials.as_ref(),
            &self.config,
        )?;
        let operation = provider.scale(ScaleRequest::from(request)).map_err(|err| {
            error!(error = %err, "cannot create scale operation");
            err
        })?;

        let mut operations = self.operations.lock().expect("manager state poisoned");
        if operations.contains_key(&request.request_id) {
            return Err(Error::already_exists("request is already being processed"));
        }
        operations.insert(request.request_id.clone(), Arc::clone(&operation));
        self.executor.schedule_operation(operation);

        Ok(ScaleClusterResponse {
            request_id: request.request_id.clone(),
            state: TaskProgress::Init,
            elapsed_time: 0,
            error: String::new(),
        })
    }

    /// Get an updated state of a scaling request.
    pub fn check_progress(&self, request_id: &str) -> Result<ScaleClusterResponse> {
        let operations = self.operations.lock().expect("manager state poisoned");
        let operation = operations
            .get(request_id)
            .ok_or_else(|| Error::not_found("request_id not found"))?;
        operation.result().to_scale_cluster_response()
    }

    /// Remove the information of a processed scaling request. Does not
    /// cancel in-flight work.
    pub fn remove_scale(&self, request_id: &str) -> Result<()> {
        let mut operations = self.operations.lock().expect("manager state poisoned");
        if operations.remove(request_id).is_none() {
            return Err(Error::not_found("request_id not found"));
        }
        Ok(())
    }
}
