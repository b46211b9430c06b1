//! End-to-end tests of the operation engine through the public API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use cluster_provisioner::config::Config;
use cluster_provisioner::entities::{
    CompletionCallback, InfrastructureOperation, OperationMetadata, OperationResult,
    OperationType, Platform, ProvisionRequest, ScaleRequest, TaskProgress, TypedResult,
};
use cluster_provisioner::executor::{Executor, MAX_CONCURRENT_OPERATIONS};
use cluster_provisioner::provider::azure::AzureCredentials;
use cluster_provisioner::provider::{InfrastructureProvider, new_infrastructure_provider};
use cluster_provisioner::{Error, Result};

struct SleepyOperation {
    request_id: String,
    progress: Mutex<TaskProgress>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    callbacks: Arc<AtomicUsize>,
}

impl SleepyOperation {
    fn new(
        request_id: &str,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        callbacks: Arc<AtomicUsize>,
    ) -> Arc<Self> {
        Arc::new(Self {
            request_id: request_id.to_string(),
            progress: Mutex::new(TaskProgress::Init),
            active,
            peak,
            callbacks,
        })
    }
}

#[async_trait]
impl InfrastructureOperation for SleepyOperation {
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
        Vec::new()
    }

    fn progress(&self) -> TaskProgress {
        *self.progress.lock().unwrap()
    }

    fn set_progress(&self, progress: TaskProgress) {
        *self.progress.lock().unwrap() = progress;
    }

    async fn execute(&self, callback: CompletionCallback) {
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        self.set_progress(TaskProgress::InProgress);
        tokio::time::sleep(Duration::from_millis(250)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.set_progress(TaskProgress::Finished);
        self.callbacks.fetch_add(1, Ordering::SeqCst);
        callback(&self.request_id);
    }

    fn cancel(&self) -> Result<()> {
        Err(Error::unimplemented("cancel is not supported"))
    }

    fn result(&self) -> OperationResult {
        OperationResult {
            request_id: self.request_id.clone(),
            operation_type: OperationType::Scale,
            progress: self.progress(),
            elapsed_nanos: 0,
            error_message: String::new(),
            typed: TypedResult::Scale,
        }
    }
}

#[tokio::test]
async fn executor_runs_ten_operations_within_the_concurrency_ceiling() {
    let executor = Executor::new();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let callbacks = Arc::new(AtomicUsize::new(0));

    let operations: Vec<_> = (0..10)
        .map(|index| {
            SleepyOperation::new(
                &format!("request-{}", index),
                Arc::clone(&active),
                Arc::clone(&peak),
                Arc::clone(&callbacks),
            )
        })
        .collect();
    for operation in &operations {
        executor.schedule_operation(operation.clone());
    }

    for operation in &operations {
        let request_id = operation.request_id();
        let mut waited = 0;
        while executor.is_managed(&request_id) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += 1;
            assert!(waited < 200, "operation {} never finished", request_id);
        }
        assert_eq!(operation.progress(), TaskProgress::Finished);
    }

    assert!(peak.load(Ordering::SeqCst) <= MAX_CONCURRENT_OPERATIONS + 1);
    // Every operation invoked its completion callback exactly once.
    assert_eq!(callbacks.load(Ordering::SeqCst), 10);
    let status = executor.status();
    assert_eq!(status.queued, 0);
    assert_eq!(status.in_flight, 0);
}

#[test]
fn provider_factory_covers_the_declared_platforms() {
    let config = Config::default();

    let unimplemented = new_infrastructure_provider(Platform::Baremetal, None, &config);
    assert!(matches!(unimplemented, Err(Error::Unimplemented(_))));

    let credentials = AzureCredentials {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        subscription_id: "sub".to_string(),
        tenant_id: "tenant".to_string(),
        ..AzureCredentials::default()
    };
    let provider =
        new_infrastructure_provider(Platform::Azure, Some(&credentials), &config).unwrap();

    let operation = provider
        .scale(ScaleRequest {
            request_id: "scale-1".to_string(),
            organization_id: "org".to_string(),
            cluster_id: "c1".to_string(),
            num_nodes: 5,
            is_management_cluster: false,
            azure_options: cluster_provisioner::entities::AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: String::new(),
            },
        })
        .unwrap();
    assert_eq!(operation.request_id(), "scale-1");
    assert_eq!(operation.progress(), TaskProgress::Init);
    assert!(matches!(operation.cancel(), Err(Error::Unimplemented(_))));
}

#[test]
fn provision_operations_expose_their_metadata() {
    let credentials = AzureCredentials {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        subscription_id: "sub".to_string(),
        tenant_id: "tenant".to_string(),
        ..AzureCredentials::default()
    };
    let provider = new_infrastructure_provider(
        Platform::Azure,
        Some(&credentials),
        &Config::default(),
    )
    .unwrap();

    let operation = provider
        .provision(ProvisionRequest {
            request_id: "prov-1".to_string(),
            organization_id: "org-1".to_string(),
            cluster_id: "c-1".to_string(),
            cluster_name: "Dev 01".to_string(),
            kubernetes_version: "1.13.11".to_string(),
            num_nodes: 3,
            node_type: "Standard_DS2_v2".to_string(),
            zone: "westeurope".to_string(),
            is_management_cluster: false,
            is_production: false,
            azure_options: cluster_provisioner::entities::AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: "example.tech".to_string(),
            },
        })
        .unwrap();

    let metadata = operation.metadata();
    assert_eq!(metadata.organization_id, "org-1");
    assert_eq!(metadata.cluster_id, "c-1");
    assert_eq!(metadata.request_id, "prov-1");

    // The hostname is derived from the normalized cluster name.
    let result = operation.result();
    let TypedResult::Provision(provision) = result.typed else {
        panic!("expected a provision result");
    };
    assert_eq!(provision.cluster_name, "dev01");
    assert_eq!(provision.hostname, "dev01.example.tech");
}
