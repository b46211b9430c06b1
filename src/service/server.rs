//! HTTP surface exposing the lifecycle operations

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use super::{DecommissionManager, ManagementManager, ProvisionManager, ScaleManager};
use crate::config::Config;
use crate::entities::{
    ClusterRequest, DecommissionClusterRequest, KubeConfigResponse, OpResponse,
    ProvisionClusterRequest, ProvisionClusterResponse, ScaleClusterRequest, ScaleClusterResponse,
};
use crate::{Error, Result};

/// Shared state of the API handlers
pub struct AppState {
    /// Manager for provisioning requests
    pub provisioner: ProvisionManager,
    /// Manager for scaling requests
    pub scaler: ScaleManager,
    /// Manager for decommission requests
    pub decommissioner: DecommissionManager,
    /// Manager for synchronous management requests
    pub management: ManagementManager,
}

impl AppState {
    /// Build the managers for a configuration.
    pub fn new(config: Config) -> Self {
        Self {
            provisioner: ProvisionManager::new(config.clone()),
            scaler: ScaleManager::new(config.clone()),
            decommissioner: DecommissionManager::new(config.clone()),
            management: ManagementManager::new(config),
        }
    }
}

/// API service wiring the managers into an HTTP listener
pub struct Service {
    configuration: Config,
}

impl Service {
    /// Create a new service.
    pub fn new(configuration: Config) -> Self {
        Self { configuration }
    }

    /// Run the service until the process is stopped.
    pub async fn run(self) -> Result<()> {
        self.configuration.validate()?;
        self.configuration.print();

        let state = Arc::new(AppState::new(self.configuration.clone()));
        let app = router(state);

        let address = format!("0.0.0.0:{}", self.configuration.port);
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| Error::internal(format!("failed to listen on {}: {}", address, e)))?;
        info!(address = %address, "Launching API server");
        axum::serve(listener, app)
            .await
            .map_err(|e| Error::internal(format!("failed to serve: {}", e)))
    }
}

/// Build the API router over the shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/provision", post(provision_cluster))
        .route(
            "/v1/provision/{request_id}",
            get(provision_progress).delete(remove_provision),
        )
        .route("/v1/scale", post(scale_cluster))
        .route(
            "/v1/scale/{request_id}",
            get(scale_progress).delete(remove_scale),
        )
        .route("/v1/decommission", post(decommission_cluster))
        .route(
            "/v1/decommission/{request_id}",
            get(decommission_progress).delete(remove_decommission),
        )
        .route("/v1/management/kubeconfig", post(get_kube_config))
        .with_state(state)
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

async fn provision_cluster(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProvisionClusterRequest>,
) -> std::result::Result<Json<ProvisionClusterResponse>, Error> {
    state.provisioner.provision_cluster(&request).map(Json)
}

async fn provision_progress(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> std::result::Result<Json<ProvisionClusterResponse>, Error> {
    state.provisioner.check_progress(&request_id).map(Json)
}

async fn remove_provision(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> std::result::Result<Json<SuccessResponse>, Error> {
    state.provisioner.remove_provision(&request_id)?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn scale_cluster(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScaleClusterRequest>,
) -> std::result::Result<Json<ScaleClusterResponse>, Error> {
    state.scaler.scale_cluster(&request).map(Json)
}

async fn scale_progress(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> std::result::Result<Json<ScaleClusterResponse>, Error> {
    state.scaler.check_progress(&request_id).map(Json)
}

async fn remove_scale(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> std::result::Result<Json<SuccessResponse>, Error> {
    state.scaler.remove_scale(&request_id)?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn decommission_cluster(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DecommissionClusterRequest>,
) -> std::result::Result<Json<OpResponse>, Error> {
    state.decommissioner.decommission_cluster(&request).map(Json)
}

async fn decommission_progress(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> std::result::Result<Json<OpResponse>, Error> {
    state.decommissioner.check_progress(&request_id).map(Json)
}

async fn remove_decommission(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> std::result::Result<Json<SuccessResponse>, Error> {
    state.decommissioner.remove_decommission(&request_id)?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_kube_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClusterRequest>,
) -> std::result::Result<Json<KubeConfigResponse>, Error> {
    state.management.get_kube_config(&request).await.map(Json)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    use super::*;
    use crate::entities::{AzureOptions, Platform};
    use crate::executor::Executor;
    use crate::service::testutil::{test_credentials, StubFactory};

    fn test_state() -> Arc<AppState> {
        let executor = Executor::new();
        Arc::new(AppState {
            provisioner: ProvisionManager::with_parts(
                Config::default(),
                Arc::clone(&executor),
                Arc::new(StubFactory),
            ),
            scaler: ScaleManager::with_parts(
                Config::default(),
                Arc::clone(&executor),
                Arc::new(StubFactory),
            ),
            decommissioner: DecommissionManager::with_parts(
                Config::default(),
                executor,
                Arc::new(StubFactory),
            ),
            management: ManagementManager::with_factory(
                Config::default(),
                Arc::new(StubFactory),
            ),
        })
    }

    fn provision_body(request_id: &str, node_type: &str) -> String {
        let request = ProvisionClusterRequest {
            request_id: request_id.to_string(),
            organization_id: "org".to_string(),
            cluster_id: "c1".to_string(),
            cluster_name: "Dev 01".to_string(),
            kubernetes_version: "1.13.11".to_string(),
            num_nodes: 3,
            node_type: node_type.to_string(),
            zone: "westeurope".to_string(),
            is_management_cluster: false,
            is_production: false,
            target_platform: Platform::Azure,
            azure_credentials: Some(test_credentials()),
            azure_options: Some(AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: "example.tech".to_string(),
            }),
        };
        serde_json::to_string(&request).unwrap()
    }

    fn json_post(uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn provisioning_round_trips_through_the_router() {
        let app = router(test_state());
        let response = app
            .oneshot(json_post("/v1/provision", provision_body("r-http", "Standard_DS2_v2")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_provision_requests_map_to_bad_request() {
        let app = router(test_state());
        let response = app
            .oneshot(json_post("/v1/provision", provision_body("r-bad", "")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn duplicate_submissions_map_to_conflict() {
        let state = test_state();
        let app = router(Arc::clone(&state));
        let first = app
            .clone()
            .oneshot(json_post("/v1/provision", provision_body("r-conflict", "Standard_DS2_v2")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app
            .oneshot(json_post("/v1/provision", provision_body("r-conflict", "Standard_DS2_v2")))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_progress_queries_map_to_not_found() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/v1/provision/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn management_kubeconfig_is_served_synchronously() {
        let app = router(test_state());
        let request = ClusterRequest {
            request_id: "r-kc".to_string(),
            organization_id: "org".to_string(),
            cluster_id: "c1".to_string(),
            is_management_cluster: true,
            target_platform: Platform::Azure,
            azure_credentials: Some(test_credentials()),
            azure_options: Some(AzureOptions {
                resource_group: "dev".to_string(),
                dns_zone_name: String::new(),
            }),
        };
        let response = app
            .oneshot(json_post(
                "/v1/management/kubeconfig",
                serde_json::to_string(&request).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: KubeConfigResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.raw_kube_config, "contexts: []");
    }
}
