//! HTTP query surface
//!
//! Two groups of routes share one [`AppState`]:
//!
//! ```text
//! GET    /api/discovery/services                      snapshot + connection instructions
//! GET    /api/discovery/ping                          identity and endpoints
//! GET    /api/discovery/network                       discovered peers
//! GET    /api/discovery/health                        node health summary
//! GET    /api/discovery/mobile                        mobile connection hints
//!
//! POST   /api/service-registry/register
//! DELETE /api/service-registry/unregister/{instanceId}
//! POST   /api/service-registry/heartbeat/{instanceId}
//! POST   /api/service-registry/health/{instanceId}
//! POST   /api/service-registry/maintenance/{instanceId}
//! GET    /api/service-registry/instances
//! GET    /api/service-registry/instances/version/{version}
//! GET    /api/service-registry/instances/metadata?key=&value=
//! GET    /api/service-registry/instances/best
//! GET    /api/service-registry/stats
//!
//! GET    /metrics                                     prometheus text format
//! ```
//!
//! Discovery routes return their documents bare, since mobile clients parse
//! them directly. Registry routes use the [`ApiResponse`] envelope.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics;
use crate::models::{PeerDescriptor, ServiceStatus, DEFAULT_SCHEMA_VERSION};
use crate::registry::{RegistryError, ServiceRecord, ServiceRegistry};

// ============================================================================
// State
// ============================================================================

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Arc<ServiceRegistry>, started_at: DateTime<Utc>) -> Self {
        Self { registry, started_at }
    }

    fn uptime_secs(&self) -> i64 {
        (self.registry.clock().now() - self.started_at).num_seconds().max(0)
    }
}

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Handler error mapped onto a status code
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InstanceNotFound(_) => Self::NotFound(err.to_string()),
            RegistryError::InvalidRegistration { .. } => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

// ============================================================================
// Request / Response Bodies
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub service_name: String,
    pub instance_id: String,
    pub http_endpoint: String,
    pub grpc_endpoint: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResponse {
    pub peers: Vec<ServiceRecord>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealthResponse {
    pub healthy: bool,
    pub status: ServiceStatus,
    pub active_networks: usize,
    pub peer_count: usize,
    pub uptime_seconds: i64,
}

/// Body of `POST /register`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub service_name: String,
    pub ip_address: String,
    pub http_port: u16,
    #[serde(default)]
    pub grpc_port: u16,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Body of `POST /health/{instanceId}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReportRequest {
    pub status: String,
    #[serde(default)]
    pub response_time_ms: u64,
}

/// Body of `POST /maintenance/{instanceId}`
#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct MetadataQuery {
    pub key: String,
    pub value: String,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Discovery endpoints
        .route("/api/discovery/services", get(discovery_services))
        .route("/api/discovery/ping", get(discovery_ping))
        .route("/api/discovery/network", get(discovery_network))
        .route("/api/discovery/health", get(discovery_health))
        .route("/api/discovery/mobile", get(discovery_mobile))
        // Registry endpoints
        .route("/api/service-registry/register", post(register))
        .route("/api/service-registry/unregister/{instance_id}", delete(unregister))
        .route("/api/service-registry/heartbeat/{instance_id}", post(heartbeat))
        .route("/api/service-registry/health/{instance_id}", post(report_health))
        .route("/api/service-registry/maintenance/{instance_id}", post(set_maintenance))
        .route("/api/service-registry/instances", get(healthy_instances))
        .route("/api/service-registry/instances/version/{version}", get(instances_by_version))
        .route("/api/service-registry/instances/metadata", get(instances_by_metadata))
        .route("/api/service-registry/instances/best", get(best_instance))
        .route("/api/service-registry/stats", get(stats))
        // Metrics
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Router with CORS and request tracing layers
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let mut router = create_router(state);

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown_signal` resolves
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("HTTP API shutdown complete");
    Ok(())
}

// ============================================================================
// Discovery Handlers
// ============================================================================

async fn discovery_services(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.snapshot())
}

async fn discovery_ping(State(state): State<AppState>) -> impl IntoResponse {
    let identity = state.registry.identity();
    Json(PingResponse {
        service_name: identity.service_name.clone(),
        instance_id: identity.instance_id.clone(),
        http_endpoint: identity.http_url(),
        grpc_endpoint: identity.grpc_endpoint(),
        timestamp: state.registry.clock().now_millis(),
    })
}

async fn discovery_network(State(state): State<AppState>) -> impl IntoResponse {
    let peers = state.registry.peers();
    Json(NetworkResponse {
        count: peers.len(),
        peers,
    })
}

async fn discovery_health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.registry.snapshot();
    let status = snapshot.self_record.status;
    Json(NodeHealthResponse {
        healthy: status.is_selectable(),
        status,
        active_networks: snapshot.active_interfaces.len(),
        peer_count: snapshot.peers.len(),
        uptime_seconds: state.uptime_secs(),
    })
}

async fn discovery_mobile(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.mobile_discovery())
}

// ============================================================================
// Registry Handlers
// ============================================================================

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<ServiceRecord> {
    let Json(request) = body?;

    let descriptor = PeerDescriptor::new(
        request.service_name,
        request.ip_address,
        request.http_port,
        request.grpc_port,
        state.registry.clock().now_millis(),
    )
    .with_schema_version(request.version.unwrap_or_else(|| DEFAULT_SCHEMA_VERSION.to_string()));

    ok(state.registry.register(descriptor, request.metadata)?)
}

async fn unregister(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<ServiceRecord> {
    state
        .registry
        .unregister(&instance_id)
        .ok_or_else(|| ApiError::NotFound(format!("Instance not found: {}", instance_id)))
        .and_then(ok)
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<String> {
    state.registry.heartbeat(&instance_id)?;
    ok(instance_id)
}

async fn report_health(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    body: Result<Json<HealthReportRequest>, JsonRejection>,
) -> ApiResult<ServiceRecord> {
    let Json(request) = body?;
    let status = ServiceStatus::parse(&request.status)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown status: {}", request.status)))?;

    ok(state
        .registry
        .report_health(&instance_id, status, request.response_time_ms)?)
}

async fn set_maintenance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    body: Result<Json<MaintenanceRequest>, JsonRejection>,
) -> ApiResult<ServiceRecord> {
    let Json(request) = body?;
    ok(state.registry.set_maintenance(&instance_id, request.enabled)?)
}

async fn healthy_instances(State(state): State<AppState>) -> ApiResult<Vec<ServiceRecord>> {
    ok(state.registry.healthy_instances())
}

async fn instances_by_version(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> ApiResult<Vec<ServiceRecord>> {
    ok(state.registry.instances_by_version(&version))
}

async fn instances_by_metadata(
    State(state): State<AppState>,
    Query(query): Query<MetadataQuery>,
) -> ApiResult<Vec<ServiceRecord>> {
    ok(state.registry.instances_by_metadata(&query.key, &query.value))
}

async fn best_instance(State(state): State<AppState>) -> ApiResult<ServiceRecord> {
    state
        .registry
        .select_instance()
        .ok_or_else(|| ApiError::NotFound("No healthy instance available".to_string()))
        .and_then(ok)
}

async fn stats(State(state): State<AppState>) -> ApiResult<crate::registry::RegistryStats> {
    ok(state.registry.stats())
}

async fn metrics_handler() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => ApiError::Internal(format!("Failed to encode metrics: {}", e)).into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================
