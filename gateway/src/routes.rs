use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mesh_core::{Link, Node, NodeStatus};
use mesh_routing::adapter::FaultMode;
use mesh_routing::{
    Constraints, HopBreakdown, RouteError, RouteRequest, RouteResult, ScoredPath,
};

use crate::AppState;

#[derive(Deserialize)]
pub struct RouteBody {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub constraints: Constraints,
}

#[derive(Serialize)]
pub struct RouteResponse {
    pub request_id: String,
    pub path: Vec<String>,
    pub links: Vec<String>,
    pub total_cost: f64,
    pub total_latency_ms: f64,
    pub reliability: f64,
    pub hops: Vec<HopBreakdown>,
    pub satisfied: bool,
    pub cache_hit: bool,
    pub served_by: Option<String>,
}

impl RouteResponse {
    fn routed(request_id: String, result: RouteResult) -> Self {
        Self {
            request_id,
            path: result.path,
            links: result.links,
            total_cost: result.total_cost,
            total_latency_ms: result.total_latency_ms,
            reliability: result.reliability,
            hops: result.hops,
            satisfied: result.satisfied,
            cache_hit: result.cache_hit,
            served_by: Some(result.served_by.to_string()),
        }
    }

    /// Infeasible is a valid answer, not a failure
    fn infeasible(request_id: String) -> Self {
        Self {
            request_id,
            path: Vec::new(),
            links: Vec::new(),
            total_cost: 0.0,
            total_latency_ms: 0.0,
            reliability: 0.0,
            hops: Vec::new(),
            satisfied: false,
            cache_hit: false,
            served_by: None,
        }
    }
}

fn error_response(request_id: &str, status: StatusCode, err: &RouteError) -> Response {
    let body = Json(serde_json::json!({
        "request_id": request_id,
        "error": err.to_string(),
    }));
    (status, body).into_response()
}

pub async fn compute_route(
    State(state): State<AppState>,
    Json(body): Json<RouteBody>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let request =
        RouteRequest::new(&body.source, &body.destination).with_constraints(body.constraints);

    tracing::debug!(
        %request_id,
        source = %body.source,
        destination = %body.destination,
        "route request"
    );

    match state.engine.route(&request).await {
        Ok(result) => Json(RouteResponse::routed(request_id, result)).into_response(),
        Err(RouteError::Infeasible { .. }) => {
            Json(RouteResponse::infeasible(request_id)).into_response()
        }
        Err(err @ RouteError::NodeNotFound(_)) | Err(err @ RouteError::LinkNotFound(_)) => {
            error_response(&request_id, StatusCode::NOT_FOUND, &err)
        }
        Err(err @ RouteError::InvalidRequest(_)) => {
            error_response(&request_id, StatusCode::BAD_REQUEST, &err)
        }
        Err(err @ RouteError::RequestDeadlineExceeded) => {
            error_response(&request_id, StatusCode::GATEWAY_TIMEOUT, &err)
        }
        Err(err) => error_response(&request_id, StatusCode::SERVICE_UNAVAILABLE, &err),
    }
}

#[derive(Serialize)]
pub struct AlternativesResponse {
    pub request_id: String,
    pub routes: Vec<ScoredPath>,
}

pub async fn compute_alternatives(
    State(state): State<AppState>,
    Json(body): Json<RouteBody>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let request =
        RouteRequest::new(&body.source, &body.destination).with_constraints(body.constraints);

    match state.engine.alternatives(&request).await {
        Ok(routes) => Json(AlternativesResponse { request_id, routes }).into_response(),
        Err(err @ RouteError::NodeNotFound(_)) => {
            error_response(&request_id, StatusCode::NOT_FOUND, &err)
        }
        Err(err @ RouteError::InvalidRequest(_)) => {
            error_response(&request_id, StatusCode::BAD_REQUEST, &err)
        }
        Err(err) => error_response(&request_id, StatusCode::SERVICE_UNAVAILABLE, &err),
    }
}

#[derive(Serialize)]
pub struct NodesResponse {
    pub version: u64,
    pub nodes: Vec<Node>,
}

pub async fn list_nodes(State(state): State<AppState>) -> Json<NodesResponse> {
    let snapshot = state.network.snapshot();
    let mut nodes: Vec<Node> = snapshot.nodes().cloned().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    Json(NodesResponse {
        version: snapshot.version(),
        nodes,
    })
}

#[derive(Serialize)]
pub struct LinksResponse {
    pub version: u64,
    pub links: Vec<Link>,
}

pub async fn list_links(State(state): State<AppState>) -> Json<LinksResponse> {
    let snapshot = state.network.snapshot();
    let mut links: Vec<Link> = snapshot.links().cloned().collect();
    links.sort_by(|a, b| a.id.cmp(&b.id));
    Json(LinksResponse {
        version: snapshot.version(),
        links,
    })
}

#[derive(Deserialize)]
pub struct NodeFaultBody {
    pub node_id: String,
    pub status: NodeStatus,
}

pub async fn fault_node(
    State(state): State<AppState>,
    Json(body): Json<NodeFaultBody>,
) -> Response {
    match state.network.force_node_status(&body.node_id, body.status) {
        Ok(()) => {
            state.engine.invalidate_involving(&body.node_id);
            Json(serde_json::json!({ "node_id": body.node_id, "status": body.status }))
                .into_response()
        }
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct LinkFaultBody {
    pub link_id: String,
    pub active: bool,
}

pub async fn fault_link(
    State(state): State<AppState>,
    Json(body): Json<LinkFaultBody>,
) -> Response {
    match state.network.force_link_active(&body.link_id, body.active) {
        Ok(()) => {
            state.engine.invalidate_involving(&body.link_id);
            Json(serde_json::json!({ "link_id": body.link_id, "active": body.active }))
                .into_response()
        }
        Err(err) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
pub struct AdapterFaultBody {
    /// "graph" or "relational"
    pub adapter: String,
    /// "healthy", "unavailable" or "slow"
    pub mode: String,
    pub delay_ms: Option<u64>,
}

pub async fn fault_adapter(
    State(state): State<AppState>,
    Json(body): Json<AdapterFaultBody>,
) -> Response {
    let mode = match body.mode.as_str() {
        "healthy" => FaultMode::Healthy,
        "unavailable" => FaultMode::Unavailable,
        "slow" => FaultMode::Slow(std::time::Duration::from_millis(
            body.delay_ms.unwrap_or(1_000),
        )),
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("unknown fault mode: {other}") })),
            )
                .into_response();
        }
    };

    match body.adapter.as_str() {
        "graph" => state.graph.set_fault(mode),
        "relational" => state.fallback.set_fault(mode),
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("unknown adapter: {other}") })),
            )
                .into_response();
        }
    }

    tracing::info!(adapter = %body.adapter, mode = %body.mode, "adapter fault injected");
    Json(serde_json::json!({ "adapter": body.adapter, "mode": body.mode })).into_response()
}
