use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mesh_core::{demo_constellation, NetworkHandle};
use mesh_routing::adapter::{GraphStoreAdapter, RelationalAdapter, TopologyAdapter};
use mesh_routing::{EngineConfig, RouteCache, RoutingEngine};

mod routes;

#[derive(Clone)]
pub struct AppState {
    pub network: NetworkHandle,
    pub engine: Arc<RoutingEngine>,
    pub graph: Arc<GraphStoreAdapter>,
    pub fallback: Arc<RelationalAdapter>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mesh_gateway=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let network = NetworkHandle::new(demo_constellation());
    let stats = network.stats();
    tracing::info!(
        "   Loaded demo mesh: {} ground stations, {} relays, {} links",
        stats.ground_stations,
        stats.relays,
        stats.total_links
    );

    let graph = Arc::new(GraphStoreAdapter::new(network.clone()));
    let fallback = Arc::new(RelationalAdapter::new(network.clone()));
    let engine = Arc::new(RoutingEngine::new(
        graph.clone() as Arc<dyn TopologyAdapter>,
        fallback.clone() as Arc<dyn TopologyAdapter>,
        RouteCache::new(EngineConfig::default().cache_ttl),
        EngineConfig::default(),
    ));

    let state = AppState {
        network,
        engine,
        graph,
        fallback,
    };

    // Staleness is handled lazily at read time; this tick only keeps
    // the cache map from accumulating dead keys
    let maintenance = state.engine.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            tick.tick().await;
            maintenance.purge_expired_routes();
        }
    });

    let api_routes = Router::new()
        .route("/routing/route", post(routes::compute_route))
        .route("/routing/alternatives", post(routes::compute_alternatives))
        .route("/network/nodes", get(routes::list_nodes))
        .route("/network/links", get(routes::list_links))
        .route("/faults/node", post(routes::fault_node))
        .route("/faults/link", post(routes::fault_link))
        .route("/faults/adapter", post(routes::fault_adapter))
        .with_state(state);

    let app = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive());

    let port = std::env::var("MESH_GATEWAY_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "21700".to_string());
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("🛰️  Mesh Gateway starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mesh-gateway",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
