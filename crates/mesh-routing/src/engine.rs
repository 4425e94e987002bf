//! Routing engine orchestration
//!
//! Request lifecycle: cache check, then constrained Dijkstra on the
//! graph store, then geography-aware A* on the relational fallback if
//! the graph store fails or exceeds its timeout. A request that finds
//! no constraint-satisfying path is `Infeasible`; the engine never
//! returns a best-effort partial path. Beyond the single
//! graph-to-fallback transition nothing is retried; the overall
//! deadline turns into `RequestDeadlineExceeded`.

use std::sync::Arc;
use std::time::Duration;

use mesh_core::CostWeights;

use crate::adapter::TopologyAdapter;
use crate::cache::RouteCache;
use crate::search::{self, ScoredPath};
use crate::{AdapterKind, Result, RouteError, RouteRequest, RouteResult};

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Budget for one search pass on the graph store before the
    /// fallback engages
    pub adapter_timeout: Duration,
    /// Overall per-request deadline
    pub request_deadline: Duration,
    pub cache_ttl: Duration,
    /// Hop cap for the all-paths strategy
    pub max_hops: usize,
    /// Path-count cap for the all-paths strategy
    pub max_paths: usize,
    pub weights: CostWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(2),
            request_deadline: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(30),
            max_hops: 6,
            max_paths: 50,
            weights: CostWeights::default(),
        }
    }
}

/// The routing engine. Adapters and cache are injected, never global.
pub struct RoutingEngine {
    graph: Arc<dyn TopologyAdapter>,
    fallback: Arc<dyn TopologyAdapter>,
    cache: RouteCache,
    config: EngineConfig,
}

impl RoutingEngine {
    pub fn new(
        graph: Arc<dyn TopologyAdapter>,
        fallback: Arc<dyn TopologyAdapter>,
        cache: RouteCache,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph,
            fallback,
            cache,
            config,
        }
    }

    /// Compute the cheapest path satisfying the request's constraints
    pub async fn route(&self, request: &RouteRequest) -> Result<RouteResult> {
        request.constraints.validate()?;

        match tokio::time::timeout(self.config.request_deadline, self.route_inner(request)).await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    source = %request.source,
                    destination = %request.destination,
                    "request deadline exceeded"
                );
                Err(RouteError::RequestDeadlineExceeded)
            }
        }
    }

    async fn route_inner(&self, request: &RouteRequest) -> Result<RouteResult> {
        // Revalidation queries share the adapter budget; a slow graph
        // store turns a cached request into a miss, not a stalled one
        let lookup = tokio::time::timeout(
            self.config.adapter_timeout,
            self.cache.get(request, self.graph.as_ref()),
        )
        .await;
        if let Ok(Some(hit)) = lookup {
            tracing::debug!(key = %request.fingerprint(), "cache hit");
            return Ok(hit);
        }

        let primary = tokio::time::timeout(
            self.config.adapter_timeout,
            search::constrained_dijkstra(self.graph.as_ref(), request, &self.config.weights),
        )
        .await;

        let (graph_cause, timed_out) = match primary {
            Ok(Ok(found)) => return self.finish(request, found, AdapterKind::GraphStore),
            Ok(Err(RouteError::AdapterUnavailable { cause })) => (cause, false),
            Ok(Err(other)) => return Err(other),
            Err(_) => (
                format!(
                    "graph store search exceeded {:?}",
                    self.config.adapter_timeout
                ),
                true,
            ),
        };
        tracing::warn!(cause = %graph_cause, "graph store failed, engaging relational fallback");

        match search::astar_geo(self.fallback.as_ref(), request, &self.config.weights).await {
            Ok(found) => self.finish(request, found, AdapterKind::RelationalFallback),
            Err(RouteError::AdapterUnavailable { cause: fb_cause }) => {
                if timed_out {
                    Err(RouteError::AdapterTimeout {
                        adapter: AdapterKind::GraphStore,
                        cause: format!("fallback also failed: {fb_cause}"),
                    })
                } else {
                    Err(RouteError::AdapterUnavailable {
                        cause: format!("graph store: {graph_cause}; fallback: {fb_cause}"),
                    })
                }
            }
            Err(other) => Err(other),
        }
    }

    fn finish(
        &self,
        request: &RouteRequest,
        found: Option<ScoredPath>,
        served_by: AdapterKind,
    ) -> Result<RouteResult> {
        let Some(scored) = found else {
            tracing::debug!(
                source = %request.source,
                destination = %request.destination,
                "no constraint-satisfying path"
            );
            return Err(RouteError::Infeasible {
                from: request.source.clone(),
                to: request.destination.clone(),
            });
        };

        tracing::info!(
            source = %request.source,
            destination = %request.destination,
            hops = scored.hop_count,
            cost = scored.total_cost,
            %served_by,
            "route computed"
        );

        let result = RouteResult {
            path: scored.path,
            links: scored.links,
            total_cost: scored.total_cost,
            total_latency_ms: scored.total_latency_ms,
            reliability: scored.reliability,
            hops: scored.hops,
            satisfied: true,
            cache_hit: false,
            served_by,
        };
        self.cache.set(request, result.clone());
        Ok(result)
    }

    /// Alternative routes for resilience analysis, cheapest first.
    /// Never cached.
    pub async fn alternatives(&self, request: &RouteRequest) -> Result<Vec<ScoredPath>> {
        request.constraints.validate()?;

        let primary = tokio::time::timeout(
            self.config.adapter_timeout,
            search::bounded_all_paths(
                self.graph.as_ref(),
                request,
                &self.config.weights,
                self.config.max_hops,
                self.config.max_paths,
            ),
        )
        .await;

        match primary {
            Ok(Ok(paths)) => Ok(paths),
            Ok(Err(RouteError::AdapterUnavailable { .. })) | Err(_) => {
                tracing::warn!("graph store failed, alternatives via relational fallback");
                search::bounded_all_paths(
                    self.fallback.as_ref(),
                    request,
                    &self.config.weights,
                    self.config.max_hops,
                    self.config.max_paths,
                )
                .await
            }
            Ok(Err(other)) => Err(other),
        }
    }

    /// Eager cache invalidation hook for topology changes the caller
    /// already knows about; routine staleness is handled lazily.
    pub fn invalidate_involving(&self, id: &str) {
        self.cache.invalidate_involving(id);
    }

    /// Periodic maintenance: drop entries past their TTL so the map
    /// does not grow with dead keys between lazy reads
    pub fn purge_expired_routes(&self) {
        self.cache.purge_expired();
    }

    pub fn cached_routes(&self) -> usize {
        self.cache.len()
    }
}
