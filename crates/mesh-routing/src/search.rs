//! Search strategies over a topology adapter
//!
//! Three strategies share one label model:
//!
//! - [`constrained_dijkstra`]: label-setting shortest path, the default
//!   strategy on the graph store.
//! - [`astar_geo`]: the same search with a great-circle heuristic,
//!   used on the relational fallback where node positions are known.
//! - [`bounded_all_paths`]: simple-path enumeration for resilience
//!   analysis, capped on hops and path count.
//!
//! Reliability is multiplicative across a path, so labels accumulate
//! `-ln(reliability)` instead: the bound becomes additive and monotone,
//! which makes it prunable during relaxation exactly like latency. The
//! same rule applies in every strategy.
//!
//! Labels are kept per node as non-dominated sets over
//! (cost, latency, -ln reliability, hops). A single-label search is
//! not complete under constraints: a cheap unreliable label would
//! shadow the costlier reliable one that leads to the only feasible
//! path, and a cheap many-hop label would shadow the short one that
//! fits the hop budget.
//!
//! Tie-break among equal-cost feasible paths: fewer hops, then the
//! lexicographically smaller node-id sequence.

use mesh_core::{haversine_km, link_cost, optimistic_latency_ms, CostWeights, Link, Node};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use crate::adapter::{LinkView, TopologyAdapter};
use crate::{Constraints, HopBreakdown, Result, RouteRequest};

const EPS: f64 = 1e-9;

/// A complete path with aggregate metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPath {
    pub path: Vec<String>,
    pub links: Vec<String>,
    pub hops: Vec<HopBreakdown>,
    pub total_cost: f64,
    pub total_latency_ms: f64,
    pub reliability: f64,
    pub hop_count: usize,
}

impl ScoredPath {
    fn trivial(node_id: &str) -> Self {
        Self {
            path: vec![node_id.to_string()],
            links: Vec::new(),
            hops: Vec::new(),
            total_cost: 0.0,
            total_latency_ms: 0.0,
            reliability: 1.0,
            hop_count: 0,
        }
    }
}

#[derive(Clone)]
struct Label {
    /// Heap key: accumulated cost plus heuristic (equal to cost under
    /// Dijkstra's zero heuristic)
    priority: f64,
    cost: f64,
    latency_ms: f64,
    neg_log_rel: f64,
    node: String,
    path: Vec<String>,
    links: Vec<String>,
    hops: Vec<HopBreakdown>,
}

impl Label {
    fn start(node: &Node, heuristic: &(dyn Fn(&Node) -> f64 + Sync)) -> Self {
        Self {
            priority: heuristic(node),
            cost: 0.0,
            latency_ms: 0.0,
            neg_log_rel: 0.0,
            node: node.id.clone(),
            path: vec![node.id.clone()],
            links: Vec::new(),
            hops: Vec::new(),
        }
    }

    fn extend(
        &self,
        view: &LinkView,
        weights: &CostWeights,
        heuristic: &(dyn Fn(&Node) -> f64 + Sync),
    ) -> Self {
        let edge_cost = link_cost(&view.link, weights);
        let cost = self.cost + edge_cost;

        let mut path = self.path.clone();
        path.push(view.neighbor.id.clone());
        let mut links = self.links.clone();
        links.push(view.link.id.clone());
        let mut hops = self.hops.clone();
        hops.push(HopBreakdown {
            link_id: view.link.id.clone(),
            from: self.node.clone(),
            to: view.neighbor.id.clone(),
            latency_ms: view.link.latency_ms,
            reliability: view.link.reliability,
            cost: edge_cost,
        });

        Self {
            priority: cost + heuristic(&view.neighbor),
            cost,
            latency_ms: self.latency_ms + view.link.latency_ms,
            neg_log_rel: self.neg_log_rel + neg_log(view.link.reliability),
            node: view.neighbor.id.clone(),
            path,
            links,
            hops,
        }
    }

    fn metrics(&self) -> (f64, f64, f64, usize) {
        (self.cost, self.latency_ms, self.neg_log_rel, self.links.len())
    }

    fn into_scored(self) -> ScoredPath {
        let reliability = self.hops.iter().map(|h| h.reliability).product();
        ScoredPath {
            hop_count: self.links.len(),
            path: self.path,
            links: self.links,
            hops: self.hops,
            total_cost: self.cost,
            total_latency_ms: self.latency_ms,
            reliability,
        }
    }
}

fn neg_log(reliability: f64) -> f64 {
    if reliability <= 0.0 {
        f64::INFINITY
    } else {
        -reliability.ln()
    }
}

struct QueueEntry(Label);

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .total_cmp(&other.0.priority)
            .then_with(|| self.0.links.len().cmp(&other.0.links.len()))
            .then_with(|| self.0.path.cmp(&other.0.path))
    }
}

/// Hard constraints exclude an edge outright
fn edge_admissible(link: &Link, constraints: &Constraints) -> bool {
    if let Some(min_bw) = constraints.min_bandwidth_gbps {
        if link.bandwidth_gbps < min_bw {
            return false;
        }
    }
    if constraints.require_secure && !link.secure {
        return false;
    }
    true
}

/// Soft constraints prune partial paths; both accumulated quantities
/// only grow along a path, so pruning never discards a feasible
/// completion.
struct SoftBounds {
    max_latency_ms: Option<f64>,
    max_neg_log_rel: Option<f64>,
    max_links: Option<usize>,
}

impl SoftBounds {
    fn new(constraints: &Constraints, hop_cap: Option<usize>) -> Self {
        let max_links = match (constraints.max_hops, hop_cap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            max_latency_ms: constraints.max_latency_ms,
            max_neg_log_rel: constraints
                .min_reliability
                .filter(|r| *r > 0.0)
                .map(|r| -r.ln()),
            max_links,
        }
    }

    fn admits(&self, label: &Label) -> bool {
        if let Some(max_lat) = self.max_latency_ms {
            if label.latency_ms > max_lat + EPS {
                return false;
            }
        }
        if let Some(max_nlr) = self.max_neg_log_rel {
            if label.neg_log_rel > max_nlr + EPS {
                return false;
            }
        }
        if let Some(max_links) = self.max_links {
            if label.links.len() > max_links {
                return false;
            }
        }
        true
    }
}

/// Hop count is part of the dominance vector: the hop budget prunes on
/// it, so a cheap many-hop label must not discard a short costlier one.
fn dominates(a: &(f64, f64, f64, usize), b: &(f64, f64, f64, usize)) -> bool {
    a.0 <= b.0 + EPS && a.1 <= b.1 + EPS && a.2 <= b.2 + EPS && a.3 <= b.3
}

/// Label-setting search shared by Dijkstra and A*.
///
/// The first destination label popped is cost-optimal (the heuristic
/// never overestimates), but the loop keeps draining equal-priority
/// labels so equal-cost ties resolve to fewer hops, then the smaller
/// path.
async fn shortest_feasible(
    adapter: &dyn TopologyAdapter,
    request: &RouteRequest,
    weights: &CostWeights,
    heuristic: &(dyn Fn(&Node) -> f64 + Sync),
) -> Result<Option<ScoredPath>> {
    let source = adapter.node(&request.source).await?;
    let destination = adapter.node(&request.destination).await?;

    if source.is_offline() || destination.is_offline() {
        return Ok(None);
    }
    if source.id == destination.id {
        return Ok(Some(ScoredPath::trivial(&source.id)));
    }

    let constraints = &request.constraints;
    let bounds = SoftBounds::new(constraints, None);

    let mut heap = BinaryHeap::new();
    heap.push(Reverse(QueueEntry(Label::start(&source, heuristic))));

    let mut settled: HashMap<String, Vec<(f64, f64, f64, usize)>> = HashMap::new();
    let mut best: Option<Label> = None;

    while let Some(Reverse(QueueEntry(label))) = heap.pop() {
        if let Some(b) = &best {
            // Every completion of a queued label costs at least its
            // priority; nothing cheaper or tied remains
            if label.priority > b.cost + EPS {
                break;
            }
        }

        if label.node == destination.id {
            best = match best {
                None => Some(label),
                Some(b) => {
                    let better = label.cost < b.cost - EPS
                        || ((label.cost - b.cost).abs() <= EPS
                            && (label.links.len(), &label.path) < (b.links.len(), &b.path));
                    Some(if better { label } else { b })
                }
            };
            continue;
        }

        let metrics = label.metrics();
        let node_labels = settled.entry(label.node.clone()).or_default();
        if node_labels.iter().any(|s| dominates(s, &metrics)) {
            continue;
        }
        node_labels.push(metrics);

        for view in adapter.neighbors(&label.node).await? {
            if !edge_admissible(&view.link, constraints) {
                continue;
            }
            // Simple paths only
            if label.path.contains(&view.neighbor.id) {
                continue;
            }

            let next = label.extend(&view, weights, heuristic);
            if !bounds.admits(&next) {
                continue;
            }
            if settled
                .get(&next.node)
                .is_some_and(|list| list.iter().any(|s| dominates(s, &next.metrics())))
            {
                continue;
            }
            heap.push(Reverse(QueueEntry(next)));
        }
    }

    Ok(best.map(Label::into_scored))
}

/// Default strategy: constrained single-source shortest path
pub async fn constrained_dijkstra(
    adapter: &dyn TopologyAdapter,
    request: &RouteRequest,
    weights: &CostWeights,
) -> Result<Option<ScoredPath>> {
    shortest_feasible(adapter, request, weights, &|_| 0.0).await
}

/// Fallback strategy: A* with an optimistic latency heuristic.
///
/// Remaining cost is at least the remaining latency, which is at least
/// the great-circle distance covered at c, so the heuristic is
/// admissible.
pub async fn astar_geo(
    adapter: &dyn TopologyAdapter,
    request: &RouteRequest,
    weights: &CostWeights,
) -> Result<Option<ScoredPath>> {
    let destination = adapter.node(&request.destination).await?;
    let goal = destination.position;
    let heuristic =
        move |node: &Node| optimistic_latency_ms(haversine_km(&node.position, &goal));

    shortest_feasible(adapter, request, weights, &heuristic).await
}

/// Enumerate simple paths for resilience analysis, cheapest first.
///
/// Capped on hop count and returned path count to guard against
/// exponential blow-up on dense meshes.
pub async fn bounded_all_paths(
    adapter: &dyn TopologyAdapter,
    request: &RouteRequest,
    weights: &CostWeights,
    max_hops: usize,
    max_paths: usize,
) -> Result<Vec<ScoredPath>> {
    let source = adapter.node(&request.source).await?;
    let destination = adapter.node(&request.destination).await?;

    if source.is_offline() || destination.is_offline() || max_paths == 0 {
        return Ok(Vec::new());
    }
    if source.id == destination.id {
        return Ok(vec![ScoredPath::trivial(&source.id)]);
    }

    let constraints = &request.constraints;
    let bounds = SoftBounds::new(constraints, Some(max_hops));
    let zero = |_: &Node| 0.0;

    let mut results = Vec::new();
    let mut stack = vec![Label::start(&source, &zero)];

    while let Some(label) = stack.pop() {
        if results.len() >= max_paths {
            break;
        }
        if label.node == destination.id {
            results.push(label.into_scored());
            continue;
        }

        let mut views = adapter.neighbors(&label.node).await?;
        // Reverse id order so the stack explores links ascending
        views.sort_by(|a, b| b.link.id.cmp(&a.link.id));

        for view in views {
            if !edge_admissible(&view.link, constraints) {
                continue;
            }
            if label.path.contains(&view.neighbor.id) {
                continue;
            }
            let next = label.extend(&view, weights, &zero);
            if bounds.admits(&next) {
                stack.push(next);
            }
        }
    }

    results.sort_by(|a, b| {
        a.total_cost
            .total_cmp(&b.total_cost)
            .then_with(|| a.hop_count.cmp(&b.hop_count))
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::GraphStoreAdapter;
    use crate::RouteError;
    use mesh_core::{Link, NetworkHandle, NetworkState, Node, NodeStatus};

    /// The four-node reference graph: A-B-D is reliable, A-C-D is
    /// low-latency but flaky and thin.
    fn reference_network() -> NetworkHandle {
        let mut state = NetworkState::new();
        for (id, lon) in [("A", 0.0), ("B", 10.0), ("C", 10.0), ("D", 20.0)] {
            state.upsert_node(Node::ground_station(id, id, 0.0, lon, 1));
        }
        state
            .upsert_link(Link::new("AB", "A", "B", 10.0, 10.0, 0.99))
            .unwrap();
        state
            .upsert_link(Link::new("BD", "B", "D", 10.0, 10.0, 0.99))
            .unwrap();
        state
            .upsert_link(Link::new("AC", "A", "C", 5.0, 1.0, 0.5))
            .unwrap();
        state
            .upsert_link(Link::new("CD", "C", "D", 5.0, 1.0, 0.5))
            .unwrap();
        NetworkHandle::new(state)
    }

    fn adapter() -> GraphStoreAdapter {
        GraphStoreAdapter::new(reference_network())
    }

    fn request(constraints: Constraints) -> RouteRequest {
        RouteRequest::new("A", "D").with_constraints(constraints)
    }

    #[tokio::test]
    async fn reliability_bound_picks_the_reliable_path() {
        let adapter = adapter();
        let req = request(Constraints {
            min_reliability: Some(0.9),
            ..Constraints::default()
        });

        let found = constrained_dijkstra(&adapter, &req, &CostWeights::default())
            .await
            .unwrap()
            .expect("feasible");
        assert_eq!(found.path, vec!["A", "B", "D"]);
        assert!(found.reliability >= 0.9);
    }

    #[tokio::test]
    async fn bandwidth_floor_of_five_routes_via_fat_links() {
        let adapter = adapter();
        let req = request(Constraints {
            min_bandwidth_gbps: Some(5.0),
            ..Constraints::default()
        });

        let found = constrained_dijkstra(&adapter, &req, &CostWeights::default())
            .await
            .unwrap()
            .expect("feasible");
        assert_eq!(found.path, vec!["A", "B", "D"]);
    }

    #[tokio::test]
    async fn bandwidth_floor_of_twenty_is_infeasible() {
        let adapter = adapter();
        let req = request(Constraints {
            min_bandwidth_gbps: Some(20.0),
            ..Constraints::default()
        });

        let found = constrained_dijkstra(&adapter, &req, &CostWeights::default())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn latency_cap_prunes_partial_paths() {
        let adapter = adapter();
        let req = request(Constraints {
            max_latency_ms: Some(15.0),
            ..Constraints::default()
        });

        // A-B-D is 20ms, A-C-D is 10ms
        let found = constrained_dijkstra(&adapter, &req, &CostWeights::default())
            .await
            .unwrap()
            .expect("feasible");
        assert_eq!(found.path, vec!["A", "C", "D"]);
        assert!(found.total_latency_ms <= 15.0);
    }

    #[tokio::test]
    async fn secure_link_requirement_excludes_plain_edges() {
        let mut state = NetworkState::new();
        for id in ["A", "B", "D"] {
            state.upsert_node(Node::ground_station(id, id, 0.0, 0.0, 1));
        }
        state
            .upsert_link(Link::new("AD", "A", "D", 5.0, 10.0, 0.99))
            .unwrap();
        state
            .upsert_link(Link::new("AB", "A", "B", 10.0, 10.0, 0.99).secure())
            .unwrap();
        state
            .upsert_link(Link::new("BD", "B", "D", 10.0, 10.0, 0.99).secure())
            .unwrap();
        let adapter = GraphStoreAdapter::new(NetworkHandle::new(state));

        let req = request(Constraints {
            require_secure: true,
            ..Constraints::default()
        });
        let found = constrained_dijkstra(&adapter, &req, &CostWeights::default())
            .await
            .unwrap()
            .expect("feasible");
        assert_eq!(found.path, vec!["A", "B", "D"]);
    }

    #[tokio::test]
    async fn equal_cost_prefers_fewer_hops() {
        let mut state = NetworkState::new();
        for id in ["A", "B", "D"] {
            state.upsert_node(Node::ground_station(id, id, 0.0, 0.0, 1));
        }
        // Direct: 10 + 1000/5 = 210. Two-hop: 2 * (5 + 1000/10) = 210.
        state
            .upsert_link(Link::new("AD", "A", "D", 10.0, 5.0, 1.0))
            .unwrap();
        state
            .upsert_link(Link::new("AB", "A", "B", 5.0, 10.0, 1.0))
            .unwrap();
        state
            .upsert_link(Link::new("BD", "B", "D", 5.0, 10.0, 1.0))
            .unwrap();
        let adapter = GraphStoreAdapter::new(NetworkHandle::new(state));

        let found = constrained_dijkstra(
            &adapter,
            &RouteRequest::new("A", "D"),
            &CostWeights::default(),
        )
        .await
        .unwrap()
        .expect("feasible");
        assert_eq!(found.path, vec!["A", "D"]);
    }

    #[tokio::test]
    async fn hop_cap_keeps_the_costlier_short_path_alive() {
        let mut state = NetworkState::new();
        for id in ["A", "B", "C", "X", "D"] {
            state.upsert_node(Node::ground_station(id, id, 0.0, 0.0, 1));
        }
        // Cheap fast detour A-B-C-X versus one expensive direct hop A-X
        for (link_id, a, b) in [("AB", "A", "B"), ("BC", "B", "C"), ("CX", "C", "X")] {
            state
                .upsert_link(Link::new(link_id, a, b, 5.0, 100.0, 1.0))
                .unwrap();
        }
        state
            .upsert_link(Link::new("AX", "A", "X", 50.0, 10.0, 1.0))
            .unwrap();
        state
            .upsert_link(Link::new("XD", "X", "D", 5.0, 100.0, 1.0))
            .unwrap();
        let adapter = GraphStoreAdapter::new(NetworkHandle::new(state));
        let weights = CostWeights::default();

        // Unbounded, the detour wins outright
        let free = constrained_dijkstra(&adapter, &RouteRequest::new("A", "D"), &weights)
            .await
            .unwrap()
            .expect("feasible");
        assert_eq!(free.path, vec!["A", "B", "C", "X", "D"]);

        // Under the hop budget only A-X-D fits; the detour's label at X
        // must not have shadowed it
        let capped = request(Constraints {
            max_hops: Some(3),
            ..Constraints::default()
        });
        let found = constrained_dijkstra(&adapter, &capped, &weights)
            .await
            .unwrap()
            .expect("feasible within hop budget");
        assert_eq!(found.path, vec!["A", "X", "D"]);
        assert_eq!(found.hop_count, 2);
    }

    #[tokio::test]
    async fn equal_cost_equal_hops_prefers_lexicographic_path() {
        let mut state = NetworkState::new();
        for id in ["A", "B", "C", "D"] {
            state.upsert_node(Node::ground_station(id, id, 0.0, 0.0, 1));
        }
        for (link_id, a, b) in [("AB", "A", "B"), ("BD", "B", "D"), ("AC", "A", "C"), ("CD", "C", "D")] {
            state
                .upsert_link(Link::new(link_id, a, b, 10.0, 10.0, 0.99))
                .unwrap();
        }
        let adapter = GraphStoreAdapter::new(NetworkHandle::new(state));

        let found = constrained_dijkstra(
            &adapter,
            &RouteRequest::new("A", "D"),
            &CostWeights::default(),
        )
        .await
        .unwrap()
        .expect("feasible");
        assert_eq!(found.path, vec!["A", "B", "D"]);
    }

    #[tokio::test]
    async fn astar_agrees_with_dijkstra() {
        let network = NetworkHandle::new(mesh_core::demo_constellation());
        let adapter = GraphStoreAdapter::new(network);
        let weights = CostWeights::default();

        for (src, dst) in [("GS-NYC", "GS-SIN"), ("GS-LON", "GS-SYD"), ("GS-TOK", "GS-JNB")] {
            let req = RouteRequest::new(src, dst);
            let d = constrained_dijkstra(&adapter, &req, &weights)
                .await
                .unwrap()
                .expect("feasible");
            let a = astar_geo(&adapter, &req, &weights)
                .await
                .unwrap()
                .expect("feasible");
            assert_eq!(d.path, a.path, "{src} -> {dst}");
            assert!((d.total_cost - a.total_cost).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn missing_endpoint_is_node_not_found() {
        let adapter = adapter();
        let req = RouteRequest::new("A", "NOWHERE");

        let err = constrained_dijkstra(&adapter, &req, &CostWeights::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::NodeNotFound(id) if id == "NOWHERE"));
    }

    #[tokio::test]
    async fn offline_destination_is_infeasible_not_missing() {
        let network = reference_network();
        network.force_node_status("D", NodeStatus::Offline).unwrap();
        let adapter = GraphStoreAdapter::new(network);

        let found = constrained_dijkstra(
            &adapter,
            &RouteRequest::new("A", "D"),
            &CostWeights::default(),
        )
        .await
        .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn source_equals_destination_is_trivial() {
        let adapter = adapter();
        let found = constrained_dijkstra(
            &adapter,
            &RouteRequest::new("A", "A"),
            &CostWeights::default(),
        )
        .await
        .unwrap()
        .expect("trivial");
        assert_eq!(found.path, vec!["A"]);
        assert_eq!(found.total_cost, 0.0);
    }

    #[tokio::test]
    async fn all_paths_enumerates_both_routes_cheapest_first() {
        let adapter = adapter();
        let paths = bounded_all_paths(
            &adapter,
            &RouteRequest::new("A", "D"),
            &CostWeights::default(),
            6,
            50,
        )
        .await
        .unwrap();

        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].path, vec!["A", "B", "D"]);
        assert_eq!(paths[1].path, vec!["A", "C", "D"]);
        assert!(paths[0].total_cost <= paths[1].total_cost);
    }

    #[tokio::test]
    async fn all_paths_respects_caps() {
        let network = NetworkHandle::new(mesh_core::demo_constellation());
        let adapter = GraphStoreAdapter::new(network);

        let paths = bounded_all_paths(
            &adapter,
            &RouteRequest::new("GS-NYC", "GS-SIN"),
            &CostWeights::default(),
            6,
            50,
        )
        .await
        .unwrap();

        assert!(!paths.is_empty());
        assert!(paths.len() <= 50);
        assert!(paths.iter().all(|p| p.hop_count <= 6));
        // Simple paths only
        for p in &paths {
            let mut seen = p.path.clone();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), p.path.len());
        }
    }

    #[tokio::test]
    async fn all_paths_hard_caps_path_count() {
        let network = NetworkHandle::new(mesh_core::demo_constellation());
        let adapter = GraphStoreAdapter::new(network);

        let paths = bounded_all_paths(
            &adapter,
            &RouteRequest::new("GS-NYC", "GS-SIN"),
            &CostWeights::default(),
            6,
            3,
        )
        .await
        .unwrap();
        assert!(paths.len() <= 3);
    }
}
