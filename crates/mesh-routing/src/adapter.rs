//! Store adapters: graph-native and relational fallback
//!
//! Both variants answer `node`, `neighbors`, and `link` queries from a
//! version-stamped materialization of the shared [`NetworkState`] and
//! filter through the single [`mesh_core::link_usable`] predicate, so
//! neighbor sets are identical for a consistent snapshot.
//!
//! Each adapter carries a fault switch for the resilience harness:
//! `Unavailable` makes every query fail, `Slow` delays it past the
//! engine's adapter timeout to drive the fallback transition.

use async_trait::async_trait;
use mesh_core::{link_usable, Link, NetworkHandle, NetworkState, Node, NodeKind, NodeStatus};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::{AdapterKind, Result, RouteError};

/// A usable link seen from one endpoint, with the far node resolved
#[derive(Debug, Clone)]
pub struct LinkView {
    pub link: Link,
    pub neighbor: Node,
}

/// Query interface shared by both store variants.
///
/// `link` exists for the cache layer's lazy revalidation; searches only
/// use `node` and `neighbors`.
#[async_trait]
pub trait TopologyAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    async fn node(&self, id: &str) -> Result<Node>;

    /// Usable links incident to a node. Links that are inactive, report
    /// zero bandwidth, or touch an offline endpoint are absent.
    async fn neighbors(&self, id: &str) -> Result<Vec<LinkView>>;

    async fn link(&self, id: &str) -> Result<Link>;
}

/// Injected fault behavior for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    Healthy,
    /// Every query fails with `AdapterUnavailable`
    Unavailable,
    /// Every query sleeps before answering
    Slow(Duration),
}

struct FaultSwitch {
    kind: AdapterKind,
    mode: RwLock<FaultMode>,
}

impl FaultSwitch {
    fn new(kind: AdapterKind) -> Self {
        Self {
            kind,
            mode: RwLock::new(FaultMode::Healthy),
        }
    }

    fn set(&self, mode: FaultMode) {
        tracing::info!(adapter = %self.kind, ?mode, "fault injection: adapter mode set");
        *self.mode.write().expect("fault lock poisoned") = mode;
    }

    async fn gate(&self) -> Result<()> {
        let mode = *self.mode.read().expect("fault lock poisoned");
        match mode {
            FaultMode::Healthy => Ok(()),
            FaultMode::Unavailable => Err(RouteError::AdapterUnavailable {
                cause: format!("{} adapter forced unavailable", self.kind),
            }),
            FaultMode::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

// ============================================================================
// Graph store adapter
// ============================================================================

struct GraphView {
    version: u64,
    graph: DiGraph<Node, Link>,
    index: HashMap<String, NodeIndex>,
    links: HashMap<String, Link>,
}

impl GraphView {
    fn build(state: &NetworkState) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut links = HashMap::new();

        for node in state.nodes() {
            let idx = graph.add_node(node.clone());
            index.insert(node.id.clone(), idx);
        }
        for link in state.links() {
            links.insert(link.id.clone(), link.clone());
            if let (Some(&a), Some(&b)) = (index.get(&link.source), index.get(&link.target)) {
                // Undirected traversal: one stored record, two edges
                graph.add_edge(a, b, link.clone());
                graph.add_edge(b, a, link.clone());
            }
        }

        Self {
            version: state.version(),
            graph,
            index,
            links,
        }
    }
}

/// Graph-native store: petgraph materialization of the shared state,
/// rebuilt when the state version advances.
pub struct GraphStoreAdapter {
    network: NetworkHandle,
    view: RwLock<GraphView>,
    fault: FaultSwitch,
}

impl GraphStoreAdapter {
    pub fn new(network: NetworkHandle) -> Self {
        let view = GraphView::build(&network.snapshot());
        Self {
            network,
            view: RwLock::new(view),
            fault: FaultSwitch::new(AdapterKind::GraphStore),
        }
    }

    pub fn set_fault(&self, mode: FaultMode) {
        self.fault.set(mode);
    }

    fn refresh(&self) {
        let current = self.network.version();
        if self.view.read().expect("view lock poisoned").version != current {
            let rebuilt = GraphView::build(&self.network.snapshot());
            *self.view.write().expect("view lock poisoned") = rebuilt;
        }
    }
}

#[async_trait]
impl TopologyAdapter for GraphStoreAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::GraphStore
    }

    async fn node(&self, id: &str) -> Result<Node> {
        self.fault.gate().await?;
        self.refresh();

        let view = self.view.read().expect("view lock poisoned");
        view.index
            .get(id)
            .map(|&idx| view.graph[idx].clone())
            .ok_or_else(|| RouteError::NodeNotFound(id.to_string()))
    }

    async fn neighbors(&self, id: &str) -> Result<Vec<LinkView>> {
        self.fault.gate().await?;
        self.refresh();

        let view = self.view.read().expect("view lock poisoned");
        let &idx = view
            .index
            .get(id)
            .ok_or_else(|| RouteError::NodeNotFound(id.to_string()))?;

        let here = &view.graph[idx];
        let mut out = Vec::new();
        for edge in view.graph.edges(idx) {
            let neighbor = &view.graph[edge.target()];
            let link = edge.weight();
            if link_usable(link, here, neighbor) {
                out.push(LinkView {
                    link: link.clone(),
                    neighbor: neighbor.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn link(&self, id: &str) -> Result<Link> {
        self.fault.gate().await?;
        self.refresh();

        let view = self.view.read().expect("view lock poisoned");
        view.links
            .get(id)
            .cloned()
            .ok_or_else(|| RouteError::LinkNotFound(id.to_string()))
    }
}

// ============================================================================
// Relational fallback adapter
// ============================================================================

/// Flat node record, as held in the relational replica
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRow {
    pub node_id: String,
    pub name: String,
    pub kind: NodeKind,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub tier: u8,
    pub max_capacity_gbps: f64,
    pub available_bandwidth_gbps: f64,
    pub latency_contrib_ms: f64,
    pub weather_multiplier: f64,
    pub status: NodeStatus,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl NodeRow {
    fn from_node(node: &Node) -> Self {
        Self {
            node_id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind,
            latitude_deg: node.position.latitude_deg,
            longitude_deg: node.position.longitude_deg,
            altitude_km: node.position.altitude_km,
            tier: node.tier,
            max_capacity_gbps: node.max_capacity_gbps,
            available_bandwidth_gbps: node.slot.available_bandwidth_gbps,
            latency_contrib_ms: node.slot.latency_contrib_ms,
            weather_multiplier: node.slot.weather_multiplier,
            status: node.slot.status,
            updated_at: node.slot.updated_at,
        }
    }

    fn to_node(&self) -> Node {
        Node {
            id: self.node_id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            position: mesh_core::GeoPosition {
                latitude_deg: self.latitude_deg,
                longitude_deg: self.longitude_deg,
                altitude_km: self.altitude_km,
            },
            tier: self.tier,
            max_capacity_gbps: self.max_capacity_gbps,
            slot: mesh_core::NodeSlot {
                available_bandwidth_gbps: self.available_bandwidth_gbps,
                latency_contrib_ms: self.latency_contrib_ms,
                weather_multiplier: self.weather_multiplier,
                status: self.status,
                updated_at: self.updated_at,
            },
        }
    }
}

/// Flat link record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRow {
    pub link_id: String,
    pub source_id: String,
    pub target_id: String,
    pub latency_ms: f64,
    pub bandwidth_gbps: f64,
    pub reliability: f64,
    pub secure: bool,
    pub weather_multiplier: f64,
    pub active: bool,
}

impl LinkRow {
    fn from_link(link: &Link) -> Self {
        Self {
            link_id: link.id.clone(),
            source_id: link.source.clone(),
            target_id: link.target.clone(),
            latency_ms: link.latency_ms,
            bandwidth_gbps: link.bandwidth_gbps,
            reliability: link.reliability,
            secure: link.secure,
            weather_multiplier: link.weather_multiplier,
            active: link.active,
        }
    }

    fn to_link(&self) -> Link {
        Link {
            id: self.link_id.clone(),
            source: self.source_id.clone(),
            target: self.target_id.clone(),
            latency_ms: self.latency_ms,
            bandwidth_gbps: self.bandwidth_gbps,
            reliability: self.reliability,
            secure: self.secure,
            weather_multiplier: self.weather_multiplier,
            active: self.active,
        }
    }
}

struct TableView {
    version: u64,
    node_rows: Vec<NodeRow>,
    link_rows: Vec<LinkRow>,
}

impl TableView {
    fn build(state: &NetworkState) -> Self {
        let mut node_rows: Vec<_> = state.nodes().map(NodeRow::from_node).collect();
        let mut link_rows: Vec<_> = state.links().map(LinkRow::from_link).collect();
        node_rows.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        link_rows.sort_by(|a, b| a.link_id.cmp(&b.link_id));

        Self {
            version: state.version(),
            node_rows,
            link_rows,
        }
    }

    fn node_row(&self, id: &str) -> Option<&NodeRow> {
        self.node_rows
            .binary_search_by(|row| row.node_id.as_str().cmp(id))
            .ok()
            .map(|i| &self.node_rows[i])
    }
}

/// Relational fallback store: flat node/link tables kept from the same
/// shared state the graph store reads (the external sync process keeps
/// the real replicas eventually consistent; here both read one source).
/// Neighbor queries are table scans.
pub struct RelationalAdapter {
    network: NetworkHandle,
    tables: RwLock<TableView>,
    fault: FaultSwitch,
}

impl RelationalAdapter {
    pub fn new(network: NetworkHandle) -> Self {
        let tables = TableView::build(&network.snapshot());
        Self {
            network,
            tables: RwLock::new(tables),
            fault: FaultSwitch::new(AdapterKind::RelationalFallback),
        }
    }

    pub fn set_fault(&self, mode: FaultMode) {
        self.fault.set(mode);
    }

    fn refresh(&self) {
        let current = self.network.version();
        if self.tables.read().expect("table lock poisoned").version != current {
            let rebuilt = TableView::build(&self.network.snapshot());
            *self.tables.write().expect("table lock poisoned") = rebuilt;
        }
    }
}

#[async_trait]
impl TopologyAdapter for RelationalAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::RelationalFallback
    }

    async fn node(&self, id: &str) -> Result<Node> {
        self.fault.gate().await?;
        self.refresh();

        let tables = self.tables.read().expect("table lock poisoned");
        tables
            .node_row(id)
            .map(NodeRow::to_node)
            .ok_or_else(|| RouteError::NodeNotFound(id.to_string()))
    }

    async fn neighbors(&self, id: &str) -> Result<Vec<LinkView>> {
        self.fault.gate().await?;
        self.refresh();

        let tables = self.tables.read().expect("table lock poisoned");
        let here = tables
            .node_row(id)
            .map(NodeRow::to_node)
            .ok_or_else(|| RouteError::NodeNotFound(id.to_string()))?;

        let mut out = Vec::new();
        for row in &tables.link_rows {
            let far_id = if row.source_id == id {
                &row.target_id
            } else if row.target_id == id {
                &row.source_id
            } else {
                continue;
            };
            let Some(far_row) = tables.node_row(far_id) else {
                continue;
            };
            let link = row.to_link();
            let neighbor = far_row.to_node();
            if link_usable(&link, &here, &neighbor) {
                out.push(LinkView { link, neighbor });
            }
        }
        Ok(out)
    }

    async fn link(&self, id: &str) -> Result<Link> {
        self.fault.gate().await?;
        self.refresh();

        let tables = self.tables.read().expect("table lock poisoned");
        tables
            .link_rows
            .iter()
            .find(|row| row.link_id == id)
            .map(LinkRow::to_link)
            .ok_or_else(|| RouteError::LinkNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::{demo_constellation, Link, NetworkState, Node};

    fn handle() -> NetworkHandle {
        NetworkHandle::new(demo_constellation())
    }

    fn sorted_link_ids(views: &[LinkView]) -> Vec<String> {
        let mut ids: Vec<_> = views.iter().map(|v| v.link.id.clone()).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn adapters_agree_on_neighbors() {
        let network = handle();
        let graph = GraphStoreAdapter::new(network.clone());
        let relational = RelationalAdapter::new(network.clone());

        for node in network.snapshot().nodes() {
            let a = graph.neighbors(&node.id).await.unwrap();
            let b = relational.neighbors(&node.id).await.unwrap();
            assert_eq!(sorted_link_ids(&a), sorted_link_ids(&b), "{}", node.id);
        }
    }

    #[tokio::test]
    async fn offline_node_disappears_from_both_adapters() {
        let network = handle();
        let graph = GraphStoreAdapter::new(network.clone());
        let relational = RelationalAdapter::new(network.clone());

        // GS-NYC feeds into RELAY-02 and RELAY-03
        network
            .force_node_status("RELAY-02", mesh_core::NodeStatus::Offline)
            .unwrap();

        for adapter in [&graph as &dyn TopologyAdapter, &relational] {
            let views = adapter.neighbors("GS-NYC").await.unwrap();
            assert!(views.iter().all(|v| v.neighbor.id != "RELAY-02"));
            assert!(views.iter().any(|v| v.neighbor.id == "RELAY-03"));
        }
    }

    #[tokio::test]
    async fn inactive_and_zero_bandwidth_links_are_absent() {
        let mut state = NetworkState::new();
        state.upsert_node(Node::ground_station("GS-A", "A", 0.0, 0.0, 1));
        state.upsert_node(Node::ground_station("GS-B", "B", 1.0, 1.0, 1));
        state
            .upsert_link(Link::new("L-1", "GS-A", "GS-B", 10.0, 10.0, 0.99))
            .unwrap();
        let network = NetworkHandle::new(state);
        network.force_link_active("L-1", false).unwrap();

        let graph = GraphStoreAdapter::new(network.clone());
        let relational = RelationalAdapter::new(network.clone());
        assert!(graph.neighbors("GS-A").await.unwrap().is_empty());
        assert!(relational.neighbors("GS-A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn view_refreshes_when_version_advances() {
        let network = handle();
        let graph = GraphStoreAdapter::new(network.clone());

        let before = graph.neighbors("GS-NYC").await.unwrap().len();
        network
            .force_link_active("FEED-GS-NYC-RELAY-03", false)
            .unwrap();
        let after = graph.neighbors("GS-NYC").await.unwrap().len();

        assert_eq!(after, before - 1);
    }

    #[tokio::test]
    async fn unavailable_fault_fails_queries() {
        let network = handle();
        let graph = GraphStoreAdapter::new(network);
        graph.set_fault(FaultMode::Unavailable);

        let err = graph.node("GS-NYC").await.unwrap_err();
        assert!(matches!(err, RouteError::AdapterUnavailable { .. }));

        graph.set_fault(FaultMode::Healthy);
        assert!(graph.node("GS-NYC").await.is_ok());
    }

    #[tokio::test]
    async fn missing_node_is_not_found() {
        let network = handle();
        let relational = RelationalAdapter::new(network);

        let err = relational.node("GS-NOWHERE").await.unwrap_err();
        assert!(matches!(err, RouteError::NodeNotFound(id) if id == "GS-NOWHERE"));
    }
}
