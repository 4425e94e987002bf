//! Mesh Core - relay mesh topology model
//!
//! Shared data model for the relay routing engine:
//!
//! - Nodes (ground stations + orbital relays) with static attributes
//!   and telemetry-driven dynamic slots
//! - Links with time-varying physical attributes
//! - Versioned network state read by both store adapters
//! - Link cost model and geodesy helpers
//!
//! Telemetry ingestion is an external producer; this crate only exposes
//! the write surface it needs plus fault-injection hooks for the
//! resilience harness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

pub mod cost;

pub use cost::{haversine_km, link_cost, optimistic_latency_ms, CostWeights};

/// Core errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Link not found: {0}")]
    LinkNotFound(String),
    #[error("Invalid attribute {field}: {value}")]
    InvalidAttribute { field: &'static str, value: f64 },
}

pub type Result<T> = std::result::Result<T, CoreError>;

pub type NodeId = String;
pub type LinkId = String;

/// Node kinds in the relay mesh
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeKind {
    GroundStation,
    Relay,
}

/// Operational status of a node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeStatus {
    Active,
    Degraded,
    Offline,
}

/// Geographic position
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Dynamic attributes, updated by the external telemetry feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSlot {
    pub available_bandwidth_gbps: f64,
    pub latency_contrib_ms: f64,
    /// Weather impact multiplier (>= 1.0, 1.0 = no impact)
    pub weather_multiplier: f64,
    pub status: NodeStatus,
    pub updated_at: DateTime<Utc>,
}

impl Default for NodeSlot {
    fn default() -> Self {
        Self {
            available_bandwidth_gbps: 0.0,
            latency_contrib_ms: 0.0,
            weather_multiplier: 1.0,
            status: NodeStatus::Active,
            updated_at: Utc::now(),
        }
    }
}

/// A point of presence in the mesh: ground station or orbital relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub position: GeoPosition,
    /// Ordinal service class (1 = highest priority)
    pub tier: u8,
    pub max_capacity_gbps: f64,
    pub slot: NodeSlot,
}

impl Node {
    pub fn ground_station(
        id: impl Into<String>,
        name: impl Into<String>,
        lat: f64,
        lon: f64,
        tier: u8,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::GroundStation,
            position: GeoPosition {
                latitude_deg: lat,
                longitude_deg: lon,
                altitude_km: 0.0,
            },
            tier,
            max_capacity_gbps: 100.0,
            slot: NodeSlot {
                available_bandwidth_gbps: 100.0,
                ..NodeSlot::default()
            },
        }
    }

    pub fn relay(
        id: impl Into<String>,
        name: impl Into<String>,
        lat: f64,
        lon: f64,
        altitude_km: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: NodeKind::Relay,
            position: GeoPosition {
                latitude_deg: lat,
                longitude_deg: lon,
                altitude_km,
            },
            tier: 1,
            max_capacity_gbps: 40.0,
            slot: NodeSlot {
                available_bandwidth_gbps: 40.0,
                ..NodeSlot::default()
            },
        }
    }

    pub fn is_relay(&self) -> bool {
        self.kind == NodeKind::Relay
    }

    pub fn is_ground_station(&self) -> bool {
        self.kind == NodeKind::GroundStation
    }

    pub fn is_offline(&self) -> bool {
        self.slot.status == NodeStatus::Offline
    }
}

/// A connection between two nodes, traversable in both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source: NodeId,
    pub target: NodeId,
    pub latency_ms: f64,
    pub bandwidth_gbps: f64,
    /// Success probability in [0, 1]
    pub reliability: f64,
    pub secure: bool,
    /// Weather impact multiplier (>= 1.0, 1.0 = no impact)
    pub weather_multiplier: f64,
    pub active: bool,
}

impl Link {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        latency_ms: f64,
        bandwidth_gbps: f64,
        reliability: f64,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            latency_ms,
            bandwidth_gbps,
            reliability,
            secure: false,
            weather_multiplier: 1.0,
            active: true,
        }
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn with_weather(mut self, multiplier: f64) -> Self {
        self.weather_multiplier = multiplier;
        self
    }

    /// Given one endpoint, return the other
    pub fn other_end(&self, node_id: &str) -> Option<&NodeId> {
        if self.source == node_id {
            Some(&self.target)
        } else if self.target == node_id {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Whether a link may participate in a search.
///
/// Both adapters must route through this single predicate so neighbor
/// sets stay adapter-independent for a consistent snapshot. Zero
/// bandwidth and offline endpoints make the link absent, not
/// infinite-cost.
pub fn link_usable(link: &Link, source: &Node, target: &Node) -> bool {
    link.active
        && link.bandwidth_gbps > 0.0
        && !source.is_offline()
        && !target.is_offline()
}

/// Telemetry update for a node slot; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeTelemetry {
    pub available_bandwidth_gbps: Option<f64>,
    pub latency_contrib_ms: Option<f64>,
    pub weather_multiplier: Option<f64>,
    pub status: Option<NodeStatus>,
}

/// Telemetry update for a link; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkTelemetry {
    pub latency_ms: Option<f64>,
    pub bandwidth_gbps: Option<f64>,
    pub reliability: Option<f64>,
    pub weather_multiplier: Option<f64>,
    pub active: Option<bool>,
}

/// The full network topology plus current dynamic attributes.
///
/// Version is bumped on every mutation; adapters materialize their
/// query views from a snapshot and refresh when the version advances,
/// so a single search pass never observes a mid-flight status flip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkState {
    nodes: HashMap<NodeId, Node>,
    links: HashMap<LinkId, Link>,
    adjacency: HashMap<NodeId, Vec<LinkId>>,
    version: u64,
}

impl NetworkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Link ids incident to a node, regardless of usability
    pub fn incident_links(&self, id: &str) -> &[LinkId] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn upsert_node(&mut self, node: Node) {
        self.adjacency.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
        self.version += 1;
    }

    pub fn upsert_link(&mut self, link: Link) -> Result<()> {
        if !self.nodes.contains_key(&link.source) {
            return Err(CoreError::NodeNotFound(link.source.clone()));
        }
        if !self.nodes.contains_key(&link.target) {
            return Err(CoreError::NodeNotFound(link.target.clone()));
        }
        if !(0.0..=1.0).contains(&link.reliability) {
            return Err(CoreError::InvalidAttribute {
                field: "reliability",
                value: link.reliability,
            });
        }
        if link.bandwidth_gbps <= 0.0 {
            return Err(CoreError::InvalidAttribute {
                field: "bandwidth_gbps",
                value: link.bandwidth_gbps,
            });
        }
        if link.weather_multiplier < 1.0 {
            return Err(CoreError::InvalidAttribute {
                field: "weather_multiplier",
                value: link.weather_multiplier,
            });
        }

        for end in [&link.source, &link.target] {
            let incident = self.adjacency.entry(end.clone()).or_default();
            if !incident.contains(&link.id) {
                incident.push(link.id.clone());
            }
        }
        self.links.insert(link.id.clone(), link);
        self.version += 1;
        Ok(())
    }

    pub fn apply_node_telemetry(&mut self, id: &str, update: NodeTelemetry) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| CoreError::NodeNotFound(id.to_string()))?;

        if let Some(bw) = update.available_bandwidth_gbps {
            node.slot.available_bandwidth_gbps = bw;
        }
        if let Some(lat) = update.latency_contrib_ms {
            node.slot.latency_contrib_ms = lat;
        }
        if let Some(wx) = update.weather_multiplier {
            node.slot.weather_multiplier = wx.max(1.0);
        }
        if let Some(status) = update.status {
            node.slot.status = status;
        }
        node.slot.updated_at = Utc::now();
        self.version += 1;
        Ok(())
    }

    pub fn apply_link_telemetry(&mut self, id: &str, update: LinkTelemetry) -> Result<()> {
        let link = self
            .links
            .get_mut(id)
            .ok_or_else(|| CoreError::LinkNotFound(id.to_string()))?;

        if let Some(lat) = update.latency_ms {
            link.latency_ms = lat;
        }
        if let Some(bw) = update.bandwidth_gbps {
            link.bandwidth_gbps = bw;
        }
        if let Some(rel) = update.reliability {
            link.reliability = rel.clamp(0.0, 1.0);
        }
        if let Some(wx) = update.weather_multiplier {
            link.weather_multiplier = wx.max(1.0);
        }
        if let Some(active) = update.active {
            link.active = active;
        }
        self.version += 1;
        Ok(())
    }

    /// Resilience-harness hook: force a node status regardless of telemetry
    pub fn force_node_status(&mut self, id: &str, status: NodeStatus) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| CoreError::NodeNotFound(id.to_string()))?;
        node.slot.status = status;
        node.slot.updated_at = Utc::now();
        self.version += 1;
        Ok(())
    }

    /// Resilience-harness hook: force a link up or down
    pub fn force_link_active(&mut self, id: &str, active: bool) -> Result<()> {
        let link = self
            .links
            .get_mut(id)
            .ok_or_else(|| CoreError::LinkNotFound(id.to_string()))?;
        link.active = active;
        self.version += 1;
        Ok(())
    }

    pub fn stats(&self) -> NetworkStats {
        let ground_stations = self.nodes().filter(|n| n.is_ground_station()).count();
        let relays = self.nodes().filter(|n| n.is_relay()).count();
        let offline_nodes = self.nodes().filter(|n| n.is_offline()).count();
        let active_links = self.links().filter(|l| l.active).count();

        NetworkStats {
            total_nodes: self.nodes.len(),
            ground_stations,
            relays,
            offline_nodes,
            total_links: self.links.len(),
            active_links,
            version: self.version,
        }
    }
}

/// Snapshot statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_nodes: usize,
    pub ground_stations: usize,
    pub relays: usize,
    pub offline_nodes: usize,
    pub total_links: usize,
    pub active_links: usize,
    pub version: u64,
}

/// Shared, concurrently readable handle over the network state.
///
/// Readers clone a snapshot; mutators take the write lock briefly and
/// bump the version. Locks are never held across await points.
#[derive(Clone, Default)]
pub struct NetworkHandle {
    inner: Arc<RwLock<NetworkState>>,
}

impl NetworkHandle {
    pub fn new(state: NetworkState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn snapshot(&self) -> NetworkState {
        self.inner.read().expect("network lock poisoned").clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.read().expect("network lock poisoned").version()
    }

    pub fn stats(&self) -> NetworkStats {
        self.inner.read().expect("network lock poisoned").stats()
    }

    pub fn upsert_node(&self, node: Node) {
        tracing::debug!(node = %node.id, "upserting node");
        self.inner
            .write()
            .expect("network lock poisoned")
            .upsert_node(node);
    }

    pub fn upsert_link(&self, link: Link) -> Result<()> {
        tracing::debug!(link = %link.id, "upserting link");
        self.inner
            .write()
            .expect("network lock poisoned")
            .upsert_link(link)
    }

    pub fn apply_node_telemetry(&self, id: &str, update: NodeTelemetry) -> Result<()> {
        self.inner
            .write()
            .expect("network lock poisoned")
            .apply_node_telemetry(id, update)
    }

    pub fn apply_link_telemetry(&self, id: &str, update: LinkTelemetry) -> Result<()> {
        self.inner
            .write()
            .expect("network lock poisoned")
            .apply_link_telemetry(id, update)
    }

    pub fn force_node_status(&self, id: &str, status: NodeStatus) -> Result<()> {
        tracing::info!(node = %id, ?status, "fault injection: forcing node status");
        self.inner
            .write()
            .expect("network lock poisoned")
            .force_node_status(id, status)
    }

    pub fn force_link_active(&self, id: &str, active: bool) -> Result<()> {
        tracing::info!(link = %id, active, "fault injection: forcing link state");
        self.inner
            .write()
            .expect("network lock poisoned")
            .force_link_active(id, active)
    }
}

/// Demo topology: six ground stations bridged by a six-relay ring.
///
/// Used by the gateway at startup and by harness smoke runs. Production
/// deployments load topology from the provisioning store instead.
pub fn demo_constellation() -> NetworkState {
    let mut state = NetworkState::new();

    let stations = [
        ("GS-NYC", "New York", 40.7128, -74.0060, 1),
        ("GS-LON", "London", 51.5074, -0.1278, 1),
        ("GS-SIN", "Singapore", 1.3521, 103.8198, 1),
        ("GS-TOK", "Tokyo", 35.6762, 139.6503, 2),
        ("GS-SYD", "Sydney", -33.8688, 151.2093, 2),
        ("GS-JNB", "Johannesburg", -26.2041, 28.0473, 3),
    ];
    for (id, name, lat, lon, tier) in stations {
        state.upsert_node(Node::ground_station(id, name, lat, lon, tier));
    }

    for i in 0..6u8 {
        let lon = f64::from(i) * 60.0 - 180.0;
        state.upsert_node(Node::relay(
            format!("RELAY-{:02}", i + 1),
            format!("Relay {}", i + 1),
            0.0,
            lon,
            8_000.0,
        ));
    }

    // Relay ring
    for i in 0..6u8 {
        let a = format!("RELAY-{:02}", i + 1);
        let b = format!("RELAY-{:02}", (i + 1) % 6 + 1);
        let link = Link::new(format!("ISL-{:02}", i + 1), a, b, 22.0, 40.0, 0.999).secure();
        state.upsert_link(link).expect("demo relay link");
    }

    // Ground feeds, two relays per station for redundancy
    let feeds = [
        ("GS-NYC", "RELAY-02", 0.98),
        ("GS-NYC", "RELAY-03", 0.95),
        ("GS-LON", "RELAY-03", 0.97),
        ("GS-LON", "RELAY-04", 0.96),
        ("GS-SIN", "RELAY-05", 0.98),
        ("GS-SIN", "RELAY-06", 0.94),
        ("GS-TOK", "RELAY-06", 0.97),
        ("GS-TOK", "RELAY-01", 0.95),
        ("GS-SYD", "RELAY-06", 0.93),
        ("GS-SYD", "RELAY-01", 0.92),
        ("GS-JNB", "RELAY-04", 0.90),
        ("GS-JNB", "RELAY-05", 0.91),
    ];
    for (gs, relay, reliability) in feeds {
        let link = Link::new(format!("FEED-{gs}-{relay}"), gs, relay, 30.0, 20.0, reliability)
            .secure();
        state.upsert_link(link).expect("demo feed link");
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_state() -> NetworkState {
        let mut state = NetworkState::new();
        state.upsert_node(Node::ground_station("GS-A", "A", 0.0, 0.0, 1));
        state.upsert_node(Node::relay("R-1", "Relay 1", 0.0, 10.0, 8_000.0));
        state
            .upsert_link(Link::new("L-1", "GS-A", "R-1", 10.0, 10.0, 0.99))
            .unwrap();
        state
    }

    #[test]
    fn upsert_link_requires_endpoints() {
        let mut state = NetworkState::new();
        state.upsert_node(Node::ground_station("GS-A", "A", 0.0, 0.0, 1));

        let err = state
            .upsert_link(Link::new("L-1", "GS-A", "MISSING", 10.0, 10.0, 0.99))
            .unwrap_err();
        assert!(matches!(err, CoreError::NodeNotFound(id) if id == "MISSING"));
    }

    #[test]
    fn upsert_link_validates_attributes() {
        let mut state = two_node_state();

        let err = state
            .upsert_link(Link::new("L-2", "GS-A", "R-1", 10.0, 10.0, 1.5))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidAttribute { field: "reliability", .. }
        ));

        let err = state
            .upsert_link(Link::new("L-3", "GS-A", "R-1", 10.0, 0.0, 0.9))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidAttribute { field: "bandwidth_gbps", .. }
        ));
    }

    #[test]
    fn offline_endpoint_makes_link_unusable() {
        let mut state = two_node_state();
        let link = state.link("L-1").unwrap().clone();

        assert!(link_usable(
            &link,
            state.node("GS-A").unwrap(),
            state.node("R-1").unwrap()
        ));

        state.force_node_status("R-1", NodeStatus::Offline).unwrap();
        assert!(!link_usable(
            &link,
            state.node("GS-A").unwrap(),
            state.node("R-1").unwrap()
        ));

        // Degraded nodes stay routable
        state.force_node_status("R-1", NodeStatus::Degraded).unwrap();
        assert!(link_usable(
            &link,
            state.node("GS-A").unwrap(),
            state.node("R-1").unwrap()
        ));
    }

    #[test]
    fn telemetry_bumps_version_and_merges_fields() {
        let mut state = two_node_state();
        let v0 = state.version();

        state
            .apply_link_telemetry(
                "L-1",
                LinkTelemetry {
                    reliability: Some(0.5),
                    ..LinkTelemetry::default()
                },
            )
            .unwrap();

        let link = state.link("L-1").unwrap();
        assert_eq!(link.reliability, 0.5);
        assert_eq!(link.latency_ms, 10.0); // untouched
        assert!(state.version() > v0);
    }

    #[test]
    fn demo_constellation_is_connected_enough() {
        let state = demo_constellation();
        let stats = state.stats();

        assert_eq!(stats.ground_stations, 6);
        assert_eq!(stats.relays, 6);
        assert_eq!(stats.total_links, 18);
        assert_eq!(stats.offline_nodes, 0);
        // Every station has two feeds
        for node in state.nodes().filter(|n| n.is_ground_station()) {
            assert_eq!(state.incident_links(&node.id).len(), 2, "{}", node.id);
        }
    }
}
