//! Mesh Routing - multi-constraint route computation
//!
//! Answers route requests over the time-varying relay mesh:
//!
//! - Constrained Dijkstra over the graph-native store (default)
//! - Geography-aware A* over the relational fallback store
//! - Bounded-hop all-paths enumeration for resilience analysis
//! - Route cache with lazy staleness eviction
//!
//! The engine is agnostic to which adapter serves a query; both
//! variants implement [`adapter::TopologyAdapter`] and apply identical
//! usability filtering, so results are adapter-independent for a
//! consistent network snapshot.

use mesh_core::{LinkId, NodeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod adapter;
pub mod cache;
pub mod engine;
pub mod search;

pub use adapter::{GraphStoreAdapter, RelationalAdapter, TopologyAdapter};
pub use cache::RouteCache;
pub use engine::{EngineConfig, RoutingEngine};
pub use search::ScoredPath;

/// Routing errors
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Link not found: {0}")]
    LinkNotFound(String),
    // `source` as a field name is reserved by thiserror
    #[error("No path from {from} to {to} satisfies the constraints")]
    Infeasible { from: String, to: String },
    #[error("{adapter} adapter timed out; {cause}")]
    AdapterTimeout { adapter: AdapterKind, cause: String },
    #[error("Adapter unavailable: {cause}")]
    AdapterUnavailable { cause: String },
    #[error("Request deadline exceeded")]
    RequestDeadlineExceeded,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, RouteError>;

/// Which store variant served a query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdapterKind {
    GraphStore,
    RelationalFallback,
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterKind::GraphStore => write!(f, "graph store"),
            AdapterKind::RelationalFallback => write!(f, "relational fallback"),
        }
    }
}

/// Per-request routing constraints.
///
/// Bandwidth and secure-link are hard constraints filtering individual
/// edges; latency and reliability bound the aggregate path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraints {
    pub max_latency_ms: Option<f64>,
    pub min_reliability: Option<f64>,
    pub min_bandwidth_gbps: Option<f64>,
    #[serde(default)]
    pub require_secure: bool,
    pub max_hops: Option<usize>,
}

impl Constraints {
    pub fn validate(&self) -> Result<()> {
        if let Some(lat) = self.max_latency_ms {
            if lat <= 0.0 || !lat.is_finite() {
                return Err(RouteError::InvalidRequest(format!(
                    "max_latency_ms must be positive, got {lat}"
                )));
            }
        }
        if let Some(rel) = self.min_reliability {
            if !(0.0..=1.0).contains(&rel) {
                return Err(RouteError::InvalidRequest(format!(
                    "min_reliability must be in [0, 1], got {rel}"
                )));
            }
        }
        if let Some(bw) = self.min_bandwidth_gbps {
            if bw <= 0.0 || !bw.is_finite() {
                return Err(RouteError::InvalidRequest(format!(
                    "min_bandwidth_gbps must be positive, got {bw}"
                )));
            }
        }
        Ok(())
    }
}

/// A route request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub source: NodeId,
    pub destination: NodeId,
    #[serde(default)]
    pub constraints: Constraints,
}

impl RouteRequest {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            constraints: Constraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Canonical cache key: fixed field order and fixed float
    /// formatting, so logically identical requests always collide.
    /// Node ids are length-prefixed; separator characters inside an id
    /// cannot alias a different endpoint split.
    pub fn fingerprint(&self) -> String {
        fn opt(v: Option<f64>) -> String {
            v.map(|x| format!("{x:.6}")).unwrap_or_else(|| "-".into())
        }

        format!(
            "{}:{}>{}:{}|lat:{}|rel:{}|bw:{}|sec:{}|hops:{}",
            self.source.len(),
            self.source,
            self.destination.len(),
            self.destination,
            opt(self.constraints.max_latency_ms),
            opt(self.constraints.min_reliability),
            opt(self.constraints.min_bandwidth_gbps),
            self.constraints.require_secure,
            self.constraints
                .max_hops
                .map(|h| h.to_string())
                .unwrap_or_else(|| "-".into()),
        )
    }
}

/// Per-edge diagnostics for a computed route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopBreakdown {
    pub link_id: LinkId,
    pub from: NodeId,
    pub to: NodeId,
    pub latency_ms: f64,
    pub reliability: f64,
    pub cost: f64,
}

/// A computed route with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
    pub path: Vec<NodeId>,
    pub links: Vec<LinkId>,
    pub total_cost: f64,
    pub total_latency_ms: f64,
    pub reliability: f64,
    pub hops: Vec<HopBreakdown>,
    pub satisfied: bool,
    pub cache_hit: bool,
    pub served_by: AdapterKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_order_independent() {
        let a = RouteRequest::new("GS-A", "GS-B").with_constraints(Constraints {
            max_latency_ms: Some(100.0),
            min_reliability: Some(0.9),
            ..Constraints::default()
        });
        // Same logical request built differently
        let mut c = Constraints::default();
        c.min_reliability = Some(0.9);
        c.max_latency_ms = Some(100.0);
        let b = RouteRequest::new("GS-A", "GS-B").with_constraints(c);

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_distinguishes_constraints() {
        let base = RouteRequest::new("GS-A", "GS-B");
        let secure = RouteRequest::new("GS-A", "GS-B").with_constraints(Constraints {
            require_secure: true,
            ..Constraints::default()
        });
        let reversed = RouteRequest::new("GS-B", "GS-A");

        assert_ne!(base.fingerprint(), secure.fingerprint());
        assert_ne!(base.fingerprint(), reversed.fingerprint());
    }

    #[test]
    fn fingerprint_separators_in_ids_do_not_alias() {
        let a = RouteRequest::new("A>B", "C");
        let b = RouteRequest::new("A", "B>C");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn constraints_validation_rejects_bad_bounds() {
        let bad_rel = Constraints {
            min_reliability: Some(1.5),
            ..Constraints::default()
        };
        assert!(matches!(
            bad_rel.validate(),
            Err(RouteError::InvalidRequest(_))
        ));

        let bad_lat = Constraints {
            max_latency_ms: Some(-1.0),
            ..Constraints::default()
        };
        assert!(bad_lat.validate().is_err());

        assert!(Constraints::default().validate().is_ok());
    }
}
