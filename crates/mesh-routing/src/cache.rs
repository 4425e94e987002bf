//! Route cache with lazy staleness eviction
//!
//! Keys are canonical request fingerprints; values are whole
//! [`RouteResult`]s replaced wholesale (single-key atomic,
//! last-writer-wins). A hit is revalidated against the current
//! node/link status before being returned: the telemetry producer does
//! not signal updates, so staleness is checked at read time, never at
//! write time. Any offline hop evicts the entry silently and reports a
//! miss.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::adapter::TopologyAdapter;
use crate::{RouteRequest, RouteResult};

struct CacheEntry {
    result: RouteResult,
    expires_at: Instant,
}

/// Shared route cache
pub struct RouteCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl RouteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a revalidated result for this request.
    ///
    /// Expired entries and entries whose path has gone stale are
    /// evicted. If the adapter cannot answer the revalidation queries,
    /// the entry is kept but a miss is reported; the caller recomputes.
    pub async fn get(
        &self,
        request: &RouteRequest,
        adapter: &dyn TopologyAdapter,
    ) -> Option<RouteResult> {
        let key = request.fingerprint();
        let (result, expires_at) = {
            let entries = self.entries.read().expect("cache lock poisoned");
            let entry = entries.get(&key)?;
            (entry.result.clone(), entry.expires_at)
        };

        if expires_at <= Instant::now() {
            self.evict(&key);
            return None;
        }

        for node_id in &result.path {
            match adapter.node(node_id).await {
                Ok(node) if !node.is_offline() => {}
                Ok(_) => {
                    tracing::debug!(key = %key, node = %node_id, "cached path stale, evicting");
                    self.evict(&key);
                    return None;
                }
                Err(_) => return None,
            }
        }
        for link_id in &result.links {
            match adapter.link(link_id).await {
                Ok(link) if link.active && link.bandwidth_gbps > 0.0 => {}
                Ok(_) => {
                    tracing::debug!(key = %key, link = %link_id, "cached path stale, evicting");
                    self.evict(&key);
                    return None;
                }
                Err(_) => return None,
            }
        }

        let mut hit = result;
        hit.cache_hit = true;
        Some(hit)
    }

    pub fn set(&self, request: &RouteRequest, result: RouteResult) {
        let mut stored = result;
        stored.cache_hit = false;
        self.entries.write().expect("cache lock poisoned").insert(
            request.fingerprint(),
            CacheEntry {
                result: stored,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every entry whose path traverses the given node or link
    pub fn invalidate_involving(&self, id: &str) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| {
            !entry.result.path.iter().any(|n| n == id)
                && !entry.result.links.iter().any(|l| l == id)
        });
        let dropped = before - entries.len();
        if dropped > 0 {
            tracing::debug!(id = %id, dropped, "invalidated cached routes");
        }
    }

    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .expect("cache lock poisoned")
            .retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict(&self, key: &str) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::GraphStoreAdapter;
    use crate::AdapterKind;
    use mesh_core::{Link, NetworkHandle, NetworkState, Node, NodeStatus};

    fn network() -> NetworkHandle {
        let mut state = NetworkState::new();
        state.upsert_node(Node::ground_station("GS-A", "A", 0.0, 0.0, 1));
        state.upsert_node(Node::relay("R-1", "Relay", 0.0, 10.0, 8_000.0));
        state
            .upsert_link(Link::new("L-1", "GS-A", "R-1", 10.0, 10.0, 0.99))
            .unwrap();
        NetworkHandle::new(state)
    }

    fn result_over(path: &[&str], links: &[&str]) -> RouteResult {
        RouteResult {
            path: path.iter().map(|s| s.to_string()).collect(),
            links: links.iter().map(|s| s.to_string()).collect(),
            total_cost: 110.0,
            total_latency_ms: 10.0,
            reliability: 0.99,
            hops: Vec::new(),
            satisfied: true,
            cache_hit: false,
            served_by: AdapterKind::GraphStore,
        }
    }

    #[tokio::test]
    async fn hit_reports_cache_provenance() {
        let network = network();
        let adapter = GraphStoreAdapter::new(network);
        let cache = RouteCache::new(Duration::from_secs(30));
        let request = RouteRequest::new("GS-A", "R-1");

        cache.set(&request, result_over(&["GS-A", "R-1"], &["L-1"]));

        let hit = cache.get(&request, &adapter).await.expect("hit");
        assert!(hit.cache_hit);
        assert_eq!(hit.path, vec!["GS-A", "R-1"]);
    }

    #[tokio::test]
    async fn entries_expire() {
        let network = network();
        let adapter = GraphStoreAdapter::new(network);
        let cache = RouteCache::new(Duration::from_millis(10));
        let request = RouteRequest::new("GS-A", "R-1");

        cache.set(&request, result_over(&["GS-A", "R-1"], &["L-1"]));
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert!(cache.get(&request, &adapter).await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn offline_node_on_path_evicts_entry() {
        let network = network();
        let adapter = GraphStoreAdapter::new(network.clone());
        let cache = RouteCache::new(Duration::from_secs(30));
        let request = RouteRequest::new("GS-A", "R-1");

        cache.set(&request, result_over(&["GS-A", "R-1"], &["L-1"]));
        network.force_node_status("R-1", NodeStatus::Offline).unwrap();

        assert!(cache.get(&request, &adapter).await.is_none());
        assert!(cache.is_empty(), "stale entry must be evicted");
    }

    #[tokio::test]
    async fn downed_link_on_path_evicts_entry() {
        let network = network();
        let adapter = GraphStoreAdapter::new(network.clone());
        let cache = RouteCache::new(Duration::from_secs(30));
        let request = RouteRequest::new("GS-A", "R-1");

        cache.set(&request, result_over(&["GS-A", "R-1"], &["L-1"]));
        network.force_link_active("L-1", false).unwrap();

        assert!(cache.get(&request, &adapter).await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn purge_drops_only_expired_entries() {
        let cache = RouteCache::new(Duration::from_millis(10));
        let old = RouteRequest::new("GS-A", "R-1");
        cache.set(&old, result_over(&["GS-A", "R-1"], &["L-1"]));
        tokio::time::sleep(Duration::from_millis(25)).await;

        let fresh = RouteRequest::new("R-1", "GS-A");
        cache.set(&fresh, result_over(&["R-1", "GS-A"], &["L-1"]));
        assert_eq!(cache.len(), 2);

        cache.purge_expired();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_involving_matches_nodes_and_links() {
        let cache = RouteCache::new(Duration::from_secs(30));
        let a = RouteRequest::new("GS-A", "R-1");
        let b = RouteRequest::new("R-1", "GS-A");
        cache.set(&a, result_over(&["GS-A", "R-1"], &["L-1"]));
        cache.set(&b, result_over(&["R-1", "GS-A"], &["L-9"]));
        assert_eq!(cache.len(), 2);

        cache.invalidate_involving("L-9");
        assert_eq!(cache.len(), 1);

        cache.invalidate_involving("R-1");
        assert!(cache.is_empty());
    }
}
