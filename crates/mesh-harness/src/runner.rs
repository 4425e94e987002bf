//! Resilience trial runner
//!
//! Each trial samples a random mesh, degrades it through the public
//! fault-injection hooks, then fires a batch of route requests and
//! tallies the outcomes. Adapter outages are rotated across trials so
//! the fallback path gets exercised alongside the healthy one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use proptest::strategy::{Strategy, ValueTree};
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};
use serde::{Deserialize, Serialize};

use mesh_core::{NetworkHandle, NodeStatus};
use mesh_routing::adapter::{FaultMode, GraphStoreAdapter, RelationalAdapter, TopologyAdapter};
use mesh_routing::cache::RouteCache;
use mesh_routing::engine::{EngineConfig, RoutingEngine};
use mesh_routing::{AdapterKind, RouteError, RouteRequest};

use crate::generators::{mesh_network, station_pair};

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Number of independent trials (one topology each)
    pub trials: u32,
    /// Route requests fired per trial
    pub requests_per_trial: u32,
    /// Relays forced offline per trial
    pub node_failures: usize,
    /// Links forced inactive per trial
    pub link_failures: usize,
    /// Random seed (0 = nondeterministic)
    pub seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            trials: 25,
            requests_per_trial: 40,
            node_failures: 1,
            link_failures: 2,
            seed: 0,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trials(mut self, n: u32) -> Self {
        self.trials = n;
        self
    }

    pub fn requests_per_trial(mut self, n: u32) -> Self {
        self.requests_per_trial = n;
        self
    }

    pub fn node_failures(mut self, n: usize) -> Self {
        self.node_failures = n;
        self
    }

    pub fn link_failures(mut self, n: usize) -> Self {
        self.link_failures = n;
        self
    }

    pub fn seed(mut self, s: u64) -> Self {
        self.seed = s;
        self
    }
}

/// Which store outage a trial simulates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutageMode {
    None,
    GraphStoreDown,
    GraphStoreSlow,
}

impl OutageMode {
    fn for_trial(trial: u32) -> Self {
        match trial % 4 {
            1 => OutageMode::GraphStoreDown,
            3 => OutageMode::GraphStoreSlow,
            _ => OutageMode::None,
        }
    }
}

/// Outcome tally for one trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial: u32,
    pub outage: OutageMode,
    pub nodes: usize,
    pub links: usize,
    pub failed_nodes: Vec<String>,
    pub failed_links: Vec<String>,
    pub requests: u32,
    /// Served from the graph store
    pub routed_primary: u32,
    /// Served from the relational fallback
    pub routed_fallback: u32,
    pub cache_hits: u32,
    pub infeasible: u32,
    pub deadline_exceeded: u32,
    pub adapter_errors: u32,
    pub other_errors: u32,
    pub max_request_us: u64,
    pub total_request_us: u64,
}

impl TrialResult {
    fn new(trial: u32, outage: OutageMode, nodes: usize, links: usize) -> Self {
        Self {
            trial,
            outage,
            nodes,
            links,
            failed_nodes: Vec::new(),
            failed_links: Vec::new(),
            requests: 0,
            routed_primary: 0,
            routed_fallback: 0,
            cache_hits: 0,
            infeasible: 0,
            deadline_exceeded: 0,
            adapter_errors: 0,
            other_errors: 0,
            max_request_us: 0,
            total_request_us: 0,
        }
    }

    pub fn routed(&self) -> u32 {
        self.routed_primary + self.routed_fallback
    }

    pub fn avg_request_us(&self) -> u64 {
        if self.requests == 0 {
            0
        } else {
            self.total_request_us / self.requests as u64
        }
    }

    /// A trial degrades gracefully when every request resolved to a
    /// route or an explicit infeasibility, with no silent errors
    /// outside the simulated outage modes.
    pub fn graceful(&self) -> bool {
        match self.outage {
            OutageMode::None => self.adapter_errors == 0 && self.other_errors == 0,
            _ => self.other_errors == 0,
        }
    }
}

/// Drives trials against a fresh engine per topology
pub struct ResilienceRunner {
    config: HarnessConfig,
    sampler: TestRunner,
    results: Vec<TrialResult>,
}

impl ResilienceRunner {
    pub fn new(config: HarnessConfig) -> Self {
        let sampler = if config.seed == 0 {
            TestRunner::new(Config::default())
        } else {
            let mut seed_bytes = [0u8; 32];
            seed_bytes[..8].copy_from_slice(&config.seed.to_le_bytes());
            TestRunner::new_with_rng(
                Config::default(),
                TestRng::from_seed(RngAlgorithm::ChaCha, &seed_bytes),
            )
        };
        Self {
            config,
            sampler,
            results: Vec::new(),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(HarnessConfig::default())
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    /// Run all configured trials
    pub async fn run(&mut self) -> &[TrialResult] {
        for trial in 0..self.config.trials {
            let result = self.run_trial(trial).await;
            tracing::info!(
                trial,
                outage = ?result.outage,
                routed = result.routed(),
                infeasible = result.infeasible,
                errors = result.adapter_errors + result.other_errors,
                "trial complete"
            );
            self.results.push(result);
        }
        &self.results
    }

    async fn run_trial(&mut self, trial: u32) -> TrialResult {
        let state = self.sample(mesh_network());
        let stats = state.stats();
        let stations = stats.ground_stations;

        let network = NetworkHandle::new(state);
        let outage = OutageMode::for_trial(trial);
        let mut result =
            TrialResult::new(trial, outage, stats.total_nodes, stats.total_links);

        self.inject_topology_faults(&network, &mut result);

        let graph = Arc::new(GraphStoreAdapter::new(network.clone()));
        let relational = Arc::new(RelationalAdapter::new(network.clone()));
        match outage {
            OutageMode::None => {}
            OutageMode::GraphStoreDown => graph.set_fault(FaultMode::Unavailable),
            OutageMode::GraphStoreSlow => {
                graph.set_fault(FaultMode::Slow(Duration::from_millis(400)))
            }
        }

        let engine_config = EngineConfig {
            adapter_timeout: Duration::from_millis(250),
            request_deadline: Duration::from_secs(2),
            ..EngineConfig::default()
        };
        let engine = RoutingEngine::new(
            graph.clone() as Arc<dyn TopologyAdapter>,
            relational.clone() as Arc<dyn TopologyAdapter>,
            RouteCache::new(engine_config.cache_ttl),
            engine_config,
        );

        for _ in 0..self.config.requests_per_trial {
            let (src, dst) = self.sample(station_pair(stations));
            let request = RouteRequest::new(&src, &dst);

            let start = Instant::now();
            let outcome = engine.route(&request).await;
            let elapsed_us = start.elapsed().as_micros() as u64;

            result.requests += 1;
            result.total_request_us += elapsed_us;
            result.max_request_us = result.max_request_us.max(elapsed_us);

            match outcome {
                Ok(route) => {
                    if route.cache_hit {
                        result.cache_hits += 1;
                    }
                    match route.served_by {
                        AdapterKind::GraphStore => result.routed_primary += 1,
                        AdapterKind::RelationalFallback => result.routed_fallback += 1,
                    }
                }
                Err(RouteError::Infeasible { .. }) => result.infeasible += 1,
                Err(RouteError::RequestDeadlineExceeded) => result.deadline_exceeded += 1,
                Err(RouteError::AdapterTimeout { .. })
                | Err(RouteError::AdapterUnavailable { .. }) => result.adapter_errors += 1,
                Err(err) => {
                    tracing::warn!(%src, %dst, %err, "unexpected route error");
                    result.other_errors += 1;
                }
            }
        }

        result
    }

    /// Force random relays offline and random links inactive, recording
    /// what was hit so the report can explain infeasible spikes.
    fn inject_topology_faults(&mut self, network: &NetworkHandle, result: &mut TrialResult) {
        let snapshot = network.snapshot();

        // Sorted so a fixed seed picks the same targets every run
        let mut relays: Vec<String> = snapshot
            .nodes()
            .filter(|n| n.is_relay())
            .map(|n| n.id.clone())
            .collect();
        relays.sort();
        for _ in 0..self.config.node_failures.min(relays.len().saturating_sub(1)) {
            let idx = self.sample(0..relays.len());
            let id = &relays[idx];
            if result.failed_nodes.contains(id) {
                continue;
            }
            network
                .force_node_status(id, NodeStatus::Offline)
                .expect("sampled relay exists");
            result.failed_nodes.push(id.clone());
        }

        let mut links: Vec<String> = snapshot.links().map(|l| l.id.clone()).collect();
        links.sort();
        for _ in 0..self.config.link_failures.min(links.len() / 2) {
            let idx = self.sample(0..links.len());
            let id = &links[idx];
            if result.failed_links.contains(id) {
                continue;
            }
            network
                .force_link_active(id, false)
                .expect("sampled link exists");
            result.failed_links.push(id.clone());
        }
    }

    fn sample<S: Strategy>(&mut self, strategy: S) -> S::Value {
        strategy
            .new_tree(&mut self.sampler)
            .expect("strategy never rejects")
            .current()
    }
}
