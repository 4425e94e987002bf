//! Resilience report generation and export
//!
//! Aggregates trial tallies into a report suitable for CI artifacts,
//! exported as pretty JSON or a Markdown summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runner::{HarnessConfig, OutageMode, TrialResult};

/// Full resilience run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceReport {
    pub generated_at: DateTime<Utc>,
    pub environment: String,
    pub config: HarnessConfig,
    pub trials: Vec<TrialResult>,
    pub summary: ReportSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_trials: u32,
    pub graceful_trials: u32,
    pub total_requests: u32,
    pub routed_primary: u32,
    pub routed_fallback: u32,
    pub cache_hits: u32,
    pub infeasible: u32,
    pub deadline_exceeded: u32,
    pub adapter_errors: u32,
    pub other_errors: u32,
    /// Share of requests that ended in a route or explicit
    /// infeasibility, 0..=1
    pub resolution_rate: f64,
    pub avg_request_us: u64,
    pub max_request_us: u64,
}

impl ResilienceReport {
    pub fn new(config: HarnessConfig, trials: Vec<TrialResult>) -> Self {
        let total_trials = trials.len() as u32;
        let graceful_trials = trials.iter().filter(|t| t.graceful()).count() as u32;
        let total_requests: u32 = trials.iter().map(|t| t.requests).sum();
        let routed_primary: u32 = trials.iter().map(|t| t.routed_primary).sum();
        let routed_fallback: u32 = trials.iter().map(|t| t.routed_fallback).sum();
        let cache_hits: u32 = trials.iter().map(|t| t.cache_hits).sum();
        let infeasible: u32 = trials.iter().map(|t| t.infeasible).sum();
        let deadline_exceeded: u32 = trials.iter().map(|t| t.deadline_exceeded).sum();
        let adapter_errors: u32 = trials.iter().map(|t| t.adapter_errors).sum();
        let other_errors: u32 = trials.iter().map(|t| t.other_errors).sum();

        let resolved = routed_primary + routed_fallback + infeasible;
        let resolution_rate = if total_requests > 0 {
            resolved as f64 / total_requests as f64
        } else {
            0.0
        };

        let total_us: u64 = trials.iter().map(|t| t.total_request_us).sum();
        let avg_request_us = if total_requests > 0 {
            total_us / total_requests as u64
        } else {
            0
        };
        let max_request_us = trials.iter().map(|t| t.max_request_us).max().unwrap_or(0);

        Self {
            generated_at: Utc::now(),
            environment: environment_name(),
            config,
            trials,
            summary: ReportSummary {
                total_trials,
                graceful_trials,
                total_requests,
                routed_primary,
                routed_fallback,
                cache_hits,
                infeasible,
                deadline_exceeded,
                adapter_errors,
                other_errors,
                resolution_rate,
                avg_request_us,
                max_request_us,
            },
        }
    }

    /// Every trial degraded gracefully
    pub fn passed(&self) -> bool {
        self.summary.graceful_trials == self.summary.total_trials
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn to_markdown(&self) -> String {
        let s = &self.summary;
        let mut md = String::new();

        md.push_str("# Mesh Resilience Report\n\n");
        md.push_str(&format!(
            "**Date:** {}\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        md.push_str(&format!("**Environment:** {}\n", self.environment));
        md.push_str(&format!(
            "**Config:** {} trials x {} requests, {} node / {} link failures, seed {}\n\n",
            self.config.trials,
            self.config.requests_per_trial,
            self.config.node_failures,
            self.config.link_failures,
            self.config.seed
        ));

        md.push_str("## Summary\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!(
            "| Trials | {} ({} graceful) |\n",
            s.total_trials, s.graceful_trials
        ));
        md.push_str(&format!("| Requests | {} |\n", s.total_requests));
        md.push_str(&format!(
            "| Routed | {} primary, {} fallback, {} cache hits |\n",
            s.routed_primary, s.routed_fallback, s.cache_hits
        ));
        md.push_str(&format!("| Infeasible | {} |\n", s.infeasible));
        md.push_str(&format!(
            "| Errors | {} adapter, {} deadline, {} other |\n",
            s.adapter_errors, s.deadline_exceeded, s.other_errors
        ));
        md.push_str(&format!(
            "| Resolution rate | {:.2}% |\n",
            s.resolution_rate * 100.0
        ));
        md.push_str(&format!(
            "| Request latency | avg {} us, max {} us |\n\n",
            s.avg_request_us, s.max_request_us
        ));

        md.push_str("## Trials\n\n");
        md.push_str("| # | Outage | Topology | Faults | Routed | Infeasible | Errors | Status |\n");
        md.push_str("|---|--------|----------|--------|--------|------------|--------|--------|\n");
        for t in &self.trials {
            let outage = match t.outage {
                OutageMode::None => "-",
                OutageMode::GraphStoreDown => "graph down",
                OutageMode::GraphStoreSlow => "graph slow",
            };
            md.push_str(&format!(
                "| {} | {} | {}n/{}l | {}n/{}l | {} | {} | {} | {} |\n",
                t.trial,
                outage,
                t.nodes,
                t.links,
                t.failed_nodes.len(),
                t.failed_links.len(),
                t.routed(),
                t.infeasible,
                t.adapter_errors + t.deadline_exceeded + t.other_errors,
                if t.graceful() { "ok" } else { "FAIL" }
            ));
        }

        let degraded: Vec<&TrialResult> = self.trials.iter().filter(|t| !t.graceful()).collect();
        if !degraded.is_empty() {
            md.push_str("\n## Non-graceful trials\n\n");
            for t in degraded {
                md.push_str(&format!(
                    "- trial {}: nodes down {:?}, links down {:?}, {} adapter errors, {} other\n",
                    t.trial, t.failed_nodes, t.failed_links, t.adapter_errors, t.other_errors
                ));
            }
        }

        md
    }

    pub fn print(&self) {
        println!("{}", self.to_markdown());
    }
}

fn environment_name() -> String {
    if std::env::var("CI").is_ok() {
        "CI".to_string()
    } else {
        "local".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trial(trial: u32, errors: u32) -> TrialResult {
        let mut t = TrialResult {
            trial,
            outage: OutageMode::None,
            nodes: 10,
            links: 14,
            failed_nodes: vec!["RELAY-01".into()],
            failed_links: vec![],
            requests: 20,
            routed_primary: 15,
            routed_fallback: 2,
            cache_hits: 3,
            infeasible: 3 - errors.min(3),
            deadline_exceeded: 0,
            adapter_errors: 0,
            other_errors: errors,
            max_request_us: 900,
            total_request_us: 8_000,
        };
        t.requests = t.routed() + t.infeasible + t.other_errors;
        t
    }

    #[test]
    fn summary_aggregates_trials() {
        let trials = vec![sample_trial(0, 0), sample_trial(1, 0)];
        let report = ResilienceReport::new(HarnessConfig::default(), trials);

        assert!(report.passed());
        assert_eq!(report.summary.total_trials, 2);
        assert_eq!(report.summary.routed_primary, 30);
        assert_eq!(report.summary.routed_fallback, 4);
        assert!((report.summary.resolution_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn silent_errors_fail_the_report() {
        let trials = vec![sample_trial(0, 0), sample_trial(1, 2)];
        let report = ResilienceReport::new(HarnessConfig::default(), trials);

        assert!(!report.passed());
        assert_eq!(report.summary.graceful_trials, 1);
        assert!(report.summary.resolution_rate < 1.0);
    }

    #[test]
    fn exports_do_not_panic() {
        let report = ResilienceReport::new(HarnessConfig::default(), vec![sample_trial(0, 0)]);
        assert!(report.to_json().contains("resolution_rate"));
        assert!(report.to_markdown().contains("# Mesh Resilience Report"));
    }
}
