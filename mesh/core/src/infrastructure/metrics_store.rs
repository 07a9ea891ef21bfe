// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Per-agent rolling metrics: request counters, EMA latency, availability
//! and the composite health score written by the health checker.
//!
//! One reader-writer lock guards the whole map; probe writes take it
//! exclusive, discovery and routing reads take it shared.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::agent::AgentId;
use crate::domain::federation::AgentMetrics;

/// EMA smoothing factor for latency samples.
const LATENCY_ALPHA: f64 = 0.3;

/// Outcome of one agent health probe, as observed by the health checker.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOutcome {
    /// GET on `endpoint/health` answered 2xx.
    pub reachable: bool,
    /// Capability probe classification: no response 0.0, non-200 0.5,
    /// non-JSON 0.7, valid JSON 1.0.
    pub capability_score: f64,
    /// Probe round-trip in milliseconds.
    pub latency_ms: f64,
}

fn time_score(latency_ms: f64) -> f64 {
    if latency_ms <= 100.0 {
        1.0
    } else if latency_ms <= 1_000.0 {
        0.8
    } else if latency_ms <= 5_000.0 {
        0.6
    } else {
        0.2
    }
}

#[derive(Default)]
pub struct MetricsStore {
    metrics: RwLock<HashMap<AgentId, AgentMetrics>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one routing decision toward the agent.
    pub async fn record_decision(&self, agent_id: &AgentId) {
        let mut metrics = self.metrics.write().await;
        let entry = metrics
            .entry(agent_id.clone())
            .or_insert_with(|| AgentMetrics::new(agent_id.clone()));
        entry.total_requests += 1;
    }

    /// Fold one completed call back in: success/failure counters,
    /// availability and the latency EMA.
    pub async fn record_outcome(&self, agent_id: &AgentId, success: bool, latency_ms: Option<f64>) {
        let mut metrics = self.metrics.write().await;
        let entry = metrics
            .entry(agent_id.clone())
            .or_insert_with(|| AgentMetrics::new(agent_id.clone()));

        if success {
            entry.successful_requests += 1;
        } else {
            entry.failed_requests += 1;
        }
        let completed = entry.successful_requests + entry.failed_requests;
        if completed > 0 {
            entry.availability = entry.successful_requests as f64 / completed as f64;
            entry.error_rate = 1.0 - entry.availability;
        }
        if let Some(sample) = latency_ms {
            entry.last_latency_ms = sample;
            entry.avg_latency_ms = if entry.avg_latency_ms == 0.0 {
                sample
            } else {
                (1.0 - LATENCY_ALPHA) * entry.avg_latency_ms + LATENCY_ALPHA * sample
            };
        }
    }

    /// Fold one health-probe pass into the agent's entry.
    ///
    /// `healthScore = 0.4·reachable + 0.3·capabilityScore + 0.3·timeScore`.
    pub async fn apply_probe(&self, agent_id: &AgentId, outcome: ProbeOutcome) -> f64 {
        let mut metrics = self.metrics.write().await;
        let entry = metrics
            .entry(agent_id.clone())
            .or_insert_with(|| AgentMetrics::new(agent_id.clone()));

        let reachable = if outcome.reachable { 1.0 } else { 0.0 };
        let health = 0.4 * reachable + 0.3 * outcome.capability_score + 0.3 * time_score(outcome.latency_ms);

        entry.last_latency_ms = outcome.latency_ms;
        entry.avg_latency_ms = if entry.avg_latency_ms == 0.0 {
            outcome.latency_ms
        } else {
            (1.0 - LATENCY_ALPHA) * entry.avg_latency_ms + LATENCY_ALPHA * outcome.latency_ms
        };
        entry.health_score = health;
        entry.last_health_check = Utc::now();
        health
    }

    /// Overwrite an entry wholesale (tests and stat imports).
    pub async fn put(&self, metrics: AgentMetrics) {
        self.metrics.write().await.insert(metrics.agent_id.clone(), metrics);
    }

    pub async fn get(&self, agent_id: &AgentId) -> Option<AgentMetrics> {
        self.metrics.read().await.get(agent_id).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<AgentId, AgentMetrics> {
        self.metrics.read().await.clone()
    }

    pub async fn remove(&self, agent_id: &AgentId) {
        self.metrics.write().await.remove(agent_id);
    }

    pub async fn mean_health(&self) -> f64 {
        let metrics = self.metrics.read().await;
        if metrics.is_empty() {
            return 0.0;
        }
        metrics.values().map(|m| m.health_score).sum::<f64>() / metrics.len() as f64
    }

    /// Drop entries not probed within the retention period.
    pub async fn purge_stale(&self, retention: Duration) -> usize {
        let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::hours(1));
        let mut metrics = self.metrics.write().await;
        let before = metrics.len();
        metrics.retain(|_, m| m.last_health_check >= cutoff);
        before - metrics.len()
    }
}
