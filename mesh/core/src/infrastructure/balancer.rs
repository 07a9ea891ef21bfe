// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Load Balancer
//!
//! A registry of provider-selection strategies keyed by [`BalanceMode`].
//! Strategies that carry state (the round-robin cursor, weighted-round-robin
//! current weights, the adaptive outcome window) own their own small locks;
//! selection never touches the registry or metrics locks.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::domain::agent::AgentId;
use crate::domain::federation::{AgentMetrics, BalanceMode, RoutePriority, RoutingContext};

/// One provider-selection policy. `None` means the candidate set was empty.
pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(
        &self,
        candidates: &[AgentId],
        metrics: &HashMap<AgentId, AgentMetrics>,
        context: &RoutingContext,
    ) -> Option<AgentId>;
}

fn health_of(metrics: &HashMap<AgentId, AgentMetrics>, id: &AgentId) -> f64 {
    metrics.get(id).map(|m| m.health_score).unwrap_or(1.0)
}

/// Best-performance composite, shared by three strategies.
///
/// Latency normalizes against a 5 s ceiling, load inverts the load score;
/// both clamp at zero so one pathological axis cannot push the composite
/// negative.
fn best_performance_score(
    metrics: &HashMap<AgentId, AgentMetrics>,
    id: &AgentId,
    priority: RoutePriority,
) -> f64 {
    let default = AgentMetrics::new(id.clone());
    let m = metrics.get(id).unwrap_or(&default);

    let success = m.availability;
    let latency = (1.0 - m.avg_latency_ms / 5_000.0).max(0.0);
    let health = m.health_score;
    let load = (1.0 - m.load_score).max(0.0);
    let availability = m.availability;

    let (w_s, w_l, w_h, w_ld, w_a) = match priority {
        RoutePriority::Critical => (0.30, 0.30, 0.20, 0.10, 0.10),
        RoutePriority::High => (0.20, 0.35, 0.15, 0.15, 0.15),
        RoutePriority::Normal | RoutePriority::Low => (0.20, 0.20, 0.20, 0.20, 0.20),
    };
    w_s * success + w_l * latency + w_h * health + w_ld * load + w_a * availability
}

/// Healthy-first rotation by monotonic counter.
#[derive(Default)]
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl SelectionStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn select(
        &self,
        candidates: &[AgentId],
        metrics: &HashMap<AgentId, AgentMetrics>,
        _context: &RoutingContext,
    ) -> Option<AgentId> {
        if candidates.is_empty() {
            return None;
        }
        let healthy: Vec<&AgentId> = candidates
            .iter()
            .filter(|id| health_of(metrics, id) > 0.5)
            .collect();
        let pool: Vec<&AgentId> = if healthy.is_empty() {
            candidates.iter().collect()
        } else {
            healthy
        };
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % pool.len();
        Some(pool[index].clone())
    }
}

/// Ascending by `load + 0.5·(1 − health)`; ties break toward the higher
/// health score. Agents without metrics count as load 0.5, health 1.0.
#[derive(Default)]
pub struct LeastLoadedStrategy;

impl SelectionStrategy for LeastLoadedStrategy {
    fn name(&self) -> &'static str {
        "least-loaded"
    }

    fn select(
        &self,
        candidates: &[AgentId],
        metrics: &HashMap<AgentId, AgentMetrics>,
        _context: &RoutingContext,
    ) -> Option<AgentId> {
        candidates
            .iter()
            .map(|id| {
                let (load, health) = metrics
                    .get(id)
                    .map(|m| (m.load_score, m.health_score))
                    .unwrap_or((0.5, 1.0));
                (id, load + 0.5 * (1.0 - health), health)
            })
            .min_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal))
            })
            .map(|(id, _, _)| id.clone())
    }
}

struct WrrEntry {
    weight: i64,
    current: i64,
}

/// Classic smooth weighted round-robin. Weights derive lazily from the
/// metrics snapshot at first sight of a candidate:
/// `round(10·(1−errorRate)·availability·health)`, floored at 1.
#[derive(Default)]
pub struct WeightedRoundRobinStrategy {
    state: Mutex<HashMap<AgentId, WrrEntry>>,
}

impl SelectionStrategy for WeightedRoundRobinStrategy {
    fn name(&self) -> &'static str {
        "weighted-round-robin"
    }

    fn select(
        &self,
        candidates: &[AgentId],
        metrics: &HashMap<AgentId, AgentMetrics>,
        _context: &RoutingContext,
    ) -> Option<AgentId> {
        if candidates.is_empty() {
            return None;
        }
        let mut state = self.state.lock();

        let mut total_weight = 0i64;
        for id in candidates {
            let entry = state.entry(id.clone()).or_insert_with(|| {
                let weight = metrics
                    .get(id)
                    .map(|m| (10.0 * (1.0 - m.error_rate) * m.availability * m.health_score).round() as i64)
                    .unwrap_or(10)
                    .max(1);
                WrrEntry { weight, current: 0 }
            });
            entry.current += entry.weight;
            total_weight += entry.weight;
        }

        let winner = candidates
            .iter()
            .max_by_key(|id| state.get(*id).map(|e| e.current).unwrap_or(0))?
            .clone();
        if let Some(entry) = state.get_mut(&winner) {
            entry.current -= total_weight;
        }
        Some(winner)
    }
}

/// Highest best-performance composite wins.
#[derive(Default)]
pub struct BestPerformanceStrategy;

impl SelectionStrategy for BestPerformanceStrategy {
    fn name(&self) -> &'static str {
        "best-performance"
    }

    fn select(
        &self,
        candidates: &[AgentId],
        metrics: &HashMap<AgentId, AgentMetrics>,
        context: &RoutingContext,
    ) -> Option<AgentId> {
        candidates
            .iter()
            .max_by(|a, b| {
                best_performance_score(metrics, a, context.priority)
                    .partial_cmp(&best_performance_score(metrics, b, context.priority))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }
}

/// Affinity (preferred agent +0.5; region match +0.3, or +0.1 when a
/// region is set but does not match) blended with best-performance at
/// 0.6 / 0.4.
#[derive(Default)]
pub struct AffinityStrategy;

fn affinity_score(metrics: &HashMap<AgentId, AgentMetrics>, id: &AgentId, context: &RoutingContext) -> f64 {
    let mut score = 0.0;
    if context.preferred_agents.contains(id) {
        score += 0.5;
    }
    if let Some(region) = &context.region {
        let agent_region = metrics.get(id).and_then(|m| m.geographic_region.clone());
        score += match agent_region {
            Some(r) if &r == region => 0.3,
            _ => 0.1,
        };
    }
    score
}

impl SelectionStrategy for AffinityStrategy {
    fn name(&self) -> &'static str {
        "affinity-based"
    }

    fn select(
        &self,
        candidates: &[AgentId],
        metrics: &HashMap<AgentId, AgentMetrics>,
        context: &RoutingContext,
    ) -> Option<AgentId> {
        candidates
            .iter()
            .max_by(|a, b| {
                let score_a = 0.6 * affinity_score(metrics, a, context)
                    + 0.4 * best_performance_score(metrics, a, context.priority);
                let score_b = 0.6 * affinity_score(metrics, b, context)
                    + 0.4 * best_performance_score(metrics, b, context.priority);
                score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    latency_ms: f64,
}

const ADAPTIVE_WINDOW: usize = 50;

/// Best-performance biased by a rolling window of observed call outcomes.
///
/// The bias is the recent success-rate delta against the long-run
/// availability plus the relative latency improvement, clamped to ±0.2.
/// Outcomes arrive from `toolResult` acknowledgments via
/// [`AdaptiveStrategy::record_outcome`].
#[derive(Default)]
pub struct AdaptiveStrategy {
    history: Mutex<HashMap<AgentId, VecDeque<Outcome>>>,
}

impl AdaptiveStrategy {
    pub fn record_outcome(&self, id: &AgentId, success: bool, latency_ms: f64) {
        let mut history = self.history.lock();
        let window = history.entry(id.clone()).or_default();
        if window.len() == ADAPTIVE_WINDOW {
            window.pop_front();
        }
        window.push_back(Outcome { success, latency_ms });
    }

    fn bias(&self, metrics: &HashMap<AgentId, AgentMetrics>, id: &AgentId) -> f64 {
        let history = self.history.lock();
        let Some(window) = history.get(id).filter(|w| !w.is_empty()) else {
            return 0.0;
        };
        let default = AgentMetrics::new(id.clone());
        let m = metrics.get(id).unwrap_or(&default);

        let recent_success =
            window.iter().filter(|o| o.success).count() as f64 / window.len() as f64;
        let success_delta = recent_success - m.availability;

        let recent_latency =
            window.iter().map(|o| o.latency_ms).sum::<f64>() / window.len() as f64;
        let latency_gain = if m.avg_latency_ms > f64::EPSILON {
            (m.avg_latency_ms - recent_latency) / m.avg_latency_ms
        } else {
            0.0
        };

        (0.5 * success_delta + 0.5 * latency_gain).clamp(-0.2, 0.2)
    }
}

impl SelectionStrategy for AdaptiveStrategy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn select(
        &self,
        candidates: &[AgentId],
        metrics: &HashMap<AgentId, AgentMetrics>,
        context: &RoutingContext,
    ) -> Option<AgentId> {
        candidates
            .iter()
            .max_by(|a, b| {
                let score_a =
                    best_performance_score(metrics, a, context.priority) + self.bias(metrics, a);
                let score_b =
                    best_performance_score(metrics, b, context.priority) + self.bias(metrics, b);
                score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
    }
}

/// Strategy registry keyed by mode.
pub struct LoadBalancer {
    strategies: HashMap<BalanceMode, Box<dyn SelectionStrategy>>,
    adaptive: std::sync::Arc<AdaptiveStrategy>,
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

struct SharedAdaptive(std::sync::Arc<AdaptiveStrategy>);

impl SelectionStrategy for SharedAdaptive {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn select(
        &self,
        candidates: &[AgentId],
        metrics: &HashMap<AgentId, AgentMetrics>,
        context: &RoutingContext,
    ) -> Option<AgentId> {
        self.0.select(candidates, metrics, context)
    }
}

impl LoadBalancer {
    pub fn new() -> Self {
        let adaptive = std::sync::Arc::new(AdaptiveStrategy::default());
        let mut strategies: HashMap<BalanceMode, Box<dyn SelectionStrategy>> = HashMap::new();
        strategies.insert(BalanceMode::RoundRobin, Box::new(RoundRobinStrategy::default()));
        strategies.insert(BalanceMode::LeastLoaded, Box::new(LeastLoadedStrategy));
        strategies.insert(
            BalanceMode::WeightedRoundRobin,
            Box::new(WeightedRoundRobinStrategy::default()),
        );
        strategies.insert(BalanceMode::BestPerformance, Box::new(BestPerformanceStrategy));
        strategies.insert(BalanceMode::AffinityBased, Box::new(AffinityStrategy));
        strategies.insert(BalanceMode::Adaptive, Box::new(SharedAdaptive(adaptive.clone())));
        Self { strategies, adaptive }
    }

    pub fn select(
        &self,
        mode: BalanceMode,
        candidates: &[AgentId],
        metrics: &HashMap<AgentId, AgentMetrics>,
        context: &RoutingContext,
    ) -> Option<AgentId> {
        self.strategies.get(&mode)?.select(candidates, metrics, context)
    }

    pub fn strategy_name(&self, mode: BalanceMode) -> &'static str {
        self.strategies.get(&mode).map(|s| s.name()).unwrap_or("unknown")
    }

    /// Feed a call outcome into the adaptive window.
    pub fn record_outcome(&self, id: &AgentId, success: bool, latency_ms: f64) {
        self.adaptive.record_outcome(id, success, latency_ms);
    }
}
