// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Federation Domain Types
//!
//! Value objects for the federation layer: peer-broker records, per-agent
//! rolling metrics, cached tool routes, load-balancing modes and the result
//! shapes the federation manager returns.
//!
//! `FederatedBroker` and `AgentRecord` refer to each other only by id; the
//! federation manager owns all maps and background tasks read through
//! shared references.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::tool::DiscoveredTool;

/// Health status of a peer broker, driven by the health checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerStatus {
    Active,
    Degraded,
    Unreachable,
    Maintenance,
}

/// A peer broker in the trust domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedBroker {
    pub id: String,
    pub endpoint: String,
    pub status: BrokerStatus,
    pub last_seen: DateTime<Utc>,
    /// Most recent probe round-trip in milliseconds.
    pub response_time_ms: f64,
    /// EMA reputation signal on [0, 1].
    pub trust_score: f64,
    pub tool_count: usize,
    pub load_score: f64,
}

impl FederatedBroker {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            status: BrokerStatus::Active,
            last_seen: Utc::now(),
            response_time_ms: 0.0,
            trust_score: 1.0,
            tool_count: 0,
            load_score: 0.0,
        }
    }
}

/// Rolling per-agent counters maintained by routing decisions and health
/// probes. All scores live on [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    pub agent_id: AgentId,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Exponential moving average latency in milliseconds (α = 0.3).
    pub avg_latency_ms: f64,
    pub last_latency_ms: f64,
    pub error_rate: f64,
    pub availability: f64,
    pub health_score: f64,
    pub load_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geographic_region: Option<String>,
    pub last_health_check: DateTime<Utc>,
}

impl AgentMetrics {
    pub fn new(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            avg_latency_ms: 0.0,
            last_latency_ms: 0.0,
            error_rate: 0.0,
            availability: 1.0,
            health_score: 1.0,
            load_score: 0.0,
            geographic_region: None,
            last_health_check: Utc::now(),
        }
    }
}

/// Provider-selection strategy keys understood by the load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalanceMode {
    RoundRobin,
    LeastLoaded,
    WeightedRoundRobin,
    BestPerformance,
    AffinityBased,
    Adaptive,
}

impl std::fmt::Display for BalanceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RoundRobin => "round-robin",
            Self::LeastLoaded => "least-loaded",
            Self::WeightedRoundRobin => "weighted-round-robin",
            Self::BestPerformance => "best-performance",
            Self::AffinityBased => "affinity-based",
            Self::Adaptive => "adaptive",
        };
        f.write_str(s)
    }
}

/// Caller-declared urgency; adjusts ranking weights and selection scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

/// Per-call context threaded through discovery, ranking and selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingContext {
    #[serde(default)]
    pub preferred_agents: Vec<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub priority: RoutePriority,
    /// Per-user ranking weight overrides; replaces the defaults wholesale
    /// when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_overrides: Option<RankWeights>,
}

/// Weights over the five ranking sub-scores. Renormalized to sum to 1
/// after priority modifiers are applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankWeights {
    pub performance: f64,
    pub reliability: f64,
    pub latency: f64,
    pub cost: f64,
    pub affinity: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            performance: 0.25,
            reliability: 0.25,
            latency: 0.20,
            cost: 0.15,
            affinity: 0.15,
        }
    }
}

impl RankWeights {
    pub fn sum(&self) -> f64 {
        self.performance + self.reliability + self.latency + self.cost + self.affinity
    }

    /// Scale so the weights sum to 1 (no-op for a zero sum).
    pub fn normalized(mut self) -> Self {
        let sum = self.sum();
        if sum > f64::EPSILON {
            self.performance /= sum;
            self.reliability /= sum;
            self.latency /= sum;
            self.cost /= sum;
            self.affinity /= sum;
        }
        self
    }
}

/// The five sub-scores produced by the ranking engine, each on [0, 1].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolScores {
    pub performance: f64,
    pub reliability: f64,
    pub latency: f64,
    pub cost: f64,
    pub affinity: f64,
}

/// One ranked discovery result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedTool {
    pub agent_id: AgentId,
    pub tool_name: String,
    pub scores: ToolScores,
    pub overall_score: f64,
}

/// Cached routing preferences for one tool pattern; rebuilt on demand when
/// absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRoute {
    pub tool_pattern: String,
    pub primary_agents: Vec<AgentId>,
    pub fallback_agents: Vec<AgentId>,
    pub balance_mode: BalanceMode,
    pub health_threshold: f64,
    pub last_updated: DateTime<Utc>,
}

impl ToolRoute {
    /// Default route for a tool with no operator-configured preference.
    pub fn default_for(tool_pattern: impl Into<String>, health_threshold: f64) -> Self {
        Self {
            tool_pattern: tool_pattern.into(),
            primary_agents: Vec::new(),
            fallback_agents: Vec::new(),
            balance_mode: BalanceMode::BestPerformance,
            health_threshold,
            last_updated: Utc::now(),
        }
    }
}

/// Outcome of `RouteToolInvocation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub selected_agent: AgentId,
    pub strategy: String,
    pub mode: BalanceMode,
    pub alternatives: Vec<AgentId>,
    pub justification: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-tool advisory attached to advanced discovery results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRecommendation {
    pub recommended_agent: AgentId,
    /// Expected latency = EMA latency from the metrics store, ms.
    pub expected_latency_ms: f64,
    /// Confidence = the agent's composite health score.
    pub confidence_score: f64,
    pub justification: String,
}

/// Aggregate federation counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationStats {
    pub total_agents: usize,
    pub total_tools: usize,
    pub total_brokers: usize,
    pub active_brokers: usize,
    pub mean_agent_health: f64,
    pub mean_broker_trust: f64,
    pub total_routed_requests: u64,
}

/// Classification bands for the operator-facing health report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBand {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// Operator-visible aggregation over agent health and broker statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationHealthReport {
    pub brokers_by_status: HashMap<String, usize>,
    pub mean_agent_health: f64,
    /// 0.7 · mean agent health + 0.3 · (active brokers / total brokers).
    pub overall_score: f64,
    pub band: HealthBand,
}

/// Everything `DiscoverToolsAdvanced` returns in one shot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedDiscovery {
    pub base_results: Vec<DiscoveredTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_results: Option<Vec<ScoredTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranked_results: Option<Vec<RankedTool>>,
    pub routing_recommendations: HashMap<String, RoutingRecommendation>,
    pub federation_stats: FederationStats,
    pub timestamp: DateTime<Utc>,
}

/// A discovery result with its semantic similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredTool {
    pub agent_id: AgentId,
    pub tool_name: String,
    pub similarity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = RankWeights::default();
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalized_weights() {
        let w = RankWeights {
            performance: 0.5,
            reliability: 0.5,
            latency: 0.5,
            cost: 0.25,
            affinity: 0.25,
        }
        .normalized();
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!((w.performance - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_balance_mode_serde_names() {
        let json = serde_json::to_string(&BalanceMode::WeightedRoundRobin).unwrap();
        assert_eq!(json, "\"weighted-round-robin\"");
        let back: BalanceMode = serde_json::from_str("\"best-performance\"").unwrap();
        assert_eq!(back, BalanceMode::BestPerformance);
    }
}
