// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Ranking Engine
//!
//! Scores discovered tools on five axes — performance, reliability,
//! latency, cost and affinity — each on [0, 1], then combines them with
//! configurable weights. Caller priority skews the weights (a CRITICAL
//! call cares more about reliability, a LOW call about cost) before they
//! are renormalized to sum to 1, so the overall score stays on [0, 1].

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::federation::{
    AgentMetrics, RankWeights, RankedTool, RoutePriority, RoutingContext, ToolScores,
};
use crate::domain::tool::DiscoveredTool;

/// Piecewise latency ladder shared by the performance and latency axes.
fn latency_score(latency_ms: f64) -> f64 {
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

fn is_loopback_endpoint(endpoint: &str) -> bool {
    url::Url::parse(endpoint)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == "127.0.0.1" || h == "localhost" || h == "::1" || h == "[::1]"))
        .unwrap_or(false)
}

/// Stateless scorer with optional per-user weight preferences.
#[derive(Default)]
pub struct RankingEngine {
    user_weights: RwLock<HashMap<String, RankWeights>>,
}

impl RankingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install weight preferences for a user key; replaces the defaults
    /// wholesale when that user ranks.
    pub fn set_user_weights(&self, user: impl Into<String>, weights: RankWeights) {
        self.user_weights.write().insert(user.into(), weights);
    }

    fn base_weights(&self, context: &RoutingContext, user: Option<&str>) -> RankWeights {
        if let Some(overrides) = context.weight_overrides {
            return overrides;
        }
        if let Some(user) = user {
            if let Some(w) = self.user_weights.read().get(user) {
                return *w;
            }
        }
        RankWeights::default()
    }

    /// Apply priority modifiers, then renormalize so the weights sum to 1.
    fn effective_weights(&self, context: &RoutingContext, user: Option<&str>) -> RankWeights {
        let mut w = self.base_weights(context, user);
        match context.priority {
            RoutePriority::Critical => {
                w.reliability *= 1.5;
                w.performance *= 1.3;
            }
            RoutePriority::High => {
                w.latency *= 1.3;
                w.performance *= 1.2;
            }
            RoutePriority::Low => {
                w.cost *= 1.5;
            }
            RoutePriority::Normal => {}
        }
        w.normalized()
    }

    fn score_one(
        &self,
        group: &DiscoveredTool,
        metrics: Option<&AgentMetrics>,
        context: &RoutingContext,
    ) -> ToolScores {
        let ema_latency = metrics.map(|m| m.avg_latency_ms).unwrap_or(0.0);

        let performance = latency_score(ema_latency);
        let reliability = group.metadata.trust_score.clamp(0.0, 1.0);
        let latency = latency_score(group.metadata.average_response_time);
        let cost = if is_loopback_endpoint(&group.mcp_endpoint) { 0.9 } else { 0.7 };

        let mut affinity: f64 = 0.3; // specialization baseline
        if context.preferred_agents.contains(&group.agent_id) {
            affinity += 0.5;
        }
        if let Some(region) = &context.region {
            if &group.environment_type == region {
                affinity += 0.3;
            }
        }

        ToolScores {
            performance,
            reliability,
            latency,
            cost,
            affinity: affinity.min(1.0),
        }
    }

    /// Rank discovered tools descending by weighted overall score.
    pub fn rank(
        &self,
        discovered: &[DiscoveredTool],
        metrics: &HashMap<crate::domain::agent::AgentId, AgentMetrics>,
        context: &RoutingContext,
        user: Option<&str>,
    ) -> Vec<RankedTool> {
        let weights = self.effective_weights(context, user);

        let mut ranked: Vec<RankedTool> = discovered
            .iter()
            .flat_map(|group| {
                let scores = self.score_one(group, metrics.get(&group.agent_id), context);
                let overall = weights.performance * scores.performance
                    + weights.reliability * scores.reliability
                    + weights.latency * scores.latency
                    + weights.cost * scores.cost
                    + weights.affinity * scores.affinity;
                group.mcp_tools.iter().map(move |tool| RankedTool {
                    agent_id: group.agent_id.clone(),
                    tool_name: tool.name.clone(),
                    scores,
                    overall_score: overall,
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.overall_score
                .partial_cmp(&a.overall_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }
}
