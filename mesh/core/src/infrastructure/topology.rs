// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::federation::{BrokerStatus, FederatedBroker, ToolRoute};

#[derive(Default)]
struct TopologyState {
    brokers: HashMap<String, FederatedBroker>,
    routes: HashMap<String, ToolRoute>,
}

/// Federated-broker directory plus the per-tool routing cache, under one
/// reader-writer lock. Third in the lock order: registry → metrics →
/// topology.
#[derive(Default)]
pub struct TopologyStore {
    state: RwLock<TopologyState>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_broker(&self, broker: FederatedBroker) {
        self.state.write().await.brokers.insert(broker.id.clone(), broker);
    }

    pub async fn remove_broker(&self, id: &str) -> bool {
        self.state.write().await.brokers.remove(id).is_some()
    }

    pub async fn get_broker(&self, id: &str) -> Option<FederatedBroker> {
        self.state.read().await.brokers.get(id).cloned()
    }

    pub async fn list_brokers(&self) -> Vec<FederatedBroker> {
        self.state.read().await.brokers.values().cloned().collect()
    }

    pub async fn broker_counts(&self) -> (usize, usize) {
        let state = self.state.read().await;
        let total = state.brokers.len();
        let active = state
            .brokers
            .values()
            .filter(|b| b.status == BrokerStatus::Active)
            .count();
        (total, active)
    }

    pub async fn brokers_by_status(&self) -> HashMap<String, usize> {
        let state = self.state.read().await;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for broker in state.brokers.values() {
            let bucket = match broker.status {
                BrokerStatus::Active => "active",
                BrokerStatus::Degraded => "degraded",
                BrokerStatus::Unreachable => "unreachable",
                BrokerStatus::Maintenance => "maintenance",
            };
            *counts.entry(bucket.to_string()).or_default() += 1;
        }
        counts
    }

    pub async fn mean_trust(&self) -> f64 {
        let state = self.state.read().await;
        if state.brokers.is_empty() {
            return 0.0;
        }
        state.brokers.values().map(|b| b.trust_score).sum::<f64>() / state.brokers.len() as f64
    }

    /// Fold one broker probe into its record; returns the updated record.
    ///
    /// Trust moves by EMA (α = 0.2) toward 1 on success and toward 0 on
    /// failure, so an unreachable peer's reputation decays instead of
    /// freezing at its last good value.
    pub async fn apply_broker_probe(
        &self,
        id: &str,
        status: BrokerStatus,
        response_time_ms: f64,
        stats: Option<(usize, f64)>,
    ) -> Option<FederatedBroker> {
        let mut state = self.state.write().await;
        let broker = state.brokers.get_mut(id)?;
        broker.status = status;
        broker.response_time_ms = response_time_ms;
        let sample = if status == BrokerStatus::Unreachable { 0.0 } else { 1.0 };
        broker.trust_score = 0.8 * broker.trust_score + 0.2 * sample;
        if let Some((tool_count, load_score)) = stats {
            broker.tool_count = tool_count;
            broker.load_score = load_score;
        }
        if status != BrokerStatus::Unreachable {
            broker.last_seen = Utc::now();
        }
        Some(broker.clone())
    }

    /// Cached route for a tool, if the operator or a previous call built
    /// one.
    pub async fn route_for(&self, tool: &str) -> Option<ToolRoute> {
        self.state.read().await.routes.get(tool).cloned()
    }

    pub async fn put_route(&self, route: ToolRoute) {
        self.state
            .write()
            .await
            .routes
            .insert(route.tool_pattern.clone(), route);
    }

    pub async fn route_count(&self) -> usize {
        self.state.read().await.routes.len()
    }
}
