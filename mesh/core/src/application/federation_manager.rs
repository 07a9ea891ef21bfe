// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Federation Manager
//!
//! The public façade over the mesh core. Owns the MCP registry, metrics
//! store, topology, semantic index, ranking engine, load balancer and
//! health checker; background tasks hold only shared references while
//! iterating. Constructed once at broker startup and torn down with
//! [`FederationManager::close`], so tests can bring up and tear down
//! several managers in one process.
//!
//! Lock order across components: registry → metrics → topology.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MeshConfig;
use crate::domain::agent::{AgentId, AgentRecord};
use crate::domain::envelope::RegisterBrokerBody;
use crate::domain::error::RoutingError;
use crate::domain::events::MeshEvent;
use crate::domain::federation::{
    AdvancedDiscovery, BrokerStatus, FederatedBroker, FederationHealthReport, FederationStats,
    RoutingContext, RoutingDecision, RoutingRecommendation, ScoredTool, ToolRoute,
};
use crate::domain::tool::{BodyDefinition, DiscoveredTool, ToolQuery};
use crate::infrastructure::balancer::LoadBalancer;
use crate::infrastructure::codec::EnvelopeValidator;
use crate::infrastructure::event_bus::MeshEventBus;
use crate::infrastructure::health::HealthChecker;
use crate::infrastructure::metrics_store::MetricsStore;
use crate::infrastructure::ranking::RankingEngine;
use crate::infrastructure::registry::McpRegistry;
use crate::infrastructure::semantic::SemanticIndex;
use crate::infrastructure::topology::TopologyStore;

pub struct FederationManager {
    config: MeshConfig,
    registry: Arc<McpRegistry>,
    metrics: Arc<MetricsStore>,
    topology: Arc<TopologyStore>,
    semantic: Arc<SemanticIndex>,
    ranking: RankingEngine,
    balancer: LoadBalancer,
    health: Arc<HealthChecker>,
    events: MeshEventBus,
    validator: Arc<EnvelopeValidator>,
    routed_requests: AtomicU64,
    cancel: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl FederationManager {
    pub fn new(config: MeshConfig) -> Arc<Self> {
        let registry = Arc::new(McpRegistry::new());
        let metrics = Arc::new(MetricsStore::new());
        let topology = Arc::new(TopologyStore::new());
        let events = MeshEventBus::with_default_capacity();
        let validator = Arc::new(EnvelopeValidator::new(
            config.timestamp_skew,
            config.nonce_window(),
        ));
        let health = Arc::new(HealthChecker::new(
            Arc::clone(&registry),
            Arc::clone(&metrics),
            Arc::clone(&topology),
            events.clone(),
            config.clone(),
        ));

        Arc::new(Self {
            config,
            registry,
            metrics,
            topology,
            semantic: Arc::new(SemanticIndex::new()),
            ranking: RankingEngine::new(),
            balancer: LoadBalancer::new(),
            health,
            events,
            validator,
            routed_requests: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            loops: Mutex::new(Vec::new()),
        })
    }

    /// Start the health checker and the two maintenance loops. Every
    /// ticker pairs with the shutdown token; nothing relies on process
    /// exit for reclamation.
    pub fn start(self: &Arc<Self>) {
        self.health.start();

        let topology_loop = {
            let manager = Arc::clone(self);
            let cancel = self.cancel.clone();
            let interval = self.config.topology_update_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => manager.refresh_topology().await,
                    }
                }
            })
        };

        let maintenance_loop = {
            let manager = Arc::clone(self);
            let cancel = self.cancel.clone();
            let interval = self.config.cache_update_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => manager.recompute_derived_metrics().await,
                    }
                }
            })
        };

        self.loops.lock().extend([topology_loop, maintenance_loop]);
        info!(broker = %self.config.broker_id, "federation manager started");
    }

    /// Stop background loops and drain in-flight probes.
    pub async fn close(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self.loops.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.health.stop().await;
        info!(broker = %self.config.broker_id, "federation manager closed");
    }

    pub fn events(&self) -> &MeshEventBus {
        &self.events
    }

    pub fn validator(&self) -> Arc<EnvelopeValidator> {
        Arc::clone(&self.validator)
    }

    pub fn registry(&self) -> Arc<McpRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn metrics(&self) -> Arc<MetricsStore> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registration surface
    // ------------------------------------------------------------------

    pub async fn register_agent(&self, record: AgentRecord) {
        let tool_count = record.body.as_ref().map(|b| b.tools.len()).unwrap_or(0);
        if let Some(body) = &record.body {
            for tool in &body.tools {
                self.semantic.index_tool(&tool.name, &tool.description);
            }
        }
        let id = record.id.clone();
        let registered_at = record.registered_at;
        self.registry.register_agent(record).await;
        self.events.publish(MeshEvent::AgentRegistered {
            agent_id: id,
            tool_count,
            registered_at,
        });
        metrics::counter!("mesh_agent_registrations_total").increment(1);
    }

    pub async fn apply_embodiment(
        &self,
        id: &AgentId,
        environment: String,
        body: BodyDefinition,
        mcp_endpoint: Option<String>,
    ) -> bool {
        let tool_count = body.tools.len();
        let tools: Vec<(String, String)> = body
            .tools
            .iter()
            .map(|t| (t.name.clone(), t.description.clone()))
            .collect();
        let applied = self
            .registry
            .apply_embodiment(id, environment.clone(), body, mcp_endpoint)
            .await;
        if applied {
            for (name, description) in &tools {
                self.semantic.index_tool(name, description);
            }
            self.events.publish(MeshEvent::EmbodimentChanged {
                agent_id: id.clone(),
                environment,
                tool_count,
                changed_at: Utc::now(),
            });
        }
        applied
    }

    /// Remove the agent, its tools and its metrics in one sweep.
    pub async fn revoke_agent(&self, id: &AgentId, reason: Option<String>) -> bool {
        let removed = self.registry.unregister_agent(id).await;
        if removed {
            self.metrics.remove(id).await;
            self.events.publish(MeshEvent::AgentRevoked {
                agent_id: id.clone(),
                reason,
                revoked_at: Utc::now(),
            });
        }
        removed
    }

    pub async fn heartbeat(&self, id: &AgentId) -> bool {
        self.registry.update_heartbeat(id).await
    }

    pub async fn register_broker(&self, body: &RegisterBrokerBody) {
        let broker = FederatedBroker::new(body.broker_id.clone(), body.endpoint.clone());
        self.topology.upsert_broker(broker).await;
        self.events.publish(MeshEvent::BrokerRegistered {
            broker_id: body.broker_id.clone(),
            endpoint: body.endpoint.clone(),
            registered_at: Utc::now(),
        });
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Registry discovery with live metadata folded in from the metrics
    /// store (EMA response time, trust = health score).
    pub async fn discover_tools(&self, query: &ToolQuery) -> Vec<DiscoveredTool> {
        let mut results = self.registry.discover_tools(query).await;
        let snapshot = self.metrics.snapshot().await;
        for group in &mut results {
            if let Some(m) = snapshot.get(&group.agent_id) {
                group.metadata.average_response_time = m.avg_latency_ms;
                group.metadata.trust_score = m.health_score;
            }
        }
        results
    }

    /// Discovery with optional semantic boosting and ranking plus a
    /// routing recommendation per tool.
    pub async fn discover_tools_advanced(
        &self,
        query: &ToolQuery,
        context: &RoutingContext,
    ) -> AdvancedDiscovery {
        let base_results = self.discover_tools(query).await;
        let snapshot = self.metrics.snapshot().await;

        let semantic_results = if query.capabilities.is_empty() {
            None
        } else {
            let scored = self
                .semantic
                .score_query(&query.capabilities, query.environment_type.as_deref());
            let by_name: HashMap<&str, f32> =
                scored.iter().map(|(n, s)| (n.as_str(), *s)).collect();
            let mut matches: Vec<ScoredTool> = base_results
                .iter()
                .flat_map(|group| {
                    group.mcp_tools.iter().filter_map(|tool| {
                        let similarity = *by_name.get(tool.name.as_str())? as f64;
                        (similarity > self.config.similarity_threshold).then(|| ScoredTool {
                            agent_id: group.agent_id.clone(),
                            tool_name: tool.name.clone(),
                            similarity,
                        })
                    })
                })
                .collect();
            matches.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Some(matches)
        };

        let ranked_results = (!base_results.is_empty())
            .then(|| self.ranking.rank(&base_results, &snapshot, context, None));

        let mut routing_recommendations = HashMap::new();
        if let Some(ranked) = &ranked_results {
            for tool in ranked {
                routing_recommendations
                    .entry(tool.tool_name.clone())
                    .or_insert_with(|| {
                        let m = snapshot.get(&tool.agent_id);
                        RoutingRecommendation {
                            recommended_agent: tool.agent_id.clone(),
                            expected_latency_ms: m.map(|m| m.avg_latency_ms).unwrap_or(0.0),
                            confidence_score: m.map(|m| m.health_score).unwrap_or(1.0),
                            justification: format!(
                                "ranked first for {} with overall score {:.3}",
                                tool.tool_name, tool.overall_score
                            ),
                        }
                    });
            }
        }

        AdvancedDiscovery {
            base_results,
            semantic_results,
            ranked_results,
            routing_recommendations,
            federation_stats: self.federation_stats().await,
            timestamp: Utc::now(),
        }
    }

    pub fn find_similar_tools(&self, tool_name: &str) -> Vec<(String, f32)> {
        self.semantic.find_similar_tools(tool_name)
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Pick a provider for `tool_name` among healthy candidates.
    ///
    /// The preferred agent goes first when it offers the tool and clears
    /// the route's health threshold; agents without metrics are presumed
    /// healthy until the first probe says otherwise. When no primary
    /// candidate survives, the route's fallback agents are tried before
    /// failing with `NoEligibleAgent`.
    pub async fn route_tool_invocation(
        &self,
        tool_name: &str,
        preferred_agent: Option<&AgentId>,
        context: &RoutingContext,
    ) -> Result<RoutingDecision, RoutingError> {
        let route = match self.topology.route_for(tool_name).await {
            Some(route) => route,
            None => {
                let route =
                    ToolRoute::default_for(tool_name, self.config.routing_health_threshold);
                self.topology.put_route(route.clone()).await;
                route
            }
        };

        let offering = self.registry.agents_for_tool(tool_name).await;
        let snapshot = self.metrics.snapshot().await;
        let healthy = |id: &AgentId| {
            snapshot
                .get(id)
                .map(|m| m.health_score > route.health_threshold)
                .unwrap_or(true)
        };

        let mut candidates: Vec<AgentId> = Vec::new();
        if let Some(preferred) = preferred_agent {
            if offering.contains(preferred) && healthy(preferred) {
                candidates.push(preferred.clone());
            }
        }
        for id in &offering {
            if healthy(id) && !candidates.contains(id) {
                candidates.push(id.clone());
            }
        }
        if candidates.is_empty() {
            for id in &route.fallback_agents {
                if offering.contains(id) && !candidates.contains(id) {
                    candidates.push(id.clone());
                }
            }
        }
        if candidates.is_empty() {
            warn!(tool = tool_name, "no eligible agent");
            return Err(RoutingError::NoEligibleAgent {
                tool: tool_name.to_string(),
            });
        }

        let selected = self
            .balancer
            .select(route.balance_mode, &candidates, &snapshot, context)
            .ok_or_else(|| RoutingError::NoEligibleAgent {
                tool: tool_name.to_string(),
            })?;

        self.metrics.record_decision(&selected).await;
        self.routed_requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("mesh_routing_decisions_total").increment(1);
        self.events.publish(MeshEvent::RoutingDecided {
            tool: tool_name.to_string(),
            selected_agent: selected.clone(),
            mode: route.balance_mode,
            decided_at: Utc::now(),
        });
        debug!(tool = tool_name, agent = %selected, mode = %route.balance_mode, "routing decision");

        Ok(RoutingDecision {
            selected_agent: selected.clone(),
            strategy: self.balancer.strategy_name(route.balance_mode).to_string(),
            mode: route.balance_mode,
            justification: format!(
                "{} selected among {} candidate(s) via {}",
                selected,
                candidates.len(),
                route.balance_mode
            ),
            alternatives: candidates,
            timestamp: Utc::now(),
        })
    }

    /// Feed a `toolResult` acknowledgment back into metrics and the
    /// adaptive strategy's outcome window.
    pub async fn record_route_outcome(&self, agent: &AgentId, success: bool, latency_ms: Option<f64>) {
        self.metrics.record_outcome(agent, success, latency_ms).await;
        if let Some(latency) = latency_ms {
            self.balancer.record_outcome(agent, success, latency);
        }
        metrics::counter!("mesh_route_outcomes_total").increment(1);
    }

    // ------------------------------------------------------------------
    // Statistics & health
    // ------------------------------------------------------------------

    pub async fn federation_stats(&self) -> FederationStats {
        let (total_brokers, active_brokers) = self.topology.broker_counts().await;
        FederationStats {
            total_agents: self.registry.agent_count().await,
            total_tools: self.registry.tool_count().await,
            total_brokers,
            active_brokers,
            mean_agent_health: self.metrics.mean_health().await,
            mean_broker_trust: self.topology.mean_trust().await,
            total_routed_requests: self.routed_requests.load(Ordering::Relaxed),
        }
    }

    pub async fn overall_federation_health(&self) -> FederationHealthReport {
        self.health.overall_federation_health().await
    }

    // ------------------------------------------------------------------
    // Background passes
    // ------------------------------------------------------------------

    /// Demote brokers that have gone quiet. Broker-to-broker gossip would
    /// hang off this pass; it is deliberately a local-only refresh today.
    async fn refresh_topology(&self) {
        let stale_after = chrono::Duration::from_std(self.config.check_interval * 3)
            .unwrap_or_else(|_| chrono::Duration::seconds(90));
        let cutoff = Utc::now() - stale_after;
        for broker in self.topology.list_brokers().await {
            if broker.status == BrokerStatus::Active && broker.last_seen < cutoff {
                self.topology
                    .apply_broker_probe(
                        &broker.id,
                        BrokerStatus::Degraded,
                        broker.response_time_ms,
                        None,
                    )
                    .await;
                debug!(broker = %broker.id, "broker demoted to degraded (stale)");
            }
        }
        let (total, active) = self.topology.broker_counts().await;
        metrics::gauge!("mesh_federated_brokers_total").set(total as f64);
        metrics::gauge!("mesh_federated_brokers_active").set(active as f64);
    }

    /// Retention and cache upkeep for derived state.
    async fn recompute_derived_metrics(&self) {
        let dropped = self
            .metrics
            .purge_stale(self.config.metrics_retention_period)
            .await;
        if dropped > 0 {
            debug!(dropped, "purged stale agent metrics");
        }
        self.validator.purge_expired();
        metrics::gauge!("mesh_mean_agent_health").set(self.metrics.mean_health().await);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::federation::AgentMetrics;
    use crate::domain::tool::McpTool;

    fn agent(id: &str, env: &str, tools: &[&str]) -> AgentRecord {
        let mut record = AgentRecord::new(AgentId::from(id), "a2V5".to_string());
        record.mcp_endpoint = Some(format!("http://{id}.local:8080"));
        record.body = Some(BodyDefinition {
            name: format!("{id}-body"),
            environment: env.to_string(),
            capabilities: vec![],
            tools: tools.iter().map(|t| McpTool::new(*t, "")).collect(),
        });
        record.environment = Some(env.to_string());
        record
    }

    fn metric(id: &str, health: f64, load: f64, latency: f64, error_rate: f64) -> AgentMetrics {
        let mut m = AgentMetrics::new(AgentId::from(id));
        m.health_score = health;
        m.load_score = load;
        m.avg_latency_ms = latency;
        m.error_rate = error_rate;
        m.availability = 1.0 - error_rate;
        m
    }

    #[tokio::test]
    async fn test_routing_selects_best_performer() {
        let manager = FederationManager::new(MeshConfig::default());
        manager.register_agent(agent("a1", "local", &["math.add"])).await;
        manager.register_agent(agent("a2", "local", &["math.add"])).await;
        manager.metrics.put(metric("a1", 0.9, 0.3, 100.0, 0.05)).await;
        manager.metrics.put(metric("a2", 0.8, 0.7, 200.0, 0.10)).await;

        let decision = manager
            .route_tool_invocation("math.add", None, &RoutingContext::default())
            .await
            .unwrap();
        assert_eq!(decision.selected_agent.as_str(), "a1");
        assert_eq!(decision.alternatives.len(), 2);
        assert_eq!(decision.strategy, "best-performance");
    }

    #[tokio::test]
    async fn test_routing_prefers_requested_agent() {
        let manager = FederationManager::new(MeshConfig::default());
        manager.register_agent(agent("a1", "local", &["math.add"])).await;
        manager.register_agent(agent("a2", "local", &["math.add"])).await;

        // Round-robin route so the preferred agent's position matters.
        manager
            .topology
            .put_route(ToolRoute {
                balance_mode: crate::domain::federation::BalanceMode::RoundRobin,
                ..ToolRoute::default_for("math.add", 0.5)
            })
            .await;

        let decision = manager
            .route_tool_invocation("math.add", Some(&AgentId::from("a2")), &RoutingContext::default())
            .await
            .unwrap();
        assert_eq!(decision.alternatives[0].as_str(), "a2");
    }

    #[tokio::test]
    async fn test_routing_fails_without_candidates() {
        let manager = FederationManager::new(MeshConfig::default());
        let err = manager
            .route_tool_invocation("ghost.tool", None, &RoutingContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::NoEligibleAgent { .. }));
    }

    #[tokio::test]
    async fn test_routing_skips_unhealthy_agents() {
        let manager = FederationManager::new(MeshConfig::default());
        manager.register_agent(agent("sick", "local", &["math.add"])).await;
        manager.register_agent(agent("fine", "local", &["math.add"])).await;
        manager.metrics.put(metric("sick", 0.1, 0.0, 50.0, 0.0)).await;
        manager.metrics.put(metric("fine", 0.9, 0.0, 50.0, 0.0)).await;

        let decision = manager
            .route_tool_invocation("math.add", None, &RoutingContext::default())
            .await
            .unwrap();
        assert_eq!(decision.selected_agent.as_str(), "fine");
        assert_eq!(decision.alternatives.len(), 1);
    }

    #[tokio::test]
    async fn test_advanced_discovery_shapes() {
        let manager = FederationManager::new(MeshConfig::default());
        manager
            .register_agent(agent("a1", "local", &["math.add", "math.multiply"]))
            .await;

        let query = ToolQuery {
            capabilities: vec!["math.*".into()],
            ..Default::default()
        };
        let discovery = manager
            .discover_tools_advanced(&query, &RoutingContext::default())
            .await;

        assert_eq!(discovery.base_results.len(), 1);
        let ranked = discovery.ranked_results.unwrap();
        assert_eq!(ranked.len(), 2);
        assert!(ranked.windows(2).all(|w| w[0].overall_score >= w[1].overall_score));
        assert!(discovery.routing_recommendations.contains_key("math.add"));
        assert_eq!(discovery.federation_stats.total_agents, 1);
    }

    #[tokio::test]
    async fn test_revoke_clears_registry_and_metrics() {
        let manager = FederationManager::new(MeshConfig::default());
        manager.register_agent(agent("a1", "local", &["math.add"])).await;
        manager.metrics.put(metric("a1", 0.9, 0.0, 50.0, 0.0)).await;

        assert!(manager.revoke_agent(&AgentId::from("a1"), None).await);
        assert!(manager.registry.get_agent(&AgentId::from("a1")).await.is_none());
        assert_eq!(manager.registry.tool_count().await, 0);
        assert!(manager.metrics.get(&AgentId::from("a1")).await.is_none());
    }

    #[tokio::test]
    async fn test_start_close_lifecycle() {
        let manager = FederationManager::new(MeshConfig::default());
        manager.start();
        manager.close().await;
        // A second manager in the same process must be independent.
        let second = FederationManager::new(MeshConfig::default());
        second.start();
        second.close().await;
    }

    #[tokio::test]
    async fn test_outcome_feedback_updates_metrics() {
        let manager = FederationManager::new(MeshConfig::default());
        let id = AgentId::from("a1");
        manager.record_route_outcome(&id, true, Some(120.0)).await;
        manager.record_route_outcome(&id, false, Some(300.0)).await;
        let m = manager.metrics.get(&id).await.unwrap();
        assert_eq!(m.successful_requests, 1);
        assert_eq!(m.failed_requests, 1);
        assert!((m.availability - 0.5).abs() < 1e-9);
    }
}
