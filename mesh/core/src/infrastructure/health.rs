// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Health Checker
//!
//! Periodic liveness probing of registered agents and federated brokers.
//! One pass fans out every probe concurrently; each target is probed by
//! exactly one task per pass, and no registry or metrics lock is held
//! across the network calls.
//!
//! Agent probe = GET `endpoint/health` (hard 5 s timeout) plus a
//! `tools/list` JSON-RPC POST (hard 10 s timeout) whose outcome grades the
//! capability score. Broker probe = GET `endpoint/health`, then
//! `endpoint/federation/stats` to refresh tool count and load score.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::MeshConfig;
use crate::domain::agent::AgentRecord;
use crate::domain::events::MeshEvent;
use crate::domain::federation::{
    BrokerStatus, FederatedBroker, FederationHealthReport, HealthBand,
};
use crate::infrastructure::event_bus::MeshEventBus;
use crate::infrastructure::metrics_store::{MetricsStore, ProbeOutcome};
use crate::infrastructure::registry::McpRegistry;
use crate::infrastructure::topology::TopologyStore;

/// Classify an overall federation score against the healthy threshold.
///
/// `healthy` at or above the threshold (≥, not >), `degraded` from 0.7×
/// the threshold, `unknown` for an exact zero (no signal at all).
pub fn classify_score(score: f64, healthy_threshold: f64) -> HealthBand {
    if score == 0.0 {
        HealthBand::Unknown
    } else if score >= healthy_threshold {
        HealthBand::Healthy
    } else if score >= 0.7 * healthy_threshold {
        HealthBand::Degraded
    } else {
        HealthBand::Unhealthy
    }
}

pub struct HealthChecker {
    registry: Arc<McpRegistry>,
    metrics: Arc<MetricsStore>,
    topology: Arc<TopologyStore>,
    events: MeshEventBus,
    http: reqwest::Client,
    config: MeshConfig,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthChecker {
    pub fn new(
        registry: Arc<McpRegistry>,
        metrics: Arc<MetricsStore>,
        topology: Arc<TopologyStore>,
        events: MeshEventBus,
        config: MeshConfig,
    ) -> Self {
        Self {
            registry,
            metrics,
            topology,
            events,
            http: reqwest::Client::new(),
            config,
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the probe loop. Idempotent: a second start is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return;
        }
        let checker = Arc::clone(self);
        let cancel = self.cancel.clone();
        let interval = self.config.check_interval;
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would probe before anything has
            // registered; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => checker.run_pass().await,
                }
            }
        }));
    }

    /// Signal shutdown and drain the in-flight pass.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// One full probe pass: all agents and all brokers, in parallel.
    pub async fn run_pass(&self) {
        let agents = self.registry.list_agents().await;
        let brokers = self.topology.list_brokers().await;

        let agent_probes = agents.iter().map(|agent| self.check_agent(agent));
        let broker_probes = brokers.iter().map(|broker| self.check_broker(broker));
        let (agent_results, _) = tokio::join!(join_all(agent_probes), join_all(broker_probes));

        let probed = agent_results.len();
        if probed > 0 {
            debug!(agents = probed, brokers = brokers.len(), "health pass complete");
        }
    }

    async fn check_agent(&self, agent: &AgentRecord) {
        let Some(endpoint) = &agent.mcp_endpoint else {
            return;
        };

        let started = Instant::now();
        let reachable = match self
            .http
            .get(format!("{}/health", endpoint.trim_end_matches('/')))
            .timeout(self.config.probe_connect_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(agent = %agent.id, error = %e, "agent connectivity probe failed");
                false
            }
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

        let capability_score = self.probe_capabilities(endpoint).await;

        let health = self
            .metrics
            .apply_probe(
                &agent.id,
                ProbeOutcome {
                    reachable,
                    capability_score,
                    latency_ms,
                },
            )
            .await;

        if !reachable {
            warn!(agent = %agent.id, "agent unhealthy, will retry next tick");
        }
        self.events.publish(MeshEvent::AgentHealthChanged {
            agent_id: agent.id.clone(),
            health_score: health,
            reachable,
        });
    }

    /// Grade the `tools/list` probe: no response 0.0, non-200 0.5,
    /// non-JSON body 0.7, valid JSON 1.0.
    async fn probe_capabilities(&self, endpoint: &str) -> f64 {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "tools/list",
            "id": 1,
        });
        let response = match self
            .http
            .post(endpoint)
            .json(&request)
            .timeout(self.config.probe_capability_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(_) => return 0.0,
        };
        if !response.status().is_success() {
            return 0.5;
        }
        match response.json::<serde_json::Value>().await {
            Ok(_) => 1.0,
            Err(_) => 0.7,
        }
    }

    async fn check_broker(&self, broker: &FederatedBroker) {
        let base = broker.endpoint.trim_end_matches('/');
        let started = Instant::now();
        let health_response = self
            .http
            .get(format!("{base}/health"))
            .timeout(self.config.probe_connect_timeout)
            .send()
            .await;
        let response_time_ms = started.elapsed().as_secs_f64() * 1_000.0;

        let updated = match health_response {
            Ok(response) if response.status().is_success() => {
                let stats = self.probe_broker_stats(base).await;
                let status = if response_time_ms < 1_000.0 {
                    BrokerStatus::Active
                } else {
                    BrokerStatus::Degraded
                };
                self.topology
                    .apply_broker_probe(&broker.id, status, response_time_ms, stats)
                    .await
            }
            _ => {
                debug!(broker = %broker.id, "broker unreachable");
                self.topology
                    .apply_broker_probe(&broker.id, BrokerStatus::Unreachable, response_time_ms, None)
                    .await
            }
        };

        if let Some(updated) = updated {
            self.events.publish(MeshEvent::BrokerStatusChanged {
                broker_id: updated.id,
                status: updated.status,
                trust_score: updated.trust_score,
            });
        }
    }

    async fn probe_broker_stats(&self, base: &str) -> Option<(usize, f64)> {
        let stats: serde_json::Value = self
            .http
            .get(format!("{base}/federation/stats"))
            .timeout(self.config.probe_connect_timeout)
            .send()
            .await
            .ok()?
            .json()
            .await
            .ok()?;
        let tool_count = stats.get("totalTools").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let load_score = stats.get("loadScore").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Some((tool_count, load_score))
    }

    /// Operator-visible roll-up: status buckets, mean agent health, and a
    /// single score `0.7·meanAgentHealth + 0.3·(activeBrokers/totalBrokers)`.
    pub async fn overall_federation_health(&self) -> FederationHealthReport {
        let mean_agent_health = self.metrics.mean_health().await;
        let (total_brokers, active_brokers) = self.topology.broker_counts().await;
        let brokers_by_status = self.topology.brokers_by_status().await;

        // A single-broker deployment has no peers to count against it.
        let broker_ratio = if total_brokers > 0 {
            active_brokers as f64 / total_brokers as f64
        } else {
            1.0
        };
        let has_signal = self.registry.agent_count().await > 0 || total_brokers > 0;
        let overall_score = if has_signal {
            0.7 * mean_agent_health + 0.3 * broker_ratio
        } else {
            0.0
        };

        FederationHealthReport {
            brokers_by_status,
            mean_agent_health,
            overall_score,
            band: classify_score(overall_score, self.config.healthy_threshold),
        }
    }
}
