// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Development-only capability-token secret. The CLI refuses to stay quiet
/// about it; operators supply a real secret via flag, env or config file.
pub const DEV_TOKEN_SECRET: &str = "aegis-mesh-dev-secret-do-not-deploy";

/// Broker configuration, YAML-loadable.
///
/// Durations use humantime syntax in config files (`"30s"`, `"5m"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeshConfig {
    /// Broker identity used as capability-token issuer and in federation
    /// stats exchanged with peers.
    pub broker_id: String,

    /// Symmetric secret for capability tokens, shared across the trust
    /// domain. Must come from configuration or a secrets manager.
    pub token_secret: String,

    /// Default lifetime of issued capability tokens.
    #[serde(with = "humantime_serde")]
    pub token_ttl: Duration,

    /// Accepted clock skew on envelope timestamps (applied as ±skew).
    #[serde(with = "humantime_serde")]
    pub timestamp_skew: Duration,

    /// Health-probe pass interval.
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,

    /// Federated-broker topology refresh interval.
    #[serde(with = "humantime_serde")]
    pub topology_update_interval: Duration,

    /// Derived-metrics recompute / cache maintenance interval.
    #[serde(with = "humantime_serde")]
    pub cache_update_interval: Duration,

    /// How long idle agent metrics are retained.
    #[serde(with = "humantime_serde")]
    pub metrics_retention_period: Duration,

    /// Hard timeout on the agent connectivity probe (GET /health).
    #[serde(with = "humantime_serde")]
    pub probe_connect_timeout: Duration,

    /// Hard timeout on the capability probe (tools/list POST).
    #[serde(with = "humantime_serde")]
    pub probe_capability_timeout: Duration,

    /// Minimum cosine similarity for a semantic match to survive.
    pub similarity_threshold: f64,

    /// Minimum health score for an agent to be a routing candidate.
    pub routing_health_threshold: f64,

    /// Overall-score boundary for the `healthy` band; `degraded` starts at
    /// 0.7 × this value.
    pub healthy_threshold: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            broker_id: "aegis-mesh".to_string(),
            token_secret: DEV_TOKEN_SECRET.to_string(),
            token_ttl: Duration::from_secs(15 * 60),
            timestamp_skew: Duration::from_secs(5 * 60),
            check_interval: Duration::from_secs(30),
            topology_update_interval: Duration::from_secs(60),
            cache_update_interval: Duration::from_secs(30),
            metrics_retention_period: Duration::from_secs(60 * 60),
            probe_connect_timeout: Duration::from_secs(5),
            probe_capability_timeout: Duration::from_secs(10),
            similarity_threshold: 0.3,
            routing_health_threshold: 0.5,
            healthy_threshold: 0.8,
        }
    }
}

impl MeshConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Replay-cache window: twice the accepted skew, so an envelope that
    /// would still pass the timestamp check always finds its nonce cached.
    pub fn nonce_window(&self) -> Duration {
        self.timestamp_skew * 2
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.token_secret == DEV_TOKEN_SECRET
    }
}
