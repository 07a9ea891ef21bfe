// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::agent::AgentId;
use crate::domain::federation::{BalanceMode, BrokerStatus};

/// Domain events published on the mesh event bus.
///
/// Observability only: nothing in the core consumes these to make
/// decisions, so a lagging or absent subscriber never affects dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeshEvent {
    AgentRegistered {
        agent_id: AgentId,
        tool_count: usize,
        registered_at: DateTime<Utc>,
    },
    AgentRevoked {
        agent_id: AgentId,
        reason: Option<String>,
        revoked_at: DateTime<Utc>,
    },
    EmbodimentChanged {
        agent_id: AgentId,
        environment: String,
        tool_count: usize,
        changed_at: DateTime<Utc>,
    },
    BrokerRegistered {
        broker_id: String,
        endpoint: String,
        registered_at: DateTime<Utc>,
    },
    BrokerStatusChanged {
        broker_id: String,
        status: BrokerStatus,
        trust_score: f64,
    },
    AgentHealthChanged {
        agent_id: AgentId,
        health_score: f64,
        reachable: bool,
    },
    RoutingDecided {
        tool: String,
        selected_agent: AgentId,
        mode: BalanceMode,
        decided_at: DateTime<Utc>,
    },
    AgentEvent {
        agent_id: AgentId,
        event: String,
        payload: Value,
    },
}
