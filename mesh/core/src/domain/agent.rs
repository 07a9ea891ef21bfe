// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tool::BodyDefinition;

/// Stable identifier an agent chooses at first registration and keeps for
/// the lifetime of its keypair (e.g. `"fem-coder-7f3a"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An agent's long-lived cryptographic identity: the id it registered under
/// and the Ed25519 public key every envelope from that id must verify against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub id: AgentId,
    /// Base64-encoded 32-byte Ed25519 public key.
    pub public_key: String,
}

/// The broker-side record of a registered agent.
///
/// Created by `registerAgent`, refreshed by heartbeats, replaced in part by
/// `embodimentUpdate`, removed by `revoke`. The registry keeps its derived
/// tool index consistent with `body` at all times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    /// Base64-encoded Ed25519 public key carried in the first registration.
    pub public_key: String,
    /// Coarse capability tags the agent advertises (e.g. `"math"`, `"file"`).
    pub capabilities: Vec<String>,
    /// HTTP endpoint serving the agent's MCP `tools/call` surface.
    pub mcp_endpoint: Option<String>,
    /// Deployment environment tag (`"local"`, `"production"`, ...).
    pub environment: Option<String>,
    /// The active body definition; one per agent at a time.
    pub body: Option<BodyDefinition>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl AgentRecord {
    pub fn new(id: AgentId, public_key: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            public_key,
            capabilities: Vec::new(),
            mcp_endpoint: None,
            environment: None,
            body: None,
            metadata: HashMap::new(),
            registered_at: now,
            last_seen: now,
        }
    }

    /// Swap in a new body definition (an embodiment change). The previous
    /// tool set is discarded wholesale; the registry re-indexes from the
    /// definition returned here.
    pub fn embody(&mut self, environment: Option<String>, body: BodyDefinition) {
        self.environment = environment;
        self.body = Some(body);
        self.last_seen = Utc::now();
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}
