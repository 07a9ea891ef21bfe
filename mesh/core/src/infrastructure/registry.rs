// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # MCP Registry
//!
//! In-memory directory of agents and the tools their active bodies expose.
//! Two maps live under one reader-writer lock: `agents` keyed by agent id,
//! and the derived `tools` index keyed by `agent-id + "/" + tool-name`.
//!
//! Invariant: an entry exists in `tools` iff the referenced agent's current
//! body definition exposes that tool. Every mutation re-derives the index
//! inside the same critical section, so readers never observe a half
//! registered agent. The lock is never held across network I/O.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::agent::{AgentId, AgentRecord};
use crate::domain::tool::{
    matches_any_capability, DiscoveredTool, DiscoveredToolMetadata, RegisteredTool, ToolQuery,
};

#[derive(Default)]
struct RegistryState {
    agents: HashMap<AgentId, AgentRecord>,
    tools: HashMap<String, RegisteredTool>,
}

impl RegistryState {
    /// Rebuild the slice of the tool index contributed by one agent.
    fn reindex_agent(&mut self, agent_id: &AgentId) {
        self.tools.retain(|_, t| &t.agent_id != agent_id);
        let Some(record) = self.agents.get(agent_id) else {
            return;
        };
        let (Some(body), Some(endpoint)) = (&record.body, &record.mcp_endpoint) else {
            return;
        };
        let now = Utc::now();
        for tool in &body.tools {
            let entry = RegisteredTool {
                agent_id: agent_id.clone(),
                tool: tool.clone(),
                endpoint: endpoint.clone(),
                environment: body.environment.clone(),
                registered_at: record.registered_at,
                last_seen: now,
            };
            self.tools.insert(RegisteredTool::key(agent_id, &tool.name), entry);
        }
    }
}

/// Thread-safe agent/tool directory. All public methods take the lock in
/// shared or exclusive mode as appropriate.
#[derive(Default)]
pub struct McpRegistry {
    state: RwLock<RegistryState>,
}

impl McpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent replace: a re-registration overwrites the record and
    /// re-derives its tool index entries.
    pub async fn register_agent(&self, record: AgentRecord) {
        let id = record.id.clone();
        let mut state = self.state.write().await;
        state.agents.insert(id.clone(), record);
        state.reindex_agent(&id);
        debug!(agent = %id, "agent registered");
    }

    /// Remove the record and every tool it contributed, atomically.
    pub async fn unregister_agent(&self, id: &AgentId) -> bool {
        let mut state = self.state.write().await;
        let existed = state.agents.remove(id).is_some();
        state.tools.retain(|_, t| &t.agent_id != id);
        if existed {
            debug!(agent = %id, "agent unregistered");
        }
        existed
    }

    /// Refresh `last-seen` on the record and all its tools.
    pub async fn update_heartbeat(&self, id: &AgentId) -> bool {
        let mut state = self.state.write().await;
        let Some(record) = state.agents.get_mut(id) else {
            return false;
        };
        record.touch();
        let now = Utc::now();
        for tool in state.tools.values_mut().filter(|t| &t.agent_id == id) {
            tool.last_seen = now;
        }
        true
    }

    /// Swap the agent's body definition and re-index its tools.
    pub async fn apply_embodiment(
        &self,
        id: &AgentId,
        environment: String,
        body: crate::domain::tool::BodyDefinition,
        mcp_endpoint: Option<String>,
    ) -> bool {
        let mut state = self.state.write().await;
        let Some(record) = state.agents.get_mut(id) else {
            return false;
        };
        if let Some(endpoint) = mcp_endpoint {
            record.mcp_endpoint = Some(endpoint);
        }
        record.embody(Some(environment), body);
        state.reindex_agent(id);
        true
    }

    pub async fn get_agent(&self, id: &AgentId) -> Option<AgentRecord> {
        self.state.read().await.agents.get(id).cloned()
    }

    pub async fn list_agents(&self) -> Vec<AgentRecord> {
        self.state.read().await.agents.values().cloned().collect()
    }

    pub async fn agent_count(&self) -> usize {
        self.state.read().await.agents.len()
    }

    pub async fn tool_count(&self) -> usize {
        self.state.read().await.tools.len()
    }

    /// Ids of agents whose current body exposes `tool_name`.
    pub async fn agents_for_tool(&self, tool_name: &str) -> Vec<AgentId> {
        let state = self.state.read().await;
        let mut ids: Vec<AgentId> = state
            .tools
            .values()
            .filter(|t| t.tool.name == tool_name)
            .map(|t| t.agent_id.clone())
            .collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        ids.dedup();
        ids
    }

    /// Pattern-based discovery, grouped by agent.
    ///
    /// `max_results` caps matched tool records BEFORE grouping (0 = no
    /// limit), so a group may carry a truncated tool list. An environment
    /// filter that matches nothing yields an empty result, not an error.
    pub async fn discover_tools(&self, query: &ToolQuery) -> Vec<DiscoveredTool> {
        let state = self.state.read().await;

        let mut matched: Vec<&RegisteredTool> = state
            .tools
            .values()
            .filter(|t| matches_any_capability(&t.tool.name, &query.capabilities))
            .filter(|t| {
                query
                    .environment_type
                    .as_ref()
                    .map(|env| &t.environment == env)
                    .unwrap_or(true)
            })
            .collect();
        // Deterministic order before the cap is applied.
        matched.sort_by(|a, b| (&a.agent_id.0, &a.tool.name).cmp(&(&b.agent_id.0, &b.tool.name)));

        if query.max_results > 0 {
            matched.truncate(query.max_results);
        }

        let mut groups: Vec<DiscoveredTool> = Vec::new();
        for tool in matched {
            let index = match groups.iter().position(|g| g.agent_id == tool.agent_id) {
                Some(index) => index,
                None => {
                    // Index invariant: every tool entry has a live agent.
                    let Some(record) = state.agents.get(&tool.agent_id) else {
                        continue;
                    };
                    groups.push(DiscoveredTool {
                        agent_id: tool.agent_id.clone(),
                        mcp_endpoint: tool.endpoint.clone(),
                        capabilities: record.capabilities.clone(),
                        environment_type: tool.environment.clone(),
                        mcp_tools: Vec::new(),
                        metadata: DiscoveredToolMetadata::stub(record.last_seen),
                    });
                    groups.len() - 1
                }
            };
            groups[index].mcp_tools.push(tool.tool.clone());
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::{BodyDefinition, McpTool};

    fn agent_with_tools(id: &str, env: &str, tools: &[&str]) -> AgentRecord {
        let mut record = AgentRecord::new(AgentId::from(id), "cHVibGljLWtleQ==".to_string());
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

    #[tokio::test]
    async fn test_register_and_discover() {
        let registry = McpRegistry::new();
        registry
            .register_agent(agent_with_tools("a1", "local", &["math.add", "math.multiply"]))
            .await;

        let query = ToolQuery {
            capabilities: vec!["math.*".into()],
            ..Default::default()
        };
        let results = registry.discover_tools(&query).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent_id.as_str(), "a1");
        assert_eq!(results[0].mcp_tools.len(), 2);
    }

    #[tokio::test]
    async fn test_pattern_precision() {
        let registry = McpRegistry::new();
        registry.register_agent(agent_with_tools("a1", "local", &["file.read"])).await;
        registry.register_agent(agent_with_tools("a2", "local", &["math.add"])).await;

        let query = ToolQuery {
            capabilities: vec!["file.*".into()],
            ..Default::default()
        };
        let results = registry.discover_tools(&query).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent_id.as_str(), "a1");
    }

    #[tokio::test]
    async fn test_embodiment_swap_replaces_tools() {
        let registry = McpRegistry::new();
        registry
            .register_agent(agent_with_tools("a1", "local", &["math.add", "math.multiply"]))
            .await;

        let swapped = registry
            .apply_embodiment(
                &AgentId::from("a1"),
                "production".to_string(),
                BodyDefinition {
                    name: "a1-body".into(),
                    environment: "production".into(),
                    capabilities: vec![],
                    tools: vec![McpTool::new("math.add", ""), McpTool::new("math.divide", "")],
                },
                None,
            )
            .await;
        assert!(swapped);

        let query = ToolQuery {
            capabilities: vec!["math.*".into()],
            environment_type: Some("production".into()),
            ..Default::default()
        };
        let results = registry.discover_tools(&query).await;
        assert_eq!(results.len(), 1);
        let names: Vec<&str> = results[0].mcp_tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["math.add", "math.divide"]);

        // The old environment no longer matches anything.
        let stale = ToolQuery {
            capabilities: vec!["math.*".into()],
            environment_type: Some("local".into()),
            ..Default::default()
        };
        assert!(registry.discover_tools(&stale).await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_removes_all_tools() {
        let registry = McpRegistry::new();
        registry
            .register_agent(agent_with_tools("a1", "local", &["math.add", "file.read"]))
            .await;
        assert_eq!(registry.tool_count().await, 2);

        assert!(registry.unregister_agent(&AgentId::from("a1")).await);
        assert!(registry.get_agent(&AgentId::from("a1")).await.is_none());
        assert_eq!(registry.tool_count().await, 0);
    }

    #[tokio::test]
    async fn test_max_results_caps_tools_before_grouping() {
        let registry = McpRegistry::new();
        registry
            .register_agent(agent_with_tools("a1", "local", &["math.add", "math.multiply"]))
            .await;
        registry.register_agent(agent_with_tools("a2", "local", &["math.divide"])).await;

        let query = ToolQuery {
            capabilities: vec!["math.*".into()],
            max_results: 2,
            ..Default::default()
        };
        let results = registry.discover_tools(&query).await;
        let total_tools: usize = results.iter().map(|g| g.mcp_tools.len()).sum();
        assert_eq!(total_tools, 2);
    }

    #[tokio::test]
    async fn test_max_results_zero_means_no_limit() {
        let registry = McpRegistry::new();
        registry
            .register_agent(agent_with_tools("a1", "local", &["math.add", "math.multiply"]))
            .await;

        let query = ToolQuery {
            capabilities: vec![],
            max_results: 0,
            ..Default::default()
        };
        let results = registry.discover_tools(&query).await;
        assert_eq!(results[0].mcp_tools.len(), 2);
    }

    #[tokio::test]
    async fn test_unmatched_environment_yields_empty() {
        let registry = McpRegistry::new();
        registry.register_agent(agent_with_tools("a1", "local", &["math.add"])).await;

        let query = ToolQuery {
            capabilities: vec!["math.*".into()],
            environment_type: Some("orbital".into()),
            ..Default::default()
        };
        assert!(registry.discover_tools(&query).await.is_empty());
    }

    #[tokio::test]
    async fn test_agents_for_tool() {
        let registry = McpRegistry::new();
        registry.register_agent(agent_with_tools("a1", "local", &["math.add"])).await;
        registry.register_agent(agent_with_tools("a2", "local", &["math.add"])).await;

        let ids = registry.agents_for_tool("math.add").await;
        assert_eq!(ids.len(), 2);
    }
}
