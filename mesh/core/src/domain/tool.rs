// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool inventory types and the capability-pattern matcher.
//!
//! Tools live in a dotted namespace (`math.add`, `file.read`). Discovery
//! queries carry capability patterns restricted to three forms: an exact
//! name, a prefix followed by `*`, or the single match-all pattern `*`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::agent::AgentId;

/// A remotely callable tool an agent exposes through its MCP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    /// Fully qualified dotted name, e.g. `math.add`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-schema-shaped description of the tool's arguments.
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
}

fn default_input_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

impl McpTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: default_input_schema(),
        }
    }
}

/// The concrete tool set an agent presents in a given environment.
///
/// Agents swap bodies on environment changes (`embodimentUpdate`); only one
/// definition is active per agent at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyDefinition {
    pub name: String,
    pub environment: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tools: Vec<McpTool>,
}

/// Derived index entry: one per (agent, tool) pair currently exposed.
///
/// Keyed in the registry as `agent-id + "/" + tool.name`. An entry exists
/// iff the referenced agent's active body exposes that tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredTool {
    pub agent_id: AgentId,
    pub tool: McpTool,
    pub endpoint: String,
    pub environment: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl RegisteredTool {
    /// Index key for the registry's `tools` map.
    pub fn key(agent_id: &AgentId, tool_name: &str) -> String {
        format!("{}/{}", agent_id, tool_name)
    }
}

/// A discovery query as carried by `discoverTools` envelopes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolQuery {
    /// Capability patterns; an empty list matches every tool.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// When present, only agents in this environment match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_type: Option<String>,
    /// Caps matched tool records before grouping by agent; 0 means no limit.
    #[serde(default)]
    pub max_results: usize,
    #[serde(default)]
    pub include_metadata: bool,
}

/// Stub metadata attached to each discovered agent group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredToolMetadata {
    pub last_seen: DateTime<Utc>,
    /// EMA response time in milliseconds, from the metrics store.
    pub average_response_time: f64,
    pub trust_score: f64,
}

impl DiscoveredToolMetadata {
    pub fn stub(last_seen: DateTime<Utc>) -> Self {
        Self {
            last_seen,
            average_response_time: 0.0,
            trust_score: 1.0,
        }
    }
}

/// One agent's contribution to a discovery result: the matched tools plus
/// what a consumer needs to call them directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredTool {
    pub agent_id: AgentId,
    pub mcp_endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub environment_type: String,
    pub mcp_tools: Vec<McpTool>,
    pub metadata: DiscoveredToolMetadata,
}

/// Match a fully qualified tool name against one capability pattern.
///
/// Grammar: `*` matches everything; a trailing `*` matches by prefix;
/// anything else must match exactly.
pub fn matches_capability(tool_name: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return tool_name.starts_with(prefix);
    }
    tool_name == pattern
}

/// True if any pattern in the list matches; an empty list matches all.
pub fn matches_any_capability(tool_name: &str, patterns: &[String]) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|p| matches_capability(tool_name, p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_pattern() {
        assert!(matches_capability("math.add", "math.add"));
        assert!(!matches_capability("math.add", "math.addition"));
        assert!(!matches_capability("math.addition", "math.add"));
    }

    #[test]
    fn test_prefix_pattern() {
        assert!(matches_capability("math.add", "math.*"));
        assert!(matches_capability("math.add", "math.a*"));
        assert!(!matches_capability("file.read", "math.*"));
        // A bare prefix with no star is exact-only.
        assert!(!matches_capability("math.add", "math"));
    }

    #[test]
    fn test_match_all_pattern() {
        assert!(matches_capability("anything.at.all", "*"));
        assert!(matches_capability("", "*"));
    }

    #[test]
    fn test_empty_pattern_list_matches_everything() {
        assert!(matches_any_capability("math.add", &[]));
        assert!(matches_any_capability("math.add", &["file.*".into(), "math.*".into()]));
        assert!(!matches_any_capability("math.add", &["file.*".into()]));
    }

    #[test]
    fn test_registered_tool_key() {
        let key = RegisteredTool::key(&AgentId::from("a1"), "math.add");
        assert_eq!(key, "a1/math.add");
    }
}
