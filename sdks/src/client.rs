// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use aegis_mesh_core::domain::{BodyDefinition, DiscoveredTool, Envelope, EnvelopeKind, ToolQuery};
use aegis_mesh_core::infrastructure::codec;

use crate::identity::AgentKeypair;

#[derive(Debug, thiserror::Error)]
pub enum MeshClientError {
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Broker rejected envelope ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Client for one agent talking to one mesh broker.
///
/// Every call builds a signed envelope with a fresh nonce and posts it to
/// the broker's `/envelope` ingress.
pub struct MeshClient {
    broker_url: String,
    agent_id: String,
    keypair: AgentKeypair,
    client: Client,
}

impl MeshClient {
    pub fn new(broker_url: impl Into<String>, agent_id: impl Into<String>, keypair: AgentKeypair) -> Self {
        Self {
            broker_url: broker_url.into(),
            agent_id: agent_id.into(),
            keypair,
            client: Client::new(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Register this agent, announcing its body definition and endpoint.
    /// Returns the broker's ack, including a capability token when the
    /// broker mints one.
    pub async fn register(
        &self,
        capabilities: Vec<String>,
        mcp_endpoint: Option<String>,
        body_definition: Option<BodyDefinition>,
        environment_type: Option<String>,
    ) -> Result<Value, MeshClientError> {
        self.send(
            EnvelopeKind::RegisterAgent,
            json!({
                "pubkey": self.keypair.public_key_encoded(),
                "capabilities": capabilities,
                "mcpEndpoint": mcp_endpoint,
                "bodyDefinition": body_definition,
                "environmentType": environment_type,
            }),
        )
        .await
    }

    /// Swap this agent's body for a new environment.
    pub async fn update_embodiment(
        &self,
        environment_type: impl Into<String>,
        body_definition: BodyDefinition,
        mcp_endpoint: impl Into<String>,
    ) -> Result<Value, MeshClientError> {
        self.send(
            EnvelopeKind::EmbodimentUpdate,
            json!({
                "environmentType": environment_type.into(),
                "bodyDefinition": body_definition,
                "mcpEndpoint": mcp_endpoint.into(),
                "updatedTools": [],
            }),
        )
        .await
    }

    /// Discover tools matching the query; returns the grouped results.
    pub async fn discover_tools(&self, query: ToolQuery) -> Result<Vec<DiscoveredTool>, MeshClientError> {
        let ack = self
            .send(
                EnvelopeKind::DiscoverTools,
                json!({ "query": query, "requestId": Uuid::new_v4().to_string() }),
            )
            .await?;
        let tools = ack
            .get("tools")
            .cloned()
            .unwrap_or_else(|| json!([]));
        serde_json::from_value(tools).map_err(|e| MeshClientError::Rejected {
            status: 200,
            message: format!("unexpected discovery payload: {e}"),
        })
    }

    /// Ask the broker to route a call; the invocation itself goes to the
    /// owning agent's MCP endpoint.
    pub async fn call_tool(&self, tool: impl Into<String>, parameters: Value) -> Result<Value, MeshClientError> {
        self.send(
            EnvelopeKind::ToolCall,
            json!({
                "tool": tool.into(),
                "parameters": parameters,
                "requestId": Uuid::new_v4().to_string(),
            }),
        )
        .await
    }

    /// Report a completed call back to the broker.
    pub async fn report_result(
        &self,
        request_id: impl Into<String>,
        success: bool,
        result: Option<Value>,
        error: Option<String>,
        duration_ms: Option<f64>,
    ) -> Result<Value, MeshClientError> {
        self.send(
            EnvelopeKind::ToolResult,
            json!({
                "requestId": request_id.into(),
                "success": success,
                "result": result,
                "error": error,
                "durationMs": duration_ms,
            }),
        )
        .await
    }

    /// Refresh this agent's last-seen on the broker. Any signed envelope
    /// doubles as a heartbeat; this one carries nothing else.
    pub async fn heartbeat(&self) -> Result<Value, MeshClientError> {
        self.emit_event("heartbeat", json!({})).await
    }

    /// Publish an application event onto the broker's event bus.
    pub async fn emit_event(&self, event: impl Into<String>, payload: Value) -> Result<Value, MeshClientError> {
        self.send(
            EnvelopeKind::EmitEvent,
            json!({ "event": event.into(), "payload": payload }),
        )
        .await
    }

    /// Withdraw this agent's identity and tools.
    pub async fn revoke(&self, reason: Option<String>) -> Result<Value, MeshClientError> {
        self.send(
            EnvelopeKind::Revoke,
            json!({ "target": self.agent_id, "reason": reason }),
        )
        .await
    }

    async fn send(&self, kind: EnvelopeKind, body: Value) -> Result<Value, MeshClientError> {
        let mut envelope = Envelope::new(
            kind,
            self.agent_id.clone(),
            Utc::now().timestamp_millis(),
            Uuid::new_v4().to_string(),
            body,
        );
        codec::sign_envelope(&mut envelope, self.keypair.signing_key())
            .map_err(|e| MeshClientError::Signing(e.to_string()))?;

        let response = self
            .client
            .post(format!("{}/envelope", self.broker_url.trim_end_matches('/')))
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() {
            return Err(MeshClientError::Rejected {
                status: status.as_u16(),
                message: payload
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_mesh_core::domain::McpTool;

    fn body_definition() -> BodyDefinition {
        BodyDefinition {
            name: "calc".into(),
            environment: "local".into(),
            capabilities: vec!["math".into()],
            tools: vec![McpTool::new("math.add", "add two numbers")],
        }
    }

    #[tokio::test]
    async fn test_register_posts_signed_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/envelope")
            .match_body(mockito::Matcher::PartialJson(json!({
                "type": "registerAgent",
                "agent": "calc-1",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"registered","agent":"calc-1"}"#)
            .create_async()
            .await;

        let client = MeshClient::new(server.url(), "calc-1", AgentKeypair::generate());
        let ack = client
            .register(vec!["math".into()], Some("http://h:9000".into()), Some(body_definition()), Some("local".into()))
            .await
            .unwrap();
        assert_eq!(ack["status"], "registered");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejection_surfaces_broker_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/envelope")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"Signature invalid: no registered key"}"#)
            .create_async()
            .await;

        let client = MeshClient::new(server.url(), "calc-1", AgentKeypair::generate());
        let err = client.emit_event("boot", json!({})).await.unwrap_err();
        match err {
            MeshClientError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("Signature"));
            }
            other => panic!("Expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_discover_parses_grouped_tools() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/envelope")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"success","tools":[{"agentId":"a1","mcpEndpoint":"http://h:8080","capabilities":[],"environmentType":"local","mcpTools":[{"name":"math.add","description":"","inputSchema":{"type":"object"}}],"metadata":{"lastSeen":"2026-01-01T00:00:00Z","averageResponseTime":12.5,"trustScore":0.9}}],"totalResults":1,"hasMore":false}"#,
            )
            .create_async()
            .await;

        let client = MeshClient::new(server.url(), "consumer-1", AgentKeypair::generate());
        let tools = client
            .discover_tools(ToolQuery {
                capabilities: vec!["math.*".into()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].agent_id.as_str(), "a1");
        assert_eq!(tools[0].mcp_tools[0].name, "math.add");
    }
}
