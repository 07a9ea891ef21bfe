// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Broker Dispatcher
//!
//! Demultiplexes inbound envelopes to the registry and federation manager
//! and produces the JSON acknowledgments the transport sends back.
//!
//! Validation order for every envelope: timestamp/nonce first, then the
//! signature. A `registerAgent` from an unknown identity verifies against
//! the public key carried in its own body; every other kind from an
//! unknown identity is a signature failure. Handlers update in-memory
//! structures and return synchronously; they never block on outbound I/O.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::agent::{AgentId, AgentRecord};
use crate::domain::envelope::{Envelope, EnvelopeBody, RegisterAgentBody};
use crate::domain::error::{CodecError, DispatchError};
use crate::domain::events::MeshEvent;
use crate::infrastructure::codec::{self, EnvelopeValidator, KeyCodec};
use crate::infrastructure::token_service::CapabilityTokenService;

use super::federation_manager::FederationManager;
use super::key_store::KeyStore;

pub struct Dispatcher {
    federation: Arc<FederationManager>,
    keys: Arc<KeyStore>,
    validator: Arc<EnvelopeValidator>,
    tokens: Arc<CapabilityTokenService>,
}

impl Dispatcher {
    pub fn new(
        federation: Arc<FederationManager>,
        keys: Arc<KeyStore>,
        tokens: Arc<CapabilityTokenService>,
    ) -> Self {
        let validator = federation.validator();
        Self {
            federation,
            keys,
            validator,
            tokens,
        }
    }

    /// Decode, authenticate and route one envelope; returns the ack body.
    pub async fn dispatch(&self, raw: &[u8]) -> Result<Value, DispatchError> {
        let envelope = Envelope::from_slice(raw)?;
        envelope.envelope_kind()?;
        self.validator.validate(&envelope)?;

        let body = envelope.typed_body()?;
        self.verify_signature(&envelope, &body).await?;

        metrics::counter!("mesh_envelopes_total", "kind" => envelope.kind.clone()).increment(1);
        let agent_id = AgentId::new(envelope.agent.clone());

        // Any authenticated envelope doubles as a heartbeat: refresh the
        // sender's last-seen on its record and tools.
        self.federation.heartbeat(&agent_id).await;

        match body {
            EnvelopeBody::RegisterAgent(body) => self.handle_register_agent(agent_id, body).await,
            EnvelopeBody::EmbodimentUpdate(body) => {
                let applied = self
                    .federation
                    .apply_embodiment(
                        &agent_id,
                        body.environment_type,
                        body.body_definition,
                        Some(body.mcp_endpoint),
                    )
                    .await;
                if !applied {
                    return Err(DispatchError::Codec(CodecError::MalformedEnvelope(format!(
                        "embodiment update for unregistered agent {agent_id}"
                    ))));
                }
                Ok(json!({ "status": "updated" }))
            }
            EnvelopeBody::DiscoverTools(body) => {
                let tools = self.federation.discover_tools(&body.query).await;
                let total: usize = tools.iter().map(|g| g.mcp_tools.len()).sum();
                Ok(json!({
                    "status": "success",
                    "requestId": body.request_id,
                    "tools": tools,
                    "totalResults": total,
                    "hasMore": false,
                }))
            }
            EnvelopeBody::ToolCall(body) => {
                let context = Default::default();
                let decision = self
                    .federation
                    .route_tool_invocation(&body.tool, None, &context)
                    .await?;
                // The actual invocation happens on the owning agent's MCP
                // endpoint; the broker only acknowledges the routing.
                Ok(json!({
                    "status": "processing",
                    "tool": body.tool,
                    "requestId": body.request_id,
                    "routedTo": decision.selected_agent,
                }))
            }
            EnvelopeBody::ToolResult(body) => {
                self.federation
                    .record_route_outcome(&agent_id, body.success, body.duration_ms)
                    .await;
                debug!(request = %body.request_id, success = body.success, "tool result recorded");
                Ok(json!({ "status": "acknowledged", "requestId": body.request_id }))
            }
            EnvelopeBody::RegisterBroker(body) => {
                self.federation.register_broker(&body).await;
                info!(broker = %body.broker_id, endpoint = %body.endpoint, "federated broker registered");
                Ok(json!({ "status": "registered", "broker": body.broker_id }))
            }
            EnvelopeBody::EmitEvent(body) => {
                self.federation.events().publish(MeshEvent::AgentEvent {
                    agent_id,
                    event: body.event.clone(),
                    payload: body.payload,
                });
                Ok(json!({ "status": "emitted", "event": body.event }))
            }
            EnvelopeBody::RenderInstruction(body) => {
                debug!(agent = %agent_id, instruction = %body.instruction, "render instruction received");
                Ok(json!({ "status": "rendered", "instruction": body.instruction }))
            }
            EnvelopeBody::Revoke(body) => {
                let target = AgentId::new(body.target.clone());
                let removed = self.federation.revoke_agent(&target, body.reason).await;
                self.keys.remove(&target).await;
                Ok(json!({ "status": "revoked", "target": body.target, "removed": removed }))
            }
            EnvelopeBody::ToolsDiscovered(body) => {
                // Broker-to-broker result relay; correlation is the
                // requesting side's concern.
                debug!(request = %body.request_id, results = body.total_results, "discovery results received");
                Ok(json!({ "status": "acknowledged", "requestId": body.request_id }))
            }
        }
    }

    /// Every accepted envelope verifies under the key registered for its
    /// agent id. The sole exception: a first `registerAgent`, which must
    /// verify under the key its body carries.
    async fn verify_signature(
        &self,
        envelope: &Envelope,
        body: &EnvelopeBody,
    ) -> Result<(), DispatchError> {
        let agent_id = AgentId::new(envelope.agent.clone());
        if let Some(known) = self.keys.get(&agent_id).await {
            codec::verify_envelope(envelope, &known)?;
            return Ok(());
        }
        match body {
            EnvelopeBody::RegisterAgent(register) => {
                let claimed = KeyCodec::decode_public_key(&register.pubkey)?;
                codec::verify_envelope(envelope, &claimed)?;
                Ok(())
            }
            _ => {
                warn!(agent = %envelope.agent, kind = %envelope.kind, "envelope from unknown identity");
                Err(CodecError::SignatureInvalid(format!(
                    "no registered key for agent {}",
                    envelope.agent
                ))
                .into())
            }
        }
    }

    async fn handle_register_agent(
        &self,
        agent_id: AgentId,
        body: RegisterAgentBody,
    ) -> Result<Value, DispatchError> {
        let key = KeyCodec::decode_public_key(&body.pubkey)?;

        let mut record = AgentRecord::new(agent_id.clone(), body.pubkey.clone());
        record.capabilities = body.capabilities.clone();
        record.mcp_endpoint = body.mcp_endpoint.clone();
        record.environment = body.environment_type.clone();
        record.metadata = body.metadata;
        if let Some(definition) = body.body_definition {
            record.environment = Some(definition.environment.clone());
            record.body = Some(definition);
        }
        record.registered_at = Utc::now();

        self.keys.put(agent_id.clone(), key).await;
        self.federation.register_agent(record).await;

        let token = self
            .tokens
            .issue("tools:invoke", agent_id.as_str(), vec!["*".to_string()], None)?;

        info!(agent = %agent_id, "agent registered");
        Ok(json!({
            "status": "registered",
            "agent": agent_id,
            "capabilityToken": token,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;
    use crate::domain::envelope::EnvelopeKind;
    use crate::domain::tool::{BodyDefinition, McpTool};
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;

    struct Harness {
        dispatcher: Dispatcher,
        key: SigningKey,
        counter: std::sync::atomic::AtomicU64,
    }

    impl Harness {
        fn new() -> Self {
            let federation = FederationManager::new(MeshConfig::default());
            let tokens = Arc::new(CapabilityTokenService::new(
                "test-broker",
                "test-secret",
                std::time::Duration::from_secs(900),
            ));
            Self {
                dispatcher: Dispatcher::new(federation, Arc::new(KeyStore::new()), tokens),
                key: SigningKey::generate(&mut OsRng),
                counter: std::sync::atomic::AtomicU64::new(0),
            }
        }

        fn envelope(&self, kind: EnvelopeKind, agent: &str, body: Value) -> Envelope {
            let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let mut envelope = Envelope::new(
                kind,
                agent,
                Utc::now().timestamp_millis(),
                format!("nonce-{n}"),
                body,
            );
            codec::sign_envelope(&mut envelope, &self.key).unwrap();
            envelope
        }

        fn register_body(&self, tools: &[&str]) -> Value {
            json!({
                "pubkey": KeyCodec::encode_public_key(&self.key.verifying_key()),
                "capabilities": ["math"],
                "mcpEndpoint": "http://h:8080",
                "environmentType": "local",
                "bodyDefinition": {
                    "name": "calc",
                    "environment": "local",
                    "capabilities": ["math"],
                    "tools": tools.iter().map(|t| McpTool::new(*t, "")).collect::<Vec<_>>(),
                },
            })
        }

        async fn dispatch(&self, envelope: &Envelope) -> Result<Value, DispatchError> {
            self.dispatcher
                .dispatch(serde_json::to_vec(envelope).unwrap().as_slice())
                .await
        }
    }

    #[tokio::test]
    async fn test_register_then_discover() {
        let h = Harness::new();
        let register = h.envelope(
            EnvelopeKind::RegisterAgent,
            "a1",
            h.register_body(&["math.add", "math.multiply"]),
        );
        let ack = h.dispatch(&register).await.unwrap();
        assert_eq!(ack["status"], "registered");
        assert!(ack["capabilityToken"].as_str().unwrap().contains('.'));

        let discover = h.envelope(
            EnvelopeKind::DiscoverTools,
            "a1",
            json!({ "query": { "capabilities": ["math.*"] }, "requestId": "r-1" }),
        );
        let ack = h.dispatch(&discover).await.unwrap();
        assert_eq!(ack["status"], "success");
        assert_eq!(ack["tools"].as_array().unwrap().len(), 1);
        assert_eq!(ack["totalResults"], 2);
    }

    #[tokio::test]
    async fn test_first_registration_must_self_sign() {
        let h = Harness::new();
        // Body carries a key that did not sign the envelope.
        let stranger = SigningKey::generate(&mut OsRng);
        let mut body = h.register_body(&["math.add"]);
        body["pubkey"] = json!(KeyCodec::encode_public_key(&stranger.verifying_key()));
        let register = h.envelope(EnvelopeKind::RegisterAgent, "a1", body);

        let err = h.dispatch(&register).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Codec(CodecError::SignatureInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_identity_cannot_emit() {
        let h = Harness::new();
        let emit = h.envelope(
            EnvelopeKind::EmitEvent,
            "ghost",
            json!({ "event": "boo", "payload": {} }),
        );
        let err = h.dispatch(&emit).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Codec(CodecError::SignatureInvalid(_))
        ));
    }

    #[tokio::test]
    async fn test_replayed_envelope_rejected() {
        let h = Harness::new();
        let register = h.envelope(
            EnvelopeKind::RegisterAgent,
            "a1",
            h.register_body(&["math.add"]),
        );
        h.dispatch(&register).await.unwrap();
        // Same envelope, same nonce: replay.
        let err = h.dispatch(&register).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Codec(CodecError::ReplayRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_reregistration_with_fresh_nonce_is_idempotent() {
        let h = Harness::new();
        let first = h.envelope(
            EnvelopeKind::RegisterAgent,
            "a1",
            h.register_body(&["math.add"]),
        );
        h.dispatch(&first).await.unwrap();
        let second = h.envelope(
            EnvelopeKind::RegisterAgent,
            "a1",
            h.register_body(&["math.add"]),
        );
        let ack = h.dispatch(&second).await.unwrap();
        assert_eq!(ack["status"], "registered");
    }

    #[tokio::test]
    async fn test_embodiment_update_swaps_tools() {
        let h = Harness::new();
        let register = h.envelope(
            EnvelopeKind::RegisterAgent,
            "a1",
            h.register_body(&["math.add", "math.multiply"]),
        );
        h.dispatch(&register).await.unwrap();

        let update = h.envelope(
            EnvelopeKind::EmbodimentUpdate,
            "a1",
            json!({
                "environmentType": "production",
                "mcpEndpoint": "http://h:8080",
                "bodyDefinition": {
                    "name": "calc",
                    "environment": "production",
                    "capabilities": ["math"],
                    "tools": [McpTool::new("math.add", ""), McpTool::new("math.divide", "")],
                },
                "updatedTools": [],
            }),
        );
        let ack = h.dispatch(&update).await.unwrap();
        assert_eq!(ack["status"], "updated");

        let discover = h.envelope(
            EnvelopeKind::DiscoverTools,
            "a1",
            json!({
                "query": { "capabilities": ["math.*"], "environmentType": "production" },
                "requestId": "r-2",
            }),
        );
        let ack = h.dispatch(&discover).await.unwrap();
        let tools = ack["tools"][0]["mcpTools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["math.add", "math.divide"]);
    }

    #[tokio::test]
    async fn test_revoke_removes_agent_and_key() {
        let h = Harness::new();
        let register = h.envelope(
            EnvelopeKind::RegisterAgent,
            "a1",
            h.register_body(&["math.add"]),
        );
        h.dispatch(&register).await.unwrap();

        let revoke = h.envelope(
            EnvelopeKind::Revoke,
            "a1",
            json!({ "target": "a1", "reason": "rotation" }),
        );
        let ack = h.dispatch(&revoke).await.unwrap();
        assert_eq!(ack["status"], "revoked");
        assert_eq!(ack["removed"], true);

        // The identity is gone; nothing verifies any more.
        let emit = h.envelope(EnvelopeKind::EmitEvent, "a1", json!({ "event": "x", "payload": {} }));
        assert!(h.dispatch(&emit).await.is_err());
    }

    #[tokio::test]
    async fn test_tool_call_routes_and_acks() {
        let h = Harness::new();
        let register = h.envelope(
            EnvelopeKind::RegisterAgent,
            "a1",
            h.register_body(&["math.add"]),
        );
        h.dispatch(&register).await.unwrap();

        let call = h.envelope(
            EnvelopeKind::ToolCall,
            "a1",
            json!({ "tool": "math.add", "parameters": { "a": 1, "b": 2 }, "requestId": "r-9" }),
        );
        let ack = h.dispatch(&call).await.unwrap();
        assert_eq!(ack["status"], "processing");
        assert_eq!(ack["routedTo"], "a1");
    }

    #[tokio::test]
    async fn test_tool_call_without_provider_is_unroutable() {
        let h = Harness::new();
        let register = h.envelope(
            EnvelopeKind::RegisterAgent,
            "a1",
            h.register_body(&["math.add"]),
        );
        h.dispatch(&register).await.unwrap();

        let call = h.envelope(
            EnvelopeKind::ToolCall,
            "a1",
            json!({ "tool": "ghost.tool", "parameters": {}, "requestId": "r-10" }),
        );
        let err = h.dispatch(&call).await.unwrap_err();
        assert_eq!(err.http_status(), 503);
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let h = Harness::new();
        let err = h.dispatcher.dispatch(b"{not json").await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Codec(CodecError::MalformedEnvelope(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_kind_rejected() {
        let h = Harness::new();
        let raw = json!({
            "type": "teleport",
            "agent": "a1",
            "ts": Utc::now().timestamp_millis(),
            "nonce": "n-x",
            "body": {},
            "sig": "",
        });
        let err = h
            .dispatcher
            .dispatch(raw.to_string().as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Codec(CodecError::UnknownEnvelope(_))
        ));
    }

    #[tokio::test]
    async fn test_tool_result_feeds_outcomes() {
        let h = Harness::new();
        let register = h.envelope(
            EnvelopeKind::RegisterAgent,
            "a1",
            h.register_body(&["math.add"]),
        );
        h.dispatch(&register).await.unwrap();

        let result = h.envelope(
            EnvelopeKind::ToolResult,
            "a1",
            json!({ "requestId": "r-9", "success": true, "result": { "sum": 3 }, "durationMs": 42.0 }),
        );
        let ack = h.dispatch(&result).await.unwrap();
        assert_eq!(ack["status"], "acknowledged");
    }
}
