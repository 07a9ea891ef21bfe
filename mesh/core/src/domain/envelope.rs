// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Signed control-plane envelopes
//!
//! Every control message between an agent and the broker is a JSON envelope
//! with fixed headers and a kind-specific body:
//!
//! ```json
//! { "type": "registerAgent", "agent": "a1", "ts": 1722470400000,
//!   "nonce": "…", "body": { … }, "sig": "base64(ed25519)" }
//! ```
//!
//! Parsing is two-phase: a message first decodes into [`Envelope`] with the
//! body kept as raw JSON, then — once the kind is known — the body decodes
//! into the matching [`EnvelopeBody`] variant. The signature covers the
//! whole envelope serialized canonically with `sig` set to the empty
//! string; see [`crate::infrastructure::codec`].

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::CodecError;
use crate::domain::tool::{BodyDefinition, DiscoveredTool, McpTool, ToolQuery};

/// Discriminator for the ten envelope body shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeKind {
    RegisterAgent,
    RegisterBroker,
    EmitEvent,
    RenderInstruction,
    ToolCall,
    ToolResult,
    Revoke,
    DiscoverTools,
    ToolsDiscovered,
    EmbodimentUpdate,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegisterAgent => "registerAgent",
            Self::RegisterBroker => "registerBroker",
            Self::EmitEvent => "emitEvent",
            Self::RenderInstruction => "renderInstruction",
            Self::ToolCall => "toolCall",
            Self::ToolResult => "toolResult",
            Self::Revoke => "revoke",
            Self::DiscoverTools => "discoverTools",
            Self::ToolsDiscovered => "toolsDiscovered",
            Self::EmbodimentUpdate => "embodimentUpdate",
        }
    }
}

impl FromStr for EnvelopeKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registerAgent" => Ok(Self::RegisterAgent),
            "registerBroker" => Ok(Self::RegisterBroker),
            "emitEvent" => Ok(Self::EmitEvent),
            "renderInstruction" => Ok(Self::RenderInstruction),
            "toolCall" => Ok(Self::ToolCall),
            "toolResult" => Ok(Self::ToolResult),
            "revoke" => Ok(Self::Revoke),
            "discoverTools" => Ok(Self::DiscoverTools),
            "toolsDiscovered" => Ok(Self::ToolsDiscovered),
            "embodimentUpdate" => Ok(Self::EmbodimentUpdate),
            other => Err(CodecError::UnknownEnvelope(other.to_string())),
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control-plane envelope with its body still in raw JSON form.
///
/// `kind` is kept as a free string at this stage so an unrecognized value
/// surfaces as [`CodecError::UnknownEnvelope`] rather than a generic parse
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub agent: String,
    /// Sender clock, unix milliseconds.
    pub ts: i64,
    pub nonce: String,
    pub body: Value,
    /// Base64 Ed25519 detached signature; empty while signing.
    #[serde(default)]
    pub sig: String,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, agent: impl Into<String>, ts: i64, nonce: impl Into<String>, body: Value) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            agent: agent.into(),
            ts,
            nonce: nonce.into(),
            body,
            sig: String::new(),
        }
    }

    /// Parse raw bytes into an envelope, body left undecoded.
    pub fn from_slice(raw: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(raw).map_err(|e| CodecError::MalformedEnvelope(e.to_string()))
    }

    /// Resolve the kind discriminator.
    pub fn envelope_kind(&self) -> Result<EnvelopeKind, CodecError> {
        self.kind.parse()
    }

    /// Second decode phase: interpret the raw body according to the kind.
    pub fn typed_body(&self) -> Result<EnvelopeBody, CodecError> {
        let kind = self.envelope_kind()?;
        let body = self.body.clone();
        let decoded = match kind {
            EnvelopeKind::RegisterAgent => EnvelopeBody::RegisterAgent(decode(body)?),
            EnvelopeKind::RegisterBroker => EnvelopeBody::RegisterBroker(decode(body)?),
            EnvelopeKind::EmitEvent => EnvelopeBody::EmitEvent(decode(body)?),
            EnvelopeKind::RenderInstruction => EnvelopeBody::RenderInstruction(decode(body)?),
            EnvelopeKind::ToolCall => EnvelopeBody::ToolCall(decode(body)?),
            EnvelopeKind::ToolResult => EnvelopeBody::ToolResult(decode(body)?),
            EnvelopeKind::Revoke => EnvelopeBody::Revoke(decode(body)?),
            EnvelopeKind::DiscoverTools => EnvelopeBody::DiscoverTools(decode(body)?),
            EnvelopeKind::ToolsDiscovered => EnvelopeBody::ToolsDiscovered(decode(body)?),
            EnvelopeKind::EmbodimentUpdate => EnvelopeBody::EmbodimentUpdate(decode(body)?),
        };
        Ok(decoded)
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, CodecError> {
    serde_json::from_value(body).map_err(|e| CodecError::MalformedEnvelope(e.to_string()))
}

/// The typed variants behind [`Envelope::body`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EnvelopeBody {
    RegisterAgent(RegisterAgentBody),
    RegisterBroker(RegisterBrokerBody),
    EmitEvent(EmitEventBody),
    RenderInstruction(RenderInstructionBody),
    ToolCall(ToolCallBody),
    ToolResult(ToolResultBody),
    Revoke(RevokeBody),
    DiscoverTools(DiscoverToolsBody),
    ToolsDiscovered(ToolsDiscoveredBody),
    EmbodimentUpdate(EmbodimentUpdateBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentBody {
    /// Base64 Ed25519 public key. A first registration must be signed by
    /// this very key.
    pub pubkey: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_definition: Option<BodyDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_type: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBrokerBody {
    pub broker_id: String,
    pub endpoint: String,
    pub pubkey: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitEventBody {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderInstructionBody {
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallBody {
    pub tool: String,
    #[serde(default)]
    pub parameters: Value,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultBody {
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock the call took on the serving agent, in milliseconds.
    /// Feeds adaptive load balancing when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeBody {
    /// Agent id whose identity and tools are withdrawn.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverToolsBody {
    pub query: ToolQuery,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsDiscoveredBody {
    pub request_id: String,
    pub tools: Vec<DiscoveredTool>,
    pub total_results: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbodimentUpdateBody {
    pub environment_type: String,
    pub body_definition: BodyDefinition,
    pub mcp_endpoint: String,
    #[serde(default)]
    pub updated_tools: Vec<McpTool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            EnvelopeKind::RegisterAgent,
            EnvelopeKind::RegisterBroker,
            EnvelopeKind::EmitEvent,
            EnvelopeKind::RenderInstruction,
            EnvelopeKind::ToolCall,
            EnvelopeKind::ToolResult,
            EnvelopeKind::Revoke,
            EnvelopeKind::DiscoverTools,
            EnvelopeKind::ToolsDiscovered,
            EnvelopeKind::EmbodimentUpdate,
        ] {
            assert_eq!(kind.as_str().parse::<EnvelopeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_its_own_error() {
        let raw = json!({
            "type": "selfDestruct",
            "agent": "a1",
            "ts": 1_722_470_400_000i64,
            "nonce": "n-1",
            "body": {},
            "sig": ""
        });
        let env = Envelope::from_slice(raw.to_string().as_bytes()).unwrap();
        assert!(matches!(env.envelope_kind(), Err(CodecError::UnknownEnvelope(_))));
    }

    #[test]
    fn test_two_phase_decode() {
        let raw = json!({
            "type": "toolCall",
            "agent": "a1",
            "ts": 1_722_470_400_000i64,
            "nonce": "n-2",
            "body": { "tool": "math.add", "parameters": {"a": 1, "b": 2}, "requestId": "r-1" },
            "sig": ""
        });
        let env = Envelope::from_slice(raw.to_string().as_bytes()).unwrap();
        match env.typed_body().unwrap() {
            EnvelopeBody::ToolCall(call) => {
                assert_eq!(call.tool, "math.add");
                assert_eq!(call.request_id, "r-1");
            }
            other => panic!("Expected ToolCall body, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_body_for_kind() {
        let raw = json!({
            "type": "toolCall",
            "agent": "a1",
            "ts": 0i64,
            "nonce": "n-3",
            "body": { "not": "a tool call" },
            "sig": ""
        });
        let env = Envelope::from_slice(raw.to_string().as_bytes()).unwrap();
        assert!(matches!(env.typed_body(), Err(CodecError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_envelope_serde_round_trip_preserves_sig() {
        let env = Envelope {
            kind: "emitEvent".into(),
            agent: "a1".into(),
            ts: 42,
            nonce: "n".into(),
            body: json!({"event": "boot", "payload": {}}),
            sig: "c2lnbmF0dXJl".into(),
        };
        let bytes = serde_json::to_vec(&env).unwrap();
        let back = Envelope::from_slice(&bytes).unwrap();
        assert_eq!(back.sig, env.sig);
        assert_eq!(back.nonce, env.nonce);
        assert_eq!(back.body, env.body);
    }
}
