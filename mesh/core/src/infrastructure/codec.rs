// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Envelope codec: canonical form, signatures, replay protection
//!
//! The signing input for an envelope is the envelope itself serialized with
//! `sig` set to the empty string in canonical JSON: object keys ordered
//! lexicographically at every depth, no extraneous whitespace. Signing is
//! `base64(Ed25519(canonical_bytes))`; verification re-serializes the same
//! way and checks the detached signature.
//!
//! Replay protection is a sliding-window nonce cache: an envelope whose
//! timestamp falls outside ±skew, or whose (agent, nonce) pair was already
//! seen inside the window, is rejected. The window is sized so that any
//! envelope still passing the timestamp check finds its nonce cached.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use dashmap::DashMap;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde_json::Value;
use std::time::Duration;

use crate::domain::envelope::Envelope;
use crate::domain::error::CodecError;

/// Serialize a JSON value with lexicographically ordered object keys and
/// no whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key serialization cannot fail for a String.
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar).unwrap_or_default()),
    }
}

/// The exact byte string a signature over `envelope` covers.
pub fn signing_bytes(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let mut value =
        serde_json::to_value(envelope).map_err(|e| CodecError::MalformedEnvelope(e.to_string()))?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("sig".to_string(), Value::String(String::new()));
    }
    Ok(canonical_json(&value).into_bytes())
}

/// Sign an envelope in place, replacing any previous signature.
pub fn sign_envelope(envelope: &mut Envelope, key: &SigningKey) -> Result<(), CodecError> {
    let bytes = signing_bytes(envelope)?;
    let signature = key.sign(&bytes);
    envelope.sig = STANDARD.encode(signature.to_bytes());
    Ok(())
}

/// Check an envelope's detached signature against a public key.
pub fn verify_envelope(envelope: &Envelope, key: &VerifyingKey) -> Result<(), CodecError> {
    if envelope.sig.is_empty() {
        return Err(CodecError::SignatureInvalid("missing signature".to_string()));
    }
    let decoded = STANDARD
        .decode(&envelope.sig)
        .map_err(|e| CodecError::SignatureInvalid(format!("invalid base64 signature: {e}")))?;
    let sig_bytes: [u8; 64] = decoded
        .try_into()
        .map_err(|_| CodecError::SignatureInvalid("invalid signature length (must be 64 bytes)".to_string()))?;
    let signature = Signature::from_bytes(&sig_bytes);
    let bytes = signing_bytes(envelope)?;
    key.verify(&bytes, &signature)
        .map_err(|e| CodecError::SignatureInvalid(format!("signature verification failed: {e}")))
}

/// Base64 encode/decode helpers for Ed25519 key material.
pub struct KeyCodec;

impl KeyCodec {
    pub fn encode_public_key(key: &VerifyingKey) -> String {
        STANDARD.encode(key.as_bytes())
    }

    pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey, CodecError> {
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| CodecError::SignatureInvalid(format!("invalid base64 public key: {e}")))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| CodecError::SignatureInvalid("invalid public key length (must be 32 bytes)".to_string()))?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CodecError::SignatureInvalid(format!("invalid public key: {e}")))
    }

    pub fn encode_private_key(key: &SigningKey) -> String {
        STANDARD.encode(key.to_bytes())
    }

    pub fn decode_private_key(encoded: &str) -> Result<SigningKey, CodecError> {
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| CodecError::SignatureInvalid(format!("invalid base64 private key: {e}")))?;
        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|_| CodecError::SignatureInvalid("invalid private key length (must be 32 bytes)".to_string()))?;
        Ok(SigningKey::from_bytes(&bytes))
    }
}

/// Timestamp-skew and nonce checks for inbound envelopes.
///
/// Nonces are cached per (agent, nonce) with their arrival time; the cache
/// slides forward as [`EnvelopeValidator::purge_expired`] runs (wired to
/// the federation manager's maintenance loop).
pub struct EnvelopeValidator {
    skew: Duration,
    window: Duration,
    nonces: DashMap<(String, String), i64>,
}

impl EnvelopeValidator {
    pub fn new(skew: Duration, window: Duration) -> Self {
        Self {
            skew,
            window,
            nonces: DashMap::new(),
        }
    }

    /// Reject skewed timestamps and replayed nonces; record fresh nonces.
    ///
    /// Two envelopes from one agent with equal nonce inside the window are
    /// a replay regardless of their payload: only the first is honored.
    pub fn validate(&self, envelope: &Envelope) -> Result<(), CodecError> {
        self.validate_at(envelope, Utc::now().timestamp_millis())
    }

    fn validate_at(&self, envelope: &Envelope, now_ms: i64) -> Result<(), CodecError> {
        let skew_ms = self.skew.as_millis() as i64;
        if (now_ms - envelope.ts).abs() > skew_ms {
            return Err(CodecError::ReplayRejected(format!(
                "timestamp {} outside ±{}ms window",
                envelope.ts, skew_ms
            )));
        }

        if envelope.nonce.is_empty() {
            return Err(CodecError::ReplayRejected("empty nonce".to_string()));
        }

        let key = (envelope.agent.clone(), envelope.nonce.clone());
        let window_ms = self.window.as_millis() as i64;
        // Entry API keeps check-and-insert atomic per shard, so two racing
        // copies of the same envelope cannot both pass.
        match self.nonces.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut seen) => {
                if now_ms - *seen.get() <= window_ms {
                    return Err(CodecError::ReplayRejected(format!(
                        "duplicate nonce {} from {}",
                        envelope.nonce, envelope.agent
                    )));
                }
                // Stale entry the purge loop has not reached yet.
                *seen.get_mut() = now_ms;
                Ok(())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now_ms);
                Ok(())
            }
        }
    }

    /// Drop cache entries older than the window.
    pub fn purge_expired(&self) {
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = self.window.as_millis() as i64;
        self.nonces.retain(|_, seen| now_ms - *seen <= window_ms);
    }

    pub fn cached_nonces(&self) -> usize {
        self.nonces.len()
    }
}
