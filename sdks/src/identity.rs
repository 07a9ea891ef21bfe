// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;

use aegis_mesh_core::infrastructure::codec::KeyCodec;

/// An agent's Ed25519 identity keypair.
///
/// The private half never leaves the agent process; only the base64 public
/// half travels in `registerAgent` bodies.
pub struct AgentKeypair {
    signing: SigningKey,
}

impl AgentKeypair {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restore an identity from its base64-encoded private key.
    pub fn from_encoded(encoded: &str) -> anyhow::Result<Self> {
        let signing = KeyCodec::decode_private_key(encoded)
            .map_err(|e| anyhow::anyhow!("invalid private key: {e}"))?;
        Ok(Self { signing })
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Base64 public key as carried in registration bodies.
    pub fn public_key_encoded(&self) -> String {
        KeyCodec::encode_public_key(&self.signing.verifying_key())
    }

    /// Base64 private key for persistence between runs.
    pub fn private_key_encoded(&self) -> String {
        KeyCodec::encode_private_key(&self.signing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_round_trip() {
        let keypair = AgentKeypair::generate();
        let restored = AgentKeypair::from_encoded(&keypair.private_key_encoded()).unwrap();
        assert_eq!(keypair.public_key_encoded(), restored.public_key_encoded());
    }

    #[test]
    fn test_invalid_encoding_rejected() {
        assert!(AgentKeypair::from_encoded("not-base64!").is_err());
    }
}
