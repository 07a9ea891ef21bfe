// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use ed25519_dalek::VerifyingKey;
use tokio::sync::RwLock;

use crate::domain::agent::AgentId;

/// In-memory store of agent verification keys.
///
/// Constructed at broker startup and passed to the dispatcher explicitly
/// so tests can seed identities without going through registration.
#[derive(Default)]
pub struct KeyStore {
    keys: RwLock<HashMap<AgentId, VerifyingKey>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &AgentId) -> Option<VerifyingKey> {
        self.keys.read().await.get(id).copied()
    }

    pub async fn put(&self, id: AgentId, key: VerifyingKey) {
        self.keys.write().await.insert(id, key);
    }

    pub async fn remove(&self, id: &AgentId) -> bool {
        self.keys.write().await.remove(id).is_some()
    }

    pub async fn contains(&self, id: &AgentId) -> bool {
        self.keys.read().await.contains_key(id)
    }
}
