// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by a short-lived bearer token inside a trust domain.
///
/// Tokens are signed with a symmetric secret shared across the domain's
/// brokers (HMAC-SHA256); see
/// [`crate::infrastructure::token_service::CapabilityTokenService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityToken {
    /// Unique token id (one-time nonce).
    pub jti: String,
    /// What the bearer may act on, e.g. `"tools:invoke"`.
    pub scope: String,
    /// Broker that minted the token.
    pub iss: String,
    /// Agent the token was minted for.
    pub sub: String,
    /// Granted permissions; `"*"` grants everything.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Issued-at, seconds since Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since Unix epoch.
    pub exp: i64,
}

impl CapabilityToken {
    /// True if `permission` or the wildcard is in the grant list.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission || p == "*")
    }

    /// False once the expiry has passed.
    pub fn is_valid(&self) -> bool {
        Utc::now().timestamp() < self.exp
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or_else(Utc::now)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}
