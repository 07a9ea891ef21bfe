// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Capability tokens: short-lived HS256 bearer tokens shared across a trust
//! domain. The claim set is canonical JWT (`jti`/`iss`/`sub`/`iat`/`exp`)
//! plus a scope and a permission list; the MAC is HMAC-SHA256 over the
//! encoded claims via the symmetric domain secret.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::domain::capability::CapabilityToken;
use crate::domain::error::TokenError;

pub struct CapabilityTokenService {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_ttl: Duration,
}

impl CapabilityTokenService {
    pub fn new(issuer: impl Into<String>, secret: &str, default_ttl: Duration) -> Self {
        Self {
            issuer: issuer.into(),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            default_ttl,
        }
    }

    /// Mint a token for `subject` with a unique id and the given lifetime.
    pub fn issue(
        &self,
        scope: impl Into<String>,
        subject: impl Into<String>,
        permissions: Vec<String>,
        ttl: Option<Duration>,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let claims = CapabilityToken {
            jti: Uuid::new_v4().to_string(),
            scope: scope.into(),
            iss: self.issuer.clone(),
            sub: subject.into(),
            permissions,
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::SigningFailed(e.to_string()))
    }

    /// Verify MAC, algorithm and expiry; returns the embedded claims.
    ///
    /// The algorithm allowlist is pinned to HS256: a token declaring any
    /// other signing algorithm fails before its MAC is even checked.
    pub fn verify(&self, token: &str) -> Result<CapabilityToken, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        decode::<CapabilityToken>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::CapabilityInvalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CapabilityTokenService {
        CapabilityTokenService::new("broker-a", "unit-test-secret", Duration::from_secs(900))
    }

    #[test]
    fn test_issue_verify_round_trip() {
        let svc = service();
        let token = svc
            .issue("tools:invoke", "agent-1", vec!["math.*".into()], None)
            .unwrap();
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.iss, "broker-a");
        assert_eq!(claims.sub, "agent-1");
        assert_eq!(claims.scope, "tools:invoke");
        assert!(claims.is_valid());
        assert!(claims.has_permission("math.*"));
    }

    #[test]
    fn test_token_ids_are_unique() {
        let svc = service();
        let a = svc.verify(&svc.issue("s", "x", vec![], None).unwrap()).unwrap();
        let b = svc.verify(&svc.issue("s", "x", vec![], None).unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let svc = service();
        let other = CapabilityTokenService::new("broker-a", "different-secret", Duration::from_secs(900));
        let token = svc.issue("s", "x", vec![], None).unwrap();
        assert!(matches!(other.verify(&token), Err(TokenError::CapabilityInvalid(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = service();
        // Encode a token that expired well past the default leeway.
        let claims = CapabilityToken {
            jti: "t".into(),
            scope: "s".into(),
            iss: "broker-a".into(),
            sub: "x".into(),
            permissions: vec![],
            iat: Utc::now().timestamp() - 600,
            exp: Utc::now().timestamp() - 300,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();
        assert!(!claims.is_valid());
        assert!(matches!(svc.verify(&token), Err(TokenError::CapabilityInvalid(_))));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let svc = service();
        let other = CapabilityTokenService::new("broker-b", "unit-test-secret", Duration::from_secs(900));
        let token = other.issue("s", "x", vec![], None).unwrap();
        assert!(matches!(svc.verify(&token), Err(TokenError::CapabilityInvalid(_))));
    }

    #[test]
    fn test_garbage_token_rejected() {
        let svc = service();
        assert!(matches!(
            svc.verify("not.a.token"),
            Err(TokenError::CapabilityInvalid(_))
        ));
    }
}
