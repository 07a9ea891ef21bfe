// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

/// Failures while decoding or authenticating an inbound envelope.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unknown envelope kind: {0}")]
    UnknownEnvelope(String),

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Replay rejected: {0}")]
    ReplayRejected(String),
}

/// Failures while issuing or verifying capability tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Capability invalid: {0}")]
    CapabilityInvalid(String),

    #[error("Token signing failed: {0}")]
    SigningFailed(String),
}

/// Failures while selecting a provider for a tool invocation.
#[derive(Debug, Clone, Error)]
pub enum RoutingError {
    #[error("No eligible agent for tool {tool}")]
    NoEligibleAgent { tool: String },

    #[error("No strategy registered for mode {0}")]
    UnknownStrategy(String),
}

/// Top-level dispatch failure, mapped onto an HTTP status by the
/// presentation layer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Transport failure: {0}")]
    TransportFailure(String),
}

impl DispatchError {
    /// Dispositions per error kind: protocol violations are client errors,
    /// an empty candidate set is service unavailability.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Codec(_) | Self::Token(_) => 400,
            Self::Routing(RoutingError::NoEligibleAgent { .. }) => 503,
            Self::Routing(RoutingError::UnknownStrategy(_)) => 400,
            Self::TransportFailure(_) => 502,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(DispatchError::Codec(CodecError::MalformedEnvelope("x".into())).http_status(), 400);
        assert_eq!(DispatchError::Codec(CodecError::SignatureInvalid("x".into())).http_status(), 400);
        assert_eq!(DispatchError::Codec(CodecError::ReplayRejected("x".into())).http_status(), 400);
        assert_eq!(
            DispatchError::Routing(RoutingError::NoEligibleAgent { tool: "math.add".into() }).http_status(),
            503
        );
    }
}
