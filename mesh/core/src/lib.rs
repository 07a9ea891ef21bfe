// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # aegis-mesh-core
//!
//! The core crate of the AEGIS mesh broker. Agents register a signed identity
//! and a tool inventory with the broker; consumer agents discover tools by
//! capability pattern and receive enough metadata (endpoint, environment,
//! health) to invoke them directly on the owning agent. On top of the
//! directory sits a federation layer: per-agent health checks, rolling
//! metrics, tool ranking, load-balanced provider selection and routing
//! decisions across peer brokers.
//!
//! ## Bounded Contexts Implemented
//!
//! | Bounded Context | Key modules |
//! |---|---|
//! | **Envelope Protocol** | [`domain::envelope`], [`infrastructure::codec`] |
//! | **Capability Tokens** | [`domain::capability`], [`infrastructure::token_service`] |
//! | **MCP Registry** | [`domain::tool`], [`infrastructure::registry`] |
//! | **Federation** | [`domain::federation`], [`infrastructure::health`], [`infrastructure::balancer`], [`application::federation_manager`] |
//! | **Discovery Ranking** | [`infrastructure::semantic`], [`infrastructure::ranking`] |
//! | **Broker Dispatch** | [`application::dispatcher`], [`presentation::api`] |
//!
//! ## Layer Structure
//!
//! ```text
//! presentation/   ← HTTP API (axum)
//!     ↓
//! application/    ← Federation manager façade, envelope dispatcher, key store
//!     ↓
//! domain/         ← Envelope kinds, registry aggregates, routing value objects
//!     ↓
//! infrastructure/ ← Codec, token service, registry, health checker, balancer
//! ```
//!
//! All state is in-memory; nothing survives a restart. Every public
//! operation of the registry, metrics store and federation manager is safe
//! to call from multiple tasks concurrently.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use config::MeshConfig;
pub use domain::*;
