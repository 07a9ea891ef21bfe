// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod balancer;
pub mod codec;
pub mod event_bus;
pub mod health;
pub mod metrics_store;
pub mod ranking;
pub mod registry;
pub mod semantic;
pub mod token_service;
pub mod topology;

pub use balancer::LoadBalancer;
pub use codec::{EnvelopeValidator, KeyCodec};
pub use event_bus::MeshEventBus;
pub use health::HealthChecker;
pub use metrics_store::MetricsStore;
pub use ranking::RankingEngine;
pub use registry::McpRegistry;
pub use semantic::SemanticIndex;
pub use token_service::CapabilityTokenService;
pub use topology::TopologyStore;
