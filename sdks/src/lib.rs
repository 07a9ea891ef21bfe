// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # aegis-mesh-sdk
//!
//! Agent-side client for an AEGIS mesh broker: keypair management,
//! envelope construction and signing, and the register / heartbeat /
//! embodiment / discover calls an agent needs to join the mesh.

mod client;
mod identity;

pub use client::{MeshClient, MeshClientError};
pub use identity::AgentKeypair;

pub use aegis_mesh_core::domain::{
    BodyDefinition, DiscoveredTool, Envelope, EnvelopeKind, McpTool, ToolQuery,
};
