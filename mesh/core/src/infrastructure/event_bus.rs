// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for mesh domain events
//
// In-memory event streaming over a tokio broadcast channel. Subscribers
// observe registrations, revocations, embodiment swaps, health transitions
// and routing decisions; events are lost on restart.

use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::events::MeshEvent;

/// Event bus for publishing and subscribing to mesh events.
#[derive(Clone)]
pub struct MeshEventBus {
    sender: broadcast::Sender<MeshEvent>,
}

impl MeshEventBus {
    /// Capacity bounds how many events buffer before old ones drop.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish to all subscribers; a send with no subscribers is a no-op.
    pub fn publish(&self, event: MeshEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> MeshEventReceiver {
        MeshEventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MeshEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct MeshEventReceiver {
    receiver: broadcast::Receiver<MeshEvent>,
}

impl MeshEventReceiver {
    pub async fn recv(&mut self) -> Result<MeshEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<MeshEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = MeshEventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(MeshEvent::AgentRegistered {
            agent_id: AgentId::from("a1"),
            tool_count: 2,
            registered_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            MeshEvent::AgentRegistered { agent_id, tool_count, .. } => {
                assert_eq!(agent_id.as_str(), "a1");
                assert_eq!(tool_count, 2);
            }
            other => panic!("Expected AgentRegistered event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = MeshEventBus::new(10);
        let mut r1 = bus.subscribe();
        let mut r2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(MeshEvent::AgentRevoked {
            agent_id: AgentId::from("a1"),
            reason: None,
            revoked_at: Utc::now(),
        });

        assert!(r1.recv().await.is_ok());
        assert!(r2.recv().await.is_ok());
    }
}
