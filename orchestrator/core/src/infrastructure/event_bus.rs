// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Coordination Event Log + Pub/Sub
//
// Each coordination service owns one EventBus. Events are appended to a
// bounded ring buffer (oldest dropped first) for later inspection and fanned
// out over a tokio broadcast channel to live observers (CLI, hub, tests).
//
// In-memory only: history is lost on restart.

use crate::domain::agent::AgentId;
use crate::domain::events::{CoordinationEvent, CoordinationEventKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Event bus for publishing, retaining and subscribing to coordination events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<CoordinationEvent>>,
    history: Arc<Mutex<VecDeque<CoordinationEvent>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus retaining at most `capacity` events.
    /// The broadcast channel buffers the same number before lagging receivers.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            history: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }

    /// Record an event about a specific agent
    pub fn publish_agent_event(&self, agent_id: &AgentId, kind: CoordinationEventKind) {
        self.publish(CoordinationEvent::for_agent(agent_id, kind));
    }

    /// Record an event not tied to any agent
    pub fn publish_system_event(&self, kind: CoordinationEventKind) {
        self.publish(CoordinationEvent::system(kind));
    }

    /// Append to the ring buffer and send to all subscribers
    pub fn publish(&self, event: CoordinationEvent) {
        debug!(event_type = event.event_type(), "Publishing coordination event");

        {
            let mut history = self.history.lock();
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // send() only fails when nobody is listening
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Most recent `limit` events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<CoordinationEvent> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// All retained events for one agent, oldest first
    pub fn events_for(&self, agent_id: &AgentId) -> Vec<CoordinationEvent> {
        self.history
            .lock()
            .iter()
            .filter(|e| e.agent_id.as_ref() == Some(agent_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for coordination events
pub struct EventReceiver {
    receiver: broadcast::Receiver<CoordinationEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<CoordinationEvent, EventBusError> {
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

/// Errors that can occur when receiving events
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

    fn released(resource: &str) -> CoordinationEventKind {
        CoordinationEventKind::LockReleased {
            resource_id: resource.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish_agent_event(&AgentId::new("gfa-1"), released("a.ts"));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "lock_released");
        assert_eq!(event.agent_id, Some(AgentId::new("gfa-1")));
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let bus = EventBus::new(3);
        for i in 0..5 {
            bus.publish_system_event(released(&format!("r{}", i)));
        }
        assert_eq!(bus.len(), 3);

        let ids: Vec<String> = bus
            .recent(10)
            .into_iter()
            .map(|e| match e.kind {
                CoordinationEventKind::LockReleased { resource_id } => resource_id,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(ids, vec!["r2", "r3", "r4"]);
        assert_eq!(bus.recent(1).len(), 1);
    }

    #[test]
    fn test_publish_without_subscribers_is_retained() {
        let bus = EventBus::default();
        let agent = AgentId::new("gsa-1");
        bus.publish_agent_event(&agent, released("x"));
        bus.publish_system_event(released("y"));

        assert_eq!(bus.capacity(), DEFAULT_EVENT_CAPACITY);
        assert_eq!(bus.events_for(&agent).len(), 1);

        let mut receiver = bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }
}
