//! Domain event system: decoupled observation of the turn pipeline.
//!
//! The orchestrator publishes an event at each phase boundary. Other
//! components subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    TurnReceived {
        turn_id: String,
        scenario_id: String,
        system_event: bool,
        timestamp: DateTime<Utc>,
    },

    ContextAssembled {
        turn_id: String,
        context_hash: String,
        total_tokens: usize,
        within_budget: bool,
        timestamp: DateTime<Utc>,
    },

    LlmInvoked {
        turn_id: String,
        /// "ack" or "full"
        path: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    ToolExecuted {
        turn_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    TurnCompleted {
        turn_id: String,
        outcome: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ToolExecuted {
            turn_id: "t1".into(),
            tool_name: "run_analysis".into(),
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted {
                tool_name, success, ..
            } => {
                assert_eq!(tool_name, "run_analysis");
                assert!(success);
            }
            _ => panic!("Expected ToolExecuted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::TurnCompleted {
            turn_id: "t1".into(),
            outcome: "ok".into(),
            duration_ms: 1,
            timestamp: Utc::now(),
        });
    }
}
