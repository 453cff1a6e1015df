//! Domain events for observing the turn loop.
//!
//! Events are published when something interesting happens during a call.
//! Other components can subscribe to react without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::action::{ActionStatus, ToolKind};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// An action ran
    ActionExecuted {
        kind: ToolKind,
        action: String,
        status: ActionStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A turn's action was dropped (missing executor, malformed call)
    TurnSkipped {
        turn: usize,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The model reported a failure
    ModelFailed {
        status: i32,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A call finished
    CallCompleted {
        turns: usize,
        actions: usize,
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
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
