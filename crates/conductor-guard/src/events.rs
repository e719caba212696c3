//! Safety events and the sink they are broadcast into
//!
//! The guard layer only decides what happened. Delivery to dashboards or
//! websocket clients belongs to whoever implements [`EventSink`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::resolver::ResolutionAction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SafetyEvent {
    RateLimited {
        client_id: String,
        path: String,
        retry_after: u64,
    },
    DeletionRequested {
        project_name: String,
        /// Short token prefix; the full token never leaves the manager
        token_hint: String,
        files: usize,
        expires_at: DateTime<Utc>,
    },
    DeletionConfirmed {
        project_name: String,
        removed: Vec<String>,
    },
    DeletionRejected {
        project_name: String,
        reason: String,
    },
    ReviewResolved {
        action: ResolutionAction,
        approved: bool,
        final_score: f64,
        decision_reason: String,
    },
}

impl SafetyEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SafetyEvent::RateLimited { .. } => "rate_limited",
            SafetyEvent::DeletionRequested { .. } => "deletion_requested",
            SafetyEvent::DeletionConfirmed { .. } => "deletion_confirmed",
            SafetyEvent::DeletionRejected { .. } => "deletion_rejected",
            SafetyEvent::ReviewResolved { .. } => "review_resolved",
        }
    }
}

/// Somewhere safety events go. Broadcasting never fails the caller.
pub trait EventSink: Send + Sync {
    fn broadcast(&self, event: SafetyEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn broadcast(&self, _event: SafetyEvent) {}
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SafetyEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SafetyEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemorySink {
    fn broadcast(&self, event: SafetyEvent) {
        self.events.lock().push(event);
    }
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn broadcast(&self, event: SafetyEvent) {
        (**self).broadcast(event)
    }
}
