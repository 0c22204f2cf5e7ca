// Copyright 2026 Prospector Contributors
// SPDX-License-Identifier: Apache-2.0

//! Engine event bus: typed events from every component.
//!
//! A `tokio::sync::broadcast` channel carrying [`EngineEvent`] values. The
//! orchestration layer, dashboards, and tests subscribe independently; with
//! no subscribers, events are silently dropped at zero cost.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Every event the engine emits. Serialized to JSON for whatever transport
/// the orchestration layer exposes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    // ── Queue events ──────────────────────
    /// A task entered the queue.
    TaskEnqueued {
        task_id: Uuid,
        priority: String,
        rate_limit_group: String,
    },
    /// A worker picked up a task.
    TaskStarted { task_id: Uuid, domain: String },
    /// A task finished with results.
    TaskCompleted {
        task_id: Uuid,
        entities: usize,
        contacts: usize,
        actionable: usize,
        duration_ms: u64,
    },
    /// A task failed; `will_retry` distinguishes re-enqueue from terminal.
    TaskFailed {
        task_id: Uuid,
        error: String,
        attempt: u32,
        will_retry: bool,
    },
    /// A task was deferred because its domain circuit is open.
    TaskDeferred {
        task_id: Uuid,
        domain: String,
        retry_after_ms: u64,
    },

    // ── Session events ────────────────────
    /// Failure rate over the rolling window tripped a domain's breaker.
    CircuitOpened { domain: String, cooldown_ms: u64 },
    /// A half-open probe succeeded and the domain is live again.
    CircuitClosed { domain: String },
    /// Cooldown elapsed; one probe request is going through.
    ProbePermitted { domain: String },

    // ── Acquisition events ────────────────
    /// One scroll-acquisition call finished.
    ScrollFinished {
        domain: String,
        iterations: u32,
        entities: usize,
        reason: String,
        partial: bool,
    },
    /// A site-hunt page was fetched and classified.
    PageVisited { url: String, category: String },
}

/// The central event bus.
///
/// All components emit through this bus; consumers subscribe to receive a
/// stream of all events.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}
