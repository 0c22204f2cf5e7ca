// Copyright 2026 Prospector Contributors
// SPDX-License-Identifier: Apache-2.0

//! Rate-limited priority work queue.
//!
//! Four strict priority tiers, FIFO within a tier. Dequeue skips tasks whose
//! rate-limit group is at its sliding-window ceiling, so a saturated group
//! never blocks eligible work behind it. Failed retryable tasks re-enter
//! through a delay shelf with exponential backoff; deferred tasks (domain
//! circuit open) re-enter the same way without burning an attempt.

use crate::config::{RateLimitConfig, RetryPolicy};
use crate::engine::TaskResult;
use crate::error::Error;
use crate::events::{EngineEvent, EventBus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// Strict ordering tiers. A lower tier is only served when every higher tier
/// has no eligible task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    fn index(self) -> usize {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// Task lifecycle. Every transition goes through `InFlight`; there is no
/// path from `Pending` straight to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InFlight,
    Retrying,
    Completed,
    Failed,
}

/// One unit of discovery work: a query or target URL plus scheduling
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionTask {
    pub id: Uuid,
    pub query: String,
    pub target_url: String,
    pub page_index: u32,
    pub priority: Priority,
    /// Sliding-window group this task draws from, usually one per upstream
    /// search engine.
    pub rate_limit_group: String,
    pub state: TaskState,
    /// 1-based; incremented only by retryable failures, never by deferral.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl ExtractionTask {
    pub fn new(
        query: impl Into<String>,
        target_url: impl Into<String>,
        priority: Priority,
        rate_limit_group: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            target_url: target_url.into(),
            page_index: 0,
            priority,
            rate_limit_group: rate_limit_group.into(),
            state: TaskState::Pending,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct Inner {
    tiers: [VecDeque<ExtractionTask>; 4],
    /// Tasks waiting out a backoff or circuit cooldown, drained on dequeue.
    delayed: Vec<(Instant, ExtractionTask)>,
    in_flight: HashMap<Uuid, ExtractionTask>,
    results: HashMap<Uuid, TaskResult>,
    /// Terminal task records, kept until the result is collected.
    finished: HashMap<Uuid, ExtractionTask>,
    /// Dequeue timestamps per rate-limit group, pruned on every dequeue.
    windows: HashMap<String, VecDeque<Instant>>,
}

/// The work queue. Shared across workers behind an `Arc`.
pub struct WorkQueue {
    inner: Mutex<Inner>,
    retry: RetryPolicy,
    rate_limits: HashMap<String, RateLimitConfig>,
    events: Option<Arc<EventBus>>,
}

impl WorkQueue {
    pub fn new(retry: RetryPolicy, rate_limits: HashMap<String, RateLimitConfig>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            retry,
            rate_limits,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    /// Accept a new task at its priority tier.
    pub async fn enqueue(&self, task: ExtractionTask) {
        self.emit(EngineEvent::TaskEnqueued {
            task_id: task.id,
            priority: task.priority.as_str().to_string(),
            rate_limit_group: task.rate_limit_group.clone(),
        });
        let mut inner = self.inner.lock().await;
        inner.tiers[task.priority.index()].push_back(task);
    }

    /// Hand out the highest-priority eligible task, or `None` if everything
    /// is empty, delayed, or rate-limited.
    ///
    /// Eligibility is per rate-limit group: a group at its ceiling is
    /// skipped in place, which lets a lower-priority task from a different
    /// group go first.
    pub async fn dequeue(&self) -> Option<ExtractionTask> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        self.release_delayed(&mut inner, now);
        self.prune_windows(&mut inner.windows, now);

        for tier in 0..inner.tiers.len() {
            let Some(pos) = inner.tiers[tier]
                .iter()
                .position(|t| self.group_has_capacity(&inner.windows, &t.rate_limit_group))
            else {
                continue;
            };
            let Some(mut task) = inner.tiers[tier].remove(pos) else {
                continue;
            };
            task.state = TaskState::InFlight;
            // Only metered groups need their dequeues remembered.
            if self.rate_limits.contains_key(&task.rate_limit_group) {
                inner
                    .windows
                    .entry(task.rate_limit_group.clone())
                    .or_default()
                    .push_back(now);
            }
            inner.in_flight.insert(task.id, task.clone());
            return Some(task);
        }
        None
    }

    /// Record a finished task and stash its result for collection.
    pub async fn complete(&self, task_id: Uuid, result: TaskResult) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        let mut task = inner
            .in_flight
            .remove(&task_id)
            .ok_or(Error::UnknownTask(task_id))?;
        task.state = TaskState::Completed;
        inner.results.insert(task_id, result);
        inner.finished.insert(task_id, task);
        Ok(())
    }

    /// Record a failed task. Retryable errors under the attempt ceiling go
    /// back through the delay shelf with backoff; everything else is
    /// terminal. Returns whether the task will run again.
    pub async fn fail(&self, task_id: Uuid, error: &Error) -> Result<bool, Error> {
        let mut inner = self.inner.lock().await;
        let mut task = inner
            .in_flight
            .remove(&task_id)
            .ok_or(Error::UnknownTask(task_id))?;

        let will_retry = error.is_retryable() && task.attempt < self.retry.max_attempts;
        self.emit(EngineEvent::TaskFailed {
            task_id,
            error: error.to_string(),
            attempt: task.attempt,
            will_retry,
        });

        if will_retry {
            let backoff = self.retry.backoff(task.attempt);
            task.attempt += 1;
            task.state = TaskState::Retrying;
            tracing::debug!(
                task_id = %task_id,
                attempt = task.attempt,
                backoff_ms = backoff.as_millis() as u64,
                "task re-enqueued after failure"
            );
            inner.delayed.push((Instant::now() + backoff, task));
        } else {
            task.state = TaskState::Failed;
            tracing::warn!(task_id = %task_id, error = %error, "task failed terminally");
            inner.finished.insert(task_id, task);
        }
        Ok(will_retry)
    }

    /// Shelve an in-flight task whose domain circuit is open. Does not count
    /// as a failure and does not consume an attempt.
    pub async fn defer(
        &self,
        task_id: Uuid,
        domain: &str,
        retry_after: Duration,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        let mut task = inner
            .in_flight
            .remove(&task_id)
            .ok_or(Error::UnknownTask(task_id))?;
        task.state = TaskState::Pending;
        self.emit(EngineEvent::TaskDeferred {
            task_id,
            domain: domain.to_string(),
            retry_after_ms: retry_after.as_millis() as u64,
        });
        inner.delayed.push((Instant::now() + retry_after, task));
        Ok(())
    }

    /// Collect the result of a completed task, removing it and its terminal
    /// record from the queue.
    pub async fn take_result(&self, task_id: Uuid) -> Option<TaskResult> {
        let mut inner = self.inner.lock().await;
        let result = inner.results.remove(&task_id);
        if result.is_some() {
            inner.finished.remove(&task_id);
        }
        result
    }

    /// Lifecycle state of a task anywhere in the queue. `None` for ids the
    /// queue never saw or whose result has already been collected.
    pub async fn state_of(&self, task_id: Uuid) -> Option<TaskState> {
        let inner = self.inner.lock().await;
        if let Some(task) = inner.in_flight.get(&task_id) {
            return Some(task.state);
        }
        if let Some(task) = inner.finished.get(&task_id) {
            return Some(task.state);
        }
        for tier in &inner.tiers {
            if let Some(task) = tier.iter().find(|t| t.id == task_id) {
                return Some(task.state);
            }
        }
        inner
            .delayed
            .iter()
            .find(|(_, t)| t.id == task_id)
            .map(|(_, t)| t.state)
    }

    /// Pending depth per tier, delay shelf included.
    pub async fn depth_by_priority(&self) -> HashMap<Priority, usize> {
        let inner = self.inner.lock().await;
        let mut depths: HashMap<Priority, usize> = Priority::ALL
            .iter()
            .map(|p| (*p, inner.tiers[p.index()].len()))
            .collect();
        for (_, task) in &inner.delayed {
            *depths.entry(task.priority).or_default() += 1;
        }
        depths
    }

    pub async fn in_flight_count(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    fn release_delayed(&self, inner: &mut Inner, now: Instant) {
        let mut kept = Vec::with_capacity(inner.delayed.len());
        for (due, mut task) in inner.delayed.drain(..) {
            if due <= now {
                task.state = TaskState::Pending;
                inner.tiers[task.priority.index()].push_back(task);
            } else {
                kept.push((due, task));
            }
        }
        inner.delayed = kept;
    }

    /// Drop expired dequeue timestamps so each group's window stays bounded
    /// by its ceiling instead of growing with queue history.
    fn prune_windows(&self, windows: &mut HashMap<String, VecDeque<Instant>>, now: Instant) {
        for (group, window) in windows.iter_mut() {
            let Some(limit) = self.rate_limits.get(group) else {
                window.clear();
                continue;
            };
            if let Some(cutoff) = now.checked_sub(limit.window()) {
                while window.front().is_some_and(|t| *t <= cutoff) {
                    window.pop_front();
                }
            }
        }
    }

    fn group_has_capacity(
        &self,
        windows: &HashMap<String, VecDeque<Instant>>,
        group: &str,
    ) -> bool {
        let Some(limit) = self.rate_limits.get(group) else {
            return true;
        };
        windows
            .get(group)
            .map_or(true, |w| w.len() < limit.max_requests as usize)
    }
}
