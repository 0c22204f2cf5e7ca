// Copyright 2026 Prospector Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scroll-acquisition engine.
//!
//! Drives a supplied browser session through bounded scroll/wait/read
//! cycles via a pluggable [`strategy::ScrollStrategy`], deduplicating
//! entities by identity hash as they stream in. The loop is a sequence of
//! suspension points; every one of them checks the caller's cancel token,
//! and cancellation yields whatever was already collected as a partial
//! result rather than an error.

pub mod strategy;

use crate::cancel::CancelToken;
use crate::config::ScrollConfig;
use crate::entity::ListingEntity;
use crate::error::Error;
use crate::session::BrowserSession;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use strategy::{IterationFeedback, ScrollStrategy};
use tokio::time::Instant;

/// Consecutive failed entity reads (with overlays handled in between) that
/// mean the session cannot produce content at all.
const MAX_READ_FAILURES: u32 = 3;
/// Consecutive overlay dismissal failures before giving up with a partial.
const MAX_DISMISS_FAILURES: u32 = 2;

/// Per-call scroll progress. Discarded when `acquire` returns;
/// `collected_ids` only ever grows within one call.
#[derive(Debug)]
pub struct ScrollState {
    pub iterations: u32,
    pub last_height: u64,
    pub stable_count: u32,
    pub collected_ids: HashSet<u64>,
    pub started_at: Instant,
}

impl ScrollState {
    fn new(initial_height: u64) -> Self {
        Self {
            iterations: 0,
            last_height: initial_height,
            stable_count: 0,
            collected_ids: HashSet::new(),
            started_at: Instant::now(),
        }
    }
}

/// Why an acquisition call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Iteration budget spent.
    MaxIterations,
    /// Container height stayed flat long enough.
    HeightStable,
    /// Wall-clock budget spent.
    Timeout,
    /// Caller asked us to stop; result is partial.
    Cancelled,
    /// An overlay would not dismiss twice in a row; result is partial.
    OverlayStuck,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::MaxIterations => "max_iterations",
            StopReason::HeightStable => "height_stable",
            StopReason::Timeout => "timeout",
            StopReason::Cancelled => "cancelled",
            StopReason::OverlayStuck => "overlay_stuck",
        }
    }
}

/// Entities collected by one acquisition call, complete or partial.
#[derive(Debug)]
pub struct AcquireResult {
    pub entities: Vec<ListingEntity>,
    pub iterations: u32,
    pub elapsed: Duration,
    pub reason: StopReason,
}

impl AcquireResult {
    /// Partial results come from cancellation or a stuck overlay; they carry
    /// everything collected up to that point and are not failures.
    pub fn is_partial(&self) -> bool {
        matches!(self.reason, StopReason::Cancelled | StopReason::OverlayStuck)
    }
}

/// Run one bounded scroll-acquisition call against `session`.
///
/// Termination is guaranteed: the strategy is consulted at most
/// `max_iterations` times, and the loop additionally stops on stable
/// height, timeout, cancellation, or a stuck overlay. Only a session that
/// cannot produce content at all ends in an error.
pub async fn acquire(
    session: &dyn BrowserSession,
    strategy: &mut dyn ScrollStrategy,
    config: &ScrollConfig,
    cancel: &CancelToken,
) -> Result<AcquireResult, Error> {
    let initial_height = session.get_current_height().await?;
    let mut state = ScrollState::new(initial_height);
    let mut entities: Vec<ListingEntity> = Vec::new();
    let mut feedback: Option<IterationFeedback> = None;
    let mut read_failures = 0u32;
    let mut dismiss_failures = 0u32;

    tracing::debug!(
        strategy = strategy.name(),
        max_iterations = config.max_iterations,
        "scroll acquisition starting"
    );

    let reason = loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        if state.iterations >= config.max_iterations {
            break StopReason::MaxIterations;
        }
        if state.started_at.elapsed() >= config.timeout() {
            break StopReason::Timeout;
        }

        let action = strategy.next_action(feedback.as_ref());
        session.scroll_by(action.distance).await?;

        tokio::select! {
            _ = tokio::time::sleep(action.pause) => {}
            _ = cancel.cancelled() => break StopReason::Cancelled,
        }

        let new_entities = match session.read_visible_entities().await {
            Ok(visible) => {
                read_failures = 0;
                dismiss_failures = 0;
                let mut fresh = 0usize;
                for entity in visible {
                    if state.collected_ids.insert(entity.identity()) {
                        entities.push(entity);
                        fresh += 1;
                    }
                }
                fresh
            }
            Err(err) => {
                read_failures += 1;
                tracing::debug!(error = %err, "entity read failed, probing for overlay");
                match session.dismiss_overlay().await {
                    Ok(true) => {
                        dismiss_failures = 0;
                        tracing::info!("overlay dismissed");
                    }
                    Ok(false) | Err(_) => {
                        dismiss_failures += 1;
                        if dismiss_failures >= MAX_DISMISS_FAILURES {
                            break StopReason::OverlayStuck;
                        }
                    }
                }
                if read_failures >= MAX_READ_FAILURES {
                    return Err(Error::MalformedContent(format!(
                        "session produced no readable content after {read_failures} reads"
                    )));
                }
                0
            }
        };

        let height = session.get_current_height().await?;
        let height_changed = height != state.last_height;
        if height_changed {
            state.last_height = height;
            state.stable_count = 0;
        } else {
            state.stable_count += 1;
        }

        state.iterations += 1;
        feedback = Some(IterationFeedback {
            new_entities,
            height_changed,
        });

        if state.stable_count >= config.stable_height_count {
            break StopReason::HeightStable;
        }
    };

    let result = AcquireResult {
        entities,
        iterations: state.iterations,
        elapsed: state.started_at.elapsed(),
        reason,
    };
    tracing::debug!(
        entities = result.entities.len(),
        iterations = result.iterations,
        reason = result.reason.as_str(),
        partial = result.is_partial(),
        "scroll acquisition finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::strategy::{ScrollAction, StrategyKind};
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Session double driven by scripted heights and reads. The last entry
    /// of each script repeats forever.
    struct ScriptedSession {
        heights: Mutex<Vec<u64>>,
        reads: Mutex<Vec<anyhow::Result<Vec<ListingEntity>>>>,
        dismissals: Mutex<Vec<anyhow::Result<bool>>>,
        scrolls: AtomicU32,
    }

    impl ScriptedSession {
        fn new(
            heights: Vec<u64>,
            reads: Vec<anyhow::Result<Vec<ListingEntity>>>,
            dismissals: Vec<anyhow::Result<bool>>,
        ) -> Self {
            Self {
                heights: Mutex::new(heights),
                reads: Mutex::new(reads),
                dismissals: Mutex::new(dismissals),
                scrolls: AtomicU32::new(0),
            }
        }
    }

    fn pop_or_repeat<T: Clone>(script: &Mutex<Vec<T>>) -> Option<T> {
        let mut guard = script.lock().unwrap();
        if guard.len() > 1 {
            Some(guard.remove(0))
        } else {
            guard.first().cloned()
        }
    }

    #[async_trait]
    impl BrowserSession for ScriptedSession {
        async fn get_current_height(&self) -> anyhow::Result<u64> {
            pop_or_repeat(&self.heights).ok_or_else(|| anyhow!("no height scripted"))
        }

        async fn scroll_by(&self, _distance: u32) -> anyhow::Result<()> {
            self.scrolls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn read_visible_entities(&self) -> anyhow::Result<Vec<ListingEntity>> {
            let mut guard = self.reads.lock().unwrap();
            if guard.is_empty() {
                return Ok(Vec::new());
            }
            let next = if guard.len() > 1 {
                guard.remove(0)
            } else {
                // Clone-free repeat of the terminal entry.
                match &guard[0] {
                    Ok(v) => Ok(v.clone()),
                    Err(e) => Err(anyhow!("{e}")),
                }
            };
            next
        }

        async fn dismiss_overlay(&self) -> anyhow::Result<bool> {
            let mut guard = self.dismissals.lock().unwrap();
            if guard.is_empty() {
                return Ok(false);
            }
            if guard.len() > 1 {
                guard.remove(0)
            } else {
                match &guard[0] {
                    Ok(v) => Ok(*v),
                    Err(e) => Err(anyhow!("{e}")),
                }
            }
        }
    }

    /// Counts how many times the engine consulted it.
    struct CountingStrategy {
        calls: u32,
    }

    impl ScrollStrategy for CountingStrategy {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn next_action(&mut self, _previous: Option<&IterationFeedback>) -> ScrollAction {
            self.calls += 1;
            ScrollAction {
                distance: 500,
                pause: Duration::from_millis(10),
            }
        }
    }

    fn entities(names: &[&str]) -> anyhow::Result<Vec<ListingEntity>> {
        Ok(names
            .iter()
            .map(|n| ListingEntity::new(*n, "1 Main St"))
            .collect())
    }

    fn small_config() -> ScrollConfig {
        ScrollConfig {
            max_iterations: 5,
            stable_height_count: 3,
            timeout_secs: 60,
            viewport_height: 900,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminates_within_max_iterations_plus_one_strategy_calls() {
        // Heights strictly grow so the height never stabilizes.
        let session = ScriptedSession::new(
            (0..100u64).map(|i| 1_000 + i * 500).collect(),
            vec![entities(&["a"])],
            vec![],
        );
        let mut strategy = CountingStrategy { calls: 0 };
        let result = acquire(&session, &mut strategy, &small_config(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.reason, StopReason::MaxIterations);
        assert!(strategy.calls <= small_config().max_iterations + 1);
        assert!(!result.is_partial());
    }

    #[tokio::test(start_paused = true)]
    async fn stable_height_stops_early() {
        let session = ScriptedSession::new(vec![2_000], vec![entities(&["a", "b"])], vec![]);
        let mut strategy = CountingStrategy { calls: 0 };
        let config = ScrollConfig {
            max_iterations: 50,
            ..small_config()
        };
        let result = acquire(&session, &mut strategy, &config, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.reason, StopReason::HeightStable);
        assert_eq!(result.iterations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reseen_entities_do_not_duplicate() {
        // Same two entities visible every iteration, plus one new on the 2nd.
        let session = ScriptedSession::new(
            vec![1_000, 1_500, 2_000, 2_000, 2_000, 2_000],
            vec![
                entities(&["Acme Plumbing", "Oak Cafe"]),
                entities(&["Acme  Plumbing", "Oak Cafe", "New Bakery"]),
                entities(&["acme plumbing", "Oak Cafe", "New Bakery"]),
            ],
            vec![],
        );
        let mut strategy = CountingStrategy { calls: 0 };
        let result = acquire(&session, &mut strategy, &small_config(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.entities.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_yields_partial_with_collected_entities() {
        let session = ScriptedSession::new(
            (0..100u64).map(|i| 1_000 + i * 500).collect(),
            vec![entities(&["a"]), entities(&["a", "b"])],
            vec![],
        );
        let cancel = CancelToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            canceller.cancel();
        });

        let mut strategy = CountingStrategy { calls: 0 };
        let config = ScrollConfig {
            max_iterations: 1_000,
            ..small_config()
        };
        let result = acquire(&session, &mut strategy, &config, &cancel)
            .await
            .unwrap();

        assert_eq!(result.reason, StopReason::Cancelled);
        assert!(result.is_partial());
        assert!(!result.entities.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_overlay_aborts_with_partial_result() {
        let session = ScriptedSession::new(
            vec![1_000, 1_500, 2_000, 2_500, 3_000],
            vec![
                entities(&["a", "b"]),
                Err(anyhow!("overlay blocks the list")),
            ],
            vec![Ok(false)],
        );
        let mut strategy = CountingStrategy { calls: 0 };
        let result = acquire(&session, &mut strategy, &small_config(), &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(result.reason, StopReason::OverlayStuck);
        assert!(result.is_partial());
        assert_eq!(result.entities.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dismissed_overlay_lets_acquisition_continue() {
        let session = ScriptedSession::new(
            vec![1_000, 2_000],
            vec![
                Err(anyhow!("cookie banner")),
                entities(&["a"]),
                entities(&["a", "b"]),
            ],
            vec![Ok(true)],
        );
        let mut strategy = CountingStrategy { calls: 0 };
        let result = acquire(&session, &mut strategy, &small_config(), &CancelToken::new())
            .await
            .unwrap();

        assert!(!result.is_partial());
        assert_eq!(result.entities.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_session_is_fatal_to_the_task() {
        // Reads always fail but the overlay "dismisses" each time, so the
        // read-failure ceiling is what fires.
        let session = ScriptedSession::new(
            vec![1_000, 1_500, 2_000, 2_500],
            vec![Err(anyhow!("tab crashed"))],
            vec![Ok(true)],
        );
        let mut strategy = CountingStrategy { calls: 0 };
        let err = acquire(&session, &mut strategy, &small_config(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedContent(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn built_strategies_run_the_loop() {
        for kind in [StrategyKind::Smooth, StrategyKind::Chunk, StrategyKind::Adaptive] {
            let session = ScriptedSession::new(vec![2_000], vec![entities(&["a"])], vec![]);
            let mut strategy = kind.build(&small_config());
            let result = acquire(
                &session,
                strategy.as_mut(),
                &small_config(),
                &CancelToken::new(),
            )
            .await
            .unwrap();
            assert_eq!(result.reason, StopReason::HeightStable);
            assert_eq!(result.entities.len(), 1);
        }
    }
}
