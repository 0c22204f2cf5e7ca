//! Scroll strategies, the pluggable pacing contract.
//!
//! Exactly three shipped variants. New behavior implements the same
//! [`ScrollStrategy`] contract instead of patching any of these at runtime:
//!
//! - **smooth**: small fixed distance with jittered human-like timing.
//!   Lowest detection risk, slowest coverage.
//! - **chunk**: viewport-sized jumps with short pauses. Fastest, higher
//!   detection risk.
//! - **adaptive**: online feedback controller. Grows the step while the
//!   new-entity yield stays high; shrinks it and adds pause when yield drops
//!   or two consecutive iterations come back empty.

use crate::config::{DelayRange, ScrollConfig};
use crate::session::stealth::jitter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the engine should do next: scroll this far, then wait this long.
#[derive(Debug, Clone, Copy)]
pub struct ScrollAction {
    pub distance: u32,
    pub pause: Duration,
}

/// What the previous iteration produced, fed back to the strategy.
#[derive(Debug, Clone, Copy)]
pub struct IterationFeedback {
    /// Entities not seen in any earlier iteration of this call.
    pub new_entities: usize,
    /// Whether the scroll container grew since the last read.
    pub height_changed: bool,
}

/// The strategy contract: one decision per iteration, previous result in.
pub trait ScrollStrategy: Send {
    fn name(&self) -> &'static str;
    fn next_action(&mut self, previous: Option<&IterationFeedback>) -> ScrollAction;
}

/// The three shipped strategy variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Smooth,
    Chunk,
    Adaptive,
}

impl StrategyKind {
    /// Construct a fresh strategy instance for one acquisition call.
    pub fn build(&self, config: &ScrollConfig) -> Box<dyn ScrollStrategy> {
        match self {
            StrategyKind::Smooth => Box::new(SmoothStrategy),
            StrategyKind::Chunk => Box::new(ChunkStrategy {
                viewport_height: config.viewport_height,
            }),
            StrategyKind::Adaptive => Box::new(AdaptiveStrategy::new(config.viewport_height)),
        }
    }
}

/// Small steps, human-ish waits.
struct SmoothStrategy;

impl ScrollStrategy for SmoothStrategy {
    fn name(&self) -> &'static str {
        "smooth"
    }

    fn next_action(&mut self, _previous: Option<&IterationFeedback>) -> ScrollAction {
        ScrollAction {
            distance: 240 + (jitter(DelayRange::new(0, 120)).as_millis() as u32),
            pause: jitter(DelayRange::new(800, 1_600)),
        }
    }
}

/// Viewport-sized jumps, short waits.
struct ChunkStrategy {
    viewport_height: u32,
}

impl ScrollStrategy for ChunkStrategy {
    fn name(&self) -> &'static str {
        "chunk"
    }

    fn next_action(&mut self, _previous: Option<&IterationFeedback>) -> ScrollAction {
        ScrollAction {
            distance: self.viewport_height,
            pause: jitter(DelayRange::new(250, 500)),
        }
    }
}

/// Feedback controller over yield.
struct AdaptiveStrategy {
    distance: f64,
    max_distance: f64,
    zero_streak: u32,
}

impl AdaptiveStrategy {
    const MIN_DISTANCE: f64 = 120.0;
    const HIGH_YIELD: usize = 3;

    fn new(viewport_height: u32) -> Self {
        Self {
            distance: 400.0,
            max_distance: (viewport_height as f64) * 2.0,
            zero_streak: 0,
        }
    }
}

impl ScrollStrategy for AdaptiveStrategy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn next_action(&mut self, previous: Option<&IterationFeedback>) -> ScrollAction {
        if let Some(prev) = previous {
            if prev.new_entities >= Self::HIGH_YIELD {
                self.zero_streak = 0;
                self.distance = (self.distance * 1.4).min(self.max_distance);
            } else if prev.new_entities == 0 {
                self.zero_streak += 1;
                self.distance = (self.distance * 0.6).max(Self::MIN_DISTANCE);
            } else {
                self.zero_streak = 0;
            }
        }

        // Empty iterations usually mean the page is still loading: back off.
        let extra_pause = Duration::from_millis(u64::from(self.zero_streak) * 400);
        ScrollAction {
            distance: self.distance as u32,
            pause: jitter(DelayRange::new(450, 750)) + extra_pause,
        }
    }
}
