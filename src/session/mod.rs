//! Session abstractions: the externally-owned browser handle and the
//! supervisor-issued lease.
//!
//! The browser process belongs to the caller. This crate only sees the four
//! operations the scroll-acquisition loop needs, behind [`BrowserSession`]
//! (the same seam the renderer trait cut in earlier acquisition work: an
//! async trait object the engine drives without owning the lifecycle).

pub mod stealth;
pub mod supervisor;

use crate::config::StealthParams;
use crate::entity::ListingEntity;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use uuid::Uuid;

pub use stealth::ActionType;

/// Opaque handle to a rendered browser session.
///
/// Implementations are free to be a CDP page, a remote browserless tab, or a
/// test double. Errors surface as `anyhow::Error` and are classified by the
/// caller (read failures fatal to the task, scroll failures retryable).
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Current scroll-container height in px.
    async fn get_current_height(&self) -> Result<u64>;
    /// Scroll down by `distance` px.
    async fn scroll_by(&self, distance: u32) -> Result<()>;
    /// Read the listing entities currently visible in the viewport.
    async fn read_visible_entities(&self) -> Result<Vec<ListingEntity>>;
    /// Try to dismiss an overlay/modal. `Ok(true)` means one was dismissed.
    async fn dismiss_overlay(&self) -> Result<bool>;
}

/// Outcome of one supervised action against a domain, fed back via
/// [`supervisor::SessionSupervisor::report`].
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub success: bool,
    pub latency: Duration,
}

impl Outcome {
    pub fn success(latency: Duration) -> Self {
        Self {
            success: true,
            latency,
        }
    }

    pub fn failure(latency: Duration) -> Self {
        Self {
            success: false,
            latency,
        }
    }
}

/// A supervised, time-bounded right for one task to act against one domain.
///
/// Holds a semaphore permit; dropping the lease frees the domain slot for
/// the next waiting task.
#[derive(Debug)]
pub struct SessionLease {
    pub domain: String,
    pub session_id: Uuid,
    pub stealth: StealthParams,
    /// Whether this lease is the single half-open probe for its domain.
    pub is_probe: bool,
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    pub(crate) fn new(
        domain: String,
        session_id: Uuid,
        stealth: StealthParams,
        is_probe: bool,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            domain,
            session_id,
            stealth,
            is_probe,
            _permit: permit,
        }
    }

    /// Jittered delay for an action under this lease's stealth parameters.
    pub fn delay_for(&self, action: ActionType) -> Duration {
        self.stealth.delay_for(action)
    }
}
