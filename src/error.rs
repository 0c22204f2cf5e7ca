//! Error taxonomy for the discovery engine.
//!
//! The split matters for scheduling: [`Error::TransientNetwork`] and session
//! failures are retryable through the work queue's retry policy, while
//! [`Error::CircuitOpen`] means "the domain is cooling down, retry later" and
//! is never counted as a task failure. Extraction and scoring never raise on
//! malformed input; zero candidates is an empty result, not an error.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure mode a task can hit.
#[derive(Debug, Error)]
pub enum Error {
    /// Network-level failure that is expected to clear on its own.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// The domain's circuit breaker is open. Not a task failure; the task
    /// should be re-released after `retry_after`.
    #[error("circuit open for {domain}, retry in {retry_after:?}")]
    CircuitOpen {
        domain: String,
        retry_after: Duration,
    },

    /// The domain's per-domain request ceiling is exhausted. Like an open
    /// circuit, a deferral signal rather than a task failure.
    #[error("rate ceiling for {domain} reached, retry in {retry_after:?}")]
    RateLimited {
        domain: String,
        retry_after: Duration,
    },

    /// The session could not produce readable content at all. Fatal to the
    /// task that hit it, never to the queue.
    #[error("malformed content from session: {0}")]
    MalformedContent(String),

    /// Cooperative cancellation. Callers holding partial results should
    /// yield them instead of surfacing this.
    #[error("cancellation requested")]
    Cancelled,

    /// No domain lease freed up within the caller's patience.
    #[error("no session lease for {domain} after {waited:?}")]
    LeaseTimeout { domain: String, waited: Duration },

    /// A task id that the queue is not currently tracking in-flight.
    #[error("task {0} is not in flight")]
    UnknownTask(Uuid),

    /// Failure reported by the externally-owned browser session.
    #[error("session error: {0}")]
    Session(#[from] anyhow::Error),
}

impl Error {
    /// Whether the work queue should re-enqueue a task that failed with this
    /// error (subject to the retry policy's attempt ceiling).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientNetwork(_) | Error::Session(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_session_errors_are_retryable() {
        assert!(Error::TransientNetwork("timeout".into()).is_retryable());
        assert!(Error::Session(anyhow::anyhow!("tab crashed")).is_retryable());
    }

    #[test]
    fn circuit_open_and_malformed_are_not_retryable() {
        let open = Error::CircuitOpen {
            domain: "example.com".into(),
            retry_after: Duration::from_secs(30),
        };
        assert!(!open.is_retryable());
        let limited = Error::RateLimited {
            domain: "example.com".into(),
            retry_after: Duration::from_secs(10),
        };
        assert!(!limited.is_retryable());
        assert!(!Error::MalformedContent("empty read".into()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }
}
