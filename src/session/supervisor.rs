// Copyright 2026 Prospector Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session supervisor: domain leases, per-domain stats, circuit breaking.
//!
//! One [`DomainSession`] exists per active domain, owned exclusively by the
//! supervisor. Tasks call [`SessionSupervisor::authorize`] for a lease
//! before touching a domain and [`SessionSupervisor::report`] afterwards.
//! The circuit breaker watches a rolling window of recent outcomes: too many
//! failures opens the circuit (fast-fail for a cooldown), then a single
//! half-open probe decides between closing and doubling the cooldown.
//! Domains with a configured request ceiling additionally get a sliding
//! window at authorization time; an exhausted ceiling defers the task the
//! same way an open circuit does.
//!
//! The supervisor is an explicit object constructed at startup and passed by
//! handle, never a process-wide singleton, so tests can run several side
//! by side. Stats are plain atomics: written by the owning task's report,
//! read by monitors as eventually-consistent snapshots.

use crate::config::{DomainOverrides, RateLimitConfig, StealthParams, SupervisorConfig};
use crate::error::Error;
use crate::events::{EngineEvent, EventBus};
use crate::session::{ActionType, Outcome, SessionLease};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Circuit breaker state for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// What the breaker lets through right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Allow,
    /// Cooldown elapsed; exactly one probe may pass.
    AllowProbe,
    Deny { retry_after: Duration },
}

/// Rolling-window circuit breaker. Pure state machine, no I/O; the
/// supervisor drives it under a lock.
#[derive(Debug)]
struct CircuitBreaker {
    window: VecDeque<bool>,
    window_size: usize,
    failure_threshold: f64,
    state: CircuitState,
    opened_at: Instant,
    cooldown: Duration,
    base_cooldown: Duration,
    cooldown_cap: Duration,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    fn new(config: &SupervisorConfig) -> Self {
        let base = Duration::from_secs(config.cooldown_secs);
        Self {
            window: VecDeque::with_capacity(config.window_size),
            window_size: config.window_size.max(1),
            failure_threshold: config.failure_threshold,
            state: CircuitState::Closed,
            opened_at: Instant::now(),
            cooldown: base,
            base_cooldown: base,
            cooldown_cap: Duration::from_secs(config.cooldown_cap_secs),
            probe_in_flight: false,
        }
    }

    fn try_pass(&mut self, now: Instant) -> Decision {
        match self.state {
            CircuitState::Closed => Decision::Allow,
            CircuitState::Open => {
                let reopens = self.opened_at + self.cooldown;
                if now >= reopens {
                    self.state = CircuitState::HalfOpen;
                    self.probe_in_flight = true;
                    Decision::AllowProbe
                } else {
                    Decision::Deny {
                        retry_after: reopens - now,
                    }
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    Decision::Deny {
                        retry_after: Duration::from_secs(1),
                    }
                } else {
                    self.probe_in_flight = true;
                    Decision::AllowProbe
                }
            }
        }
    }

    /// A probe that never ran (lease timeout) must free the probe slot.
    fn abandon_probe(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.probe_in_flight = false;
        }
    }

    fn record(&mut self, success: bool, now: Instant) {
        match self.state {
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                if success {
                    self.state = CircuitState::Closed;
                    self.cooldown = self.base_cooldown;
                    self.window.clear();
                } else {
                    self.state = CircuitState::Open;
                    self.opened_at = now;
                    self.cooldown = (self.cooldown * 2).min(self.cooldown_cap);
                }
            }
            CircuitState::Closed => {
                self.window.push_back(success);
                while self.window.len() > self.window_size {
                    self.window.pop_front();
                }
                if self.window.len() >= self.window_size && self.failure_rate() >= self.failure_threshold
                {
                    self.state = CircuitState::Open;
                    self.opened_at = now;
                    self.cooldown = self.base_cooldown;
                    self.window.clear();
                }
            }
            // Late reports from in-flight work while open don't move the state.
            CircuitState::Open => {}
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|s| !**s).count();
        failures as f64 / self.window.len() as f64
    }
}

#[derive(Debug, Default)]
struct SessionStats {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    latency_total_ms: AtomicU64,
}

/// One domain's session record. Owned by the supervisor.
#[derive(Debug)]
pub struct DomainSession {
    session_id: Uuid,
    stealth: StealthParams,
    /// Per-domain request ceiling from the overrides, if any.
    rate_limit: Option<RateLimitConfig>,
    /// Authorization timestamps inside the ceiling's window.
    recent: Mutex<VecDeque<Instant>>,
    stats: SessionStats,
    circuit: Mutex<CircuitBreaker>,
    leases: Arc<tokio::sync::Semaphore>,
}

/// Monitoring snapshot for one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainStatsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub avg_latency_ms: u64,
    pub circuit_state: CircuitState,
}

/// Issues leases and timing, tracks stats, trips circuit breakers.
pub struct SessionSupervisor {
    config: SupervisorConfig,
    overrides: HashMap<String, DomainOverrides>,
    sessions: DashMap<String, Arc<DomainSession>>,
    events: Option<Arc<EventBus>>,
}

impl SessionSupervisor {
    pub fn new(config: SupervisorConfig, overrides: HashMap<String, DomainOverrides>) -> Self {
        Self {
            config,
            overrides,
            sessions: DashMap::new(),
            events: None,
        }
    }

    /// Attach an event bus for circuit transition events.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn session_for(&self, domain: &str) -> Arc<DomainSession> {
        self.sessions
            .entry(domain.to_string())
            .or_insert_with(|| {
                let overrides = self.overrides.get(domain);
                let stealth = overrides
                    .and_then(|o| o.stealth.clone())
                    .unwrap_or_default();
                let rate_limit = overrides.and_then(|o| o.rate_limit);
                Arc::new(DomainSession {
                    session_id: Uuid::new_v4(),
                    stealth,
                    rate_limit,
                    recent: Mutex::new(VecDeque::new()),
                    stats: SessionStats::default(),
                    circuit: Mutex::new(CircuitBreaker::new(&self.config)),
                    leases: Arc::new(tokio::sync::Semaphore::new(
                        self.config.max_leases_per_domain.max(1),
                    )),
                })
            })
            .clone()
    }

    /// Authorize one task to act against `domain`.
    ///
    /// Fast-fails with [`Error::CircuitOpen`] while the breaker is open,
    /// with [`Error::RateLimited`] when the domain's configured request
    /// ceiling is exhausted, and with [`Error::LeaseTimeout`] if all K
    /// leases stay busy past the configured wait.
    pub async fn authorize(&self, domain: &str) -> Result<SessionLease, Error> {
        let session = self.session_for(domain);

        let decision = {
            let mut circuit = session.circuit.lock().expect("circuit lock");
            circuit.try_pass(Instant::now())
        };

        let is_probe = match decision {
            Decision::Allow => false,
            Decision::AllowProbe => {
                tracing::info!(domain, "circuit half-open, permitting probe");
                self.emit(EngineEvent::ProbePermitted {
                    domain: domain.to_string(),
                });
                true
            }
            Decision::Deny { retry_after } => {
                tracing::debug!(domain, ?retry_after, "circuit open, fast-failing");
                return Err(Error::CircuitOpen {
                    domain: domain.to_string(),
                    retry_after,
                });
            }
        };

        if let Some(limit) = session.rate_limit {
            let now = Instant::now();
            let mut recent = session.recent.lock().expect("rate window lock");
            if let Some(cutoff) = now.checked_sub(limit.window()) {
                while recent.front().is_some_and(|t| *t <= cutoff) {
                    recent.pop_front();
                }
            }
            if recent.len() >= limit.max_requests as usize {
                if is_probe {
                    session
                        .circuit
                        .lock()
                        .expect("circuit lock")
                        .abandon_probe();
                }
                let retry_after = recent
                    .front()
                    .map(|t| (*t + limit.window()).saturating_duration_since(now))
                    .unwrap_or_else(|| limit.window());
                tracing::debug!(domain, ?retry_after, "domain rate ceiling reached");
                return Err(Error::RateLimited {
                    domain: domain.to_string(),
                    retry_after,
                });
            }
            recent.push_back(now);
        }

        let wait = Duration::from_secs(self.config.lease_timeout_secs);
        let permit = match tokio::time::timeout(wait, session.leases.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => {
                if is_probe {
                    session
                        .circuit
                        .lock()
                        .expect("circuit lock")
                        .abandon_probe();
                }
                return Err(Error::LeaseTimeout {
                    domain: domain.to_string(),
                    waited: wait,
                });
            }
        };

        Ok(SessionLease::new(
            domain.to_string(),
            session.session_id,
            session.stealth.clone(),
            is_probe,
            permit,
        ))
    }

    /// Feed one outcome back into stats and the circuit breaker.
    pub fn report(&self, domain: &str, outcome: Outcome) {
        let Some(session) = self.sessions.get(domain).map(|s| s.clone()) else {
            tracing::warn!(domain, "report for unknown domain session");
            return;
        };

        session.stats.requests.fetch_add(1, Ordering::Relaxed);
        session
            .stats
            .latency_total_ms
            .fetch_add(outcome.latency.as_millis() as u64, Ordering::Relaxed);
        if outcome.success {
            session.stats.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            session.stats.failures.fetch_add(1, Ordering::Relaxed);
        }

        let mut circuit = session.circuit.lock().expect("circuit lock");
        let before = circuit.state;
        circuit.record(outcome.success, Instant::now());
        let after = circuit.state;
        let cooldown = circuit.cooldown;
        drop(circuit);

        if before != CircuitState::Open && after == CircuitState::Open {
            tracing::warn!(domain, ?cooldown, "circuit opened");
            self.emit(EngineEvent::CircuitOpened {
                domain: domain.to_string(),
                cooldown_ms: cooldown.as_millis() as u64,
            });
        }
        if before == CircuitState::HalfOpen && after == CircuitState::Closed {
            tracing::info!(domain, "circuit closed after successful probe");
            self.emit(EngineEvent::CircuitClosed {
                domain: domain.to_string(),
            });
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }

    /// Jittered delay for an action against `domain`, honoring overrides.
    pub fn delay_for(&self, domain: &str, action: ActionType) -> Duration {
        self.session_for(domain).stealth.delay_for(action)
    }

    /// Eventually-consistent stats for every domain seen so far.
    pub fn snapshot(&self) -> HashMap<String, DomainStatsSnapshot> {
        self.sessions
            .iter()
            .map(|entry| {
                let stats = &entry.value().stats;
                let requests = stats.requests.load(Ordering::Relaxed);
                let successes = stats.successes.load(Ordering::Relaxed);
                let failures = stats.failures.load(Ordering::Relaxed);
                let latency_total = stats.latency_total_ms.load(Ordering::Relaxed);
                let circuit_state = entry
                    .value()
                    .circuit
                    .lock()
                    .expect("circuit lock")
                    .state;
                (
                    entry.key().clone(),
                    DomainStatsSnapshot {
                        requests,
                        successes,
                        failures,
                        success_rate: if requests == 0 {
                            0.0
                        } else {
                            successes as f64 / requests as f64
                        },
                        avg_latency_ms: if requests == 0 {
                            0
                        } else {
                            latency_total / requests
                        },
                        circuit_state,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            window_size: 4,
            failure_threshold: 0.5,
            cooldown_secs: 10,
            cooldown_cap_secs: 40,
            max_leases_per_domain: 2,
            lease_timeout_secs: 1,
        }
    }

    fn fail() -> Outcome {
        Outcome::failure(Duration::from_millis(100))
    }

    fn ok() -> Outcome {
        Outcome::success(Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn failures_over_threshold_open_the_circuit() {
        let supervisor = SessionSupervisor::new(test_config(), HashMap::new());

        for _ in 0..4 {
            let lease = supervisor.authorize("bad.example").await.unwrap();
            drop(lease);
            supervisor.report("bad.example", fail());
        }

        match supervisor.authorize("bad.example").await {
            Err(Error::CircuitOpen { domain, .. }) => assert_eq!(domain, "bad.example"),
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_permits_exactly_one_probe() {
        let supervisor = SessionSupervisor::new(test_config(), HashMap::new());
        for _ in 0..4 {
            supervisor.authorize("bad.example").await.unwrap();
            supervisor.report("bad.example", fail());
        }
        assert!(supervisor.authorize("bad.example").await.is_err());

        tokio::time::advance(Duration::from_secs(11)).await;

        let probe = supervisor.authorize("bad.example").await.unwrap();
        assert!(probe.is_probe);
        // Second caller during the probe is still denied.
        assert!(matches!(
            supervisor.authorize("bad.example").await,
            Err(Error::CircuitOpen { .. })
        ));
        drop(probe);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_success_closes_probe_failure_doubles_cooldown() {
        let supervisor = SessionSupervisor::new(test_config(), HashMap::new());
        for _ in 0..4 {
            supervisor.authorize("bad.example").await.unwrap();
            supervisor.report("bad.example", fail());
        }

        // First probe fails: cooldown doubles from 10s to 20s.
        tokio::time::advance(Duration::from_secs(11)).await;
        let probe = supervisor.authorize("bad.example").await.unwrap();
        drop(probe);
        supervisor.report("bad.example", fail());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(
            supervisor.authorize("bad.example").await.is_err(),
            "still cooling down after doubled cooldown"
        );

        tokio::time::advance(Duration::from_secs(10)).await;
        let probe = supervisor.authorize("bad.example").await.unwrap();
        assert!(probe.is_probe);
        drop(probe);
        supervisor.report("bad.example", ok());

        // Closed again: normal authorization resumes.
        let lease = supervisor.authorize("bad.example").await.unwrap();
        assert!(!lease.is_probe);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_cap_suspends_then_times_out() {
        let mut config = test_config();
        config.max_leases_per_domain = 1;
        let supervisor = SessionSupervisor::new(config, HashMap::new());

        let held = supervisor.authorize("busy.example").await.unwrap();
        let denied = supervisor.authorize("busy.example").await;
        assert!(matches!(denied, Err(Error::LeaseTimeout { .. })));

        drop(held);
        assert!(supervisor.authorize("busy.example").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reflects_reported_outcomes() {
        let supervisor = SessionSupervisor::new(test_config(), HashMap::new());
        supervisor.authorize("stats.example").await.unwrap();
        supervisor.report("stats.example", ok());
        supervisor.report(
            "stats.example",
            Outcome::failure(Duration::from_millis(300)),
        );

        let snap = supervisor.snapshot();
        let domain = snap.get("stats.example").unwrap();
        assert_eq!(domain.requests, 2);
        assert_eq!(domain.successes, 1);
        assert_eq!(domain.failures, 1);
        assert!((domain.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(domain.avg_latency_ms, 200);
        assert_eq!(domain.circuit_state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn domain_rate_ceiling_defers_authorization() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "metered.example".to_string(),
            DomainOverrides {
                rate_limit: Some(RateLimitConfig {
                    window_secs: 60,
                    max_requests: 2,
                }),
                ..Default::default()
            },
        );
        let supervisor = SessionSupervisor::new(test_config(), overrides);

        drop(supervisor.authorize("metered.example").await.unwrap());
        drop(supervisor.authorize("metered.example").await.unwrap());
        match supervisor.authorize("metered.example").await {
            Err(Error::RateLimited {
                domain,
                retry_after,
            }) => {
                assert_eq!(domain, "metered.example");
                assert!(retry_after <= Duration::from_secs(60));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        // Domains without an override are untouched.
        assert!(supervisor.authorize("open.example").await.is_ok());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(supervisor.authorize("metered.example").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn two_supervisors_do_not_share_state() {
        let a = SessionSupervisor::new(test_config(), HashMap::new());
        let b = SessionSupervisor::new(test_config(), HashMap::new());
        for _ in 0..4 {
            a.authorize("x.example").await.unwrap();
            a.report("x.example", fail());
        }
        assert!(a.authorize("x.example").await.is_err());
        assert!(b.authorize("x.example").await.is_ok());
    }
}
