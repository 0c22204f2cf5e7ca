// Copyright 2026 Prospector Contributors
// SPDX-License-Identifier: Apache-2.0

//! Discovery engine: wires the queue, supervisor, scroll acquisition,
//! navigation, extraction, and scoring into one task-execution loop.
//!
//! The engine owns no browser and no storage. Callers hand it a
//! [`SessionProvider`] for scrollable listing surfaces and a [`PageFetcher`]
//! for static page content, enqueue [`crate::queue::ExtractionTask`]s, and
//! drive workers by calling [`DiscoveryEngine::run_next`] in a loop. Task
//! isolation is strict: one task's failure is recorded against that task and
//! its domain, never propagated to the worker loop.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::entity::ListingEntity;
use crate::error::Error;
use crate::events::{EngineEvent, EventBus};
use crate::extraction::{extract_contacts, ContactKind};
use crate::navigation::{classify_page, rank_links, PageCategory, PageLink};
use crate::queue::{ExtractionTask, Priority, WorkQueue};
use crate::scoring::{score, PageContext, ScoredContact};
use crate::scroll::strategy::StrategyKind;
use crate::scroll::{acquire, AcquireResult};
use crate::session::supervisor::{DomainStatsSnapshot, SessionSupervisor};
use crate::session::{ActionType, BrowserSession, Outcome, SessionLease};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

/// Supplies a scrollable browser session for a listing URL. The session
/// lifecycle (tabs, processes, auth) belongs to the implementation.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session_for(&self, url: &str) -> anyhow::Result<Arc<dyn BrowserSession>>;
}

/// Fetches rendered page content for the site-hunt loop.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<PageContent>;
}

/// One fetched page: visible text, optional raw HTML for DOM extraction,
/// and the outbound links found on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub links: Vec<PageLink>,
}

/// Everything one finished task produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub entities: Vec<ListingEntity>,
    pub scored_contacts: Vec<ScoredContact>,
    pub duration_ms: u64,
    pub pages_visited: u32,
}

impl TaskResult {
    pub fn actionable(&self) -> impl Iterator<Item = &ScoredContact> {
        self.scored_contacts.iter().filter(|c| c.is_actionable)
    }
}

/// Point-in-time monitoring view across the queue and all domain sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub per_domain: HashMap<String, DomainStatsSnapshot>,
    pub queue_depth_by_priority: HashMap<Priority, usize>,
    pub in_flight: usize,
}

/// The engine. Cheap to share behind an `Arc`; every handle drives the same
/// queue and supervisor.
pub struct DiscoveryEngine {
    config: EngineConfig,
    queue: WorkQueue,
    supervisor: SessionSupervisor,
    sessions: Arc<dyn SessionProvider>,
    fetcher: Arc<dyn PageFetcher>,
    events: Arc<EventBus>,
    strategy: StrategyKind,
}

impl DiscoveryEngine {
    pub fn new(
        config: EngineConfig,
        sessions: Arc<dyn SessionProvider>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let events = Arc::new(EventBus::new(256));
        let queue = WorkQueue::new(config.retry.clone(), config.rate_limits.clone())
            .with_events(events.clone());
        let supervisor =
            SessionSupervisor::new(config.supervisor.clone(), config.domain_overrides.clone())
                .with_events(events.clone());
        Self {
            config,
            queue,
            supervisor,
            sessions,
            fetcher,
            events,
            strategy: StrategyKind::Adaptive,
        }
    }

    /// Override the scroll strategy (adaptive by default).
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub async fn enqueue(&self, task: ExtractionTask) {
        self.queue.enqueue(task).await;
    }

    /// Collect a completed task's result.
    pub async fn take_result(&self, task_id: Uuid) -> Option<TaskResult> {
        self.queue.take_result(task_id).await
    }

    /// Run one task off the queue to completion, failure, or deferral.
    ///
    /// Returns the task id that was handled, or `None` when nothing was
    /// eligible. Task-level errors are absorbed into queue bookkeeping;
    /// only queue inconsistencies (unknown task ids) surface as `Err`.
    pub async fn run_next(&self, cancel: &CancelToken) -> Result<Option<Uuid>, Error> {
        let Some(task) = self.queue.dequeue().await else {
            return Ok(None);
        };
        let task_id = task.id;

        let domain = match host_of(&task.target_url) {
            Some(domain) => domain,
            None => {
                let err = Error::MalformedContent(format!("unparseable url {}", task.target_url));
                self.queue.fail(task_id, &err).await?;
                return Ok(Some(task_id));
            }
        };

        let lease = match self.supervisor.authorize(&domain).await {
            Ok(lease) => lease,
            Err(
                Error::CircuitOpen {
                    domain,
                    retry_after,
                }
                | Error::RateLimited {
                    domain,
                    retry_after,
                },
            ) => {
                self.queue.defer(task_id, &domain, retry_after).await?;
                return Ok(Some(task_id));
            }
            Err(err) => {
                self.queue.fail(task_id, &err).await?;
                return Ok(Some(task_id));
            }
        };

        self.events.emit(EngineEvent::TaskStarted {
            task_id,
            domain: domain.clone(),
        });
        tracing::info!(task_id = %task_id, domain, attempt = task.attempt, "task started");

        let started = Instant::now();
        match self.run_task(&task, &domain, &lease, cancel).await {
            Ok(mut result) => {
                result.duration_ms = started.elapsed().as_millis() as u64;
                self.supervisor
                    .report(&domain, Outcome::success(started.elapsed()));
                self.events.emit(EngineEvent::TaskCompleted {
                    task_id,
                    entities: result.entities.len(),
                    contacts: result.scored_contacts.len(),
                    actionable: result.actionable().count(),
                    duration_ms: result.duration_ms,
                });
                self.queue.complete(task_id, result).await?;
            }
            Err(err) => {
                self.supervisor
                    .report(&domain, Outcome::failure(started.elapsed()));
                tracing::warn!(task_id = %task_id, domain, error = %err, "task errored");
                self.queue.fail(task_id, &err).await?;
            }
        }
        Ok(Some(task_id))
    }

    /// One task end to end: scroll-acquire the listing surface, then hunt
    /// the site for contact surfaces and score what they yield.
    async fn run_task(
        &self,
        task: &ExtractionTask,
        domain: &str,
        lease: &SessionLease,
        cancel: &CancelToken,
    ) -> Result<TaskResult, Error> {
        tokio::time::sleep(lease.delay_for(ActionType::Navigate)).await;

        let session = self.sessions.session_for(&task.target_url).await?;
        let mut strategy = self.strategy.build(&self.config.scroll);
        let acquired: AcquireResult =
            acquire(session.as_ref(), strategy.as_mut(), &self.config.scroll, cancel).await?;
        self.events.emit(EngineEvent::ScrollFinished {
            domain: domain.to_string(),
            iterations: acquired.iterations,
            entities: acquired.entities.len(),
            reason: acquired.reason.as_str().to_string(),
            partial: acquired.is_partial(),
        });

        let (scored_contacts, pages_visited) = self
            .hunt_site(&task.target_url, domain, lease, cancel)
            .await;

        Ok(TaskResult {
            task_id: task.id,
            entities: acquired.entities,
            scored_contacts,
            duration_ms: 0,
            pages_visited,
        })
    }

    /// Bounded site hunt: fetch, classify, extract, score; follow the
    /// planner's best links until the page budget is spent or a contact
    /// page yields an actionable contact.
    async fn hunt_site(
        &self,
        seed_url: &str,
        domain: &str,
        lease: &SessionLease,
        cancel: &CancelToken,
    ) -> (Vec<ScoredContact>, u32) {
        let weights = self.config.weights_for(domain);
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<String> = VecDeque::from([seed_url.to_string()]);
        let mut contacts: Vec<ScoredContact> = Vec::new();
        let mut seen_values: HashSet<(ContactKind, String)> = HashSet::new();
        let mut pages_visited = 0u32;

        while let Some(url) = frontier.pop_front() {
            if cancel.is_cancelled() || pages_visited >= self.config.max_pages_per_site {
                break;
            }
            if !visited.insert(url.clone()) {
                continue;
            }

            tokio::time::sleep(lease.delay_for(ActionType::Read)).await;
            let page = match self.fetcher.fetch(&url).await {
                Ok(page) => page,
                Err(err) => {
                    // A dead link mid-hunt is not fatal; move on.
                    tracing::debug!(url, error = %err, "page fetch failed, skipping");
                    pages_visited += 1;
                    continue;
                }
            };
            pages_visited += 1;

            let category = classify_page(&page.text);
            self.events.emit(EngineEvent::PageVisited {
                url: url.clone(),
                category: category.as_str().to_string(),
            });

            let context = PageContext {
                site_domain: domain.to_string(),
                page_category: category,
                surrounding_text: None,
            };
            let mut actionable_here = false;
            for candidate in extract_contacts(&page.text, page.html.as_deref()) {
                if !seen_values.insert((candidate.kind, candidate.normalized_value.clone())) {
                    continue;
                }
                let scored = score(&candidate, &context, &weights);
                actionable_here |= scored.is_actionable;
                contacts.push(scored);
            }

            // A contact page that produced an actionable contact ends the hunt.
            if category == PageCategory::Contact && actionable_here {
                break;
            }

            for candidate in rank_links(&page.links, &visited, domain) {
                frontier.push_back(candidate.url);
            }
        }

        (contacts, pages_visited)
    }

    /// Eventually-consistent stats across queue and domains.
    pub async fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            per_domain: self.supervisor.snapshot(),
            queue_depth_by_priority: self.queue.depth_by_priority().await,
            in_flight: self.queue.in_flight_count().await,
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}
