// Copyright 2026 Prospector Contributors
// SPDX-License-Identifier: Apache-2.0

//! Prospector, a contact-discovery engine.
//!
//! Given a target site, Prospector drives repeated acquisition of
//! dynamically-loaded listing content through an externally-owned browser
//! session, extracts structured contact entities (emails, phones, addresses)
//! despite obfuscation, scores them for outreach relevance, and releases work
//! units through a rate-limited priority queue.
//!
//! This is an in-process library: the browser process, the campaign layer,
//! and result persistence all live in the caller. The crate owns no wire
//! protocol and performs no storage I/O.

#![allow(clippy::new_without_default)]

pub mod cancel;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod events;
pub mod extraction;
pub mod navigation;
pub mod queue;
pub mod scoring;
pub mod scroll;
pub mod session;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use engine::{DiscoveryEngine, PageContent, PageFetcher, SessionProvider, TaskResult};
pub use error::{Error, Result};
pub use extraction::{extract_contacts, ContactCandidate, ContactKind, ExtractionMethod};
pub use scoring::{score, PageContext, ScoredContact};
pub use session::{supervisor::SessionSupervisor, BrowserSession};
