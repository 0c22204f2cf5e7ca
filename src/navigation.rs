//! Navigation planner: pure link ranking and page classification.
//!
//! The planner never fetches anything. It ranks candidate links toward
//! contact/about/team pages, and classifies page text the caller fetched and
//! fed back. The site-hunt loop in the engine decides when to stop: after
//! the configured page budget, or once a contact page yields an actionable
//! contact.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Coarse page classification used by ranking, scoring, and termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCategory {
    Contact,
    About,
    Team,
    Unknown,
}

impl PageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageCategory::Contact => "contact",
            PageCategory::About => "about",
            PageCategory::Team => "team",
            PageCategory::Unknown => "unknown",
        }
    }
}

/// A link on a fetched page, before ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,
    pub anchor_text: String,
}

/// A ranked link with the category its keywords suggest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationCandidate {
    pub url: String,
    pub anchor_text: String,
    pub priority_score: f64,
    pub page_category: PageCategory,
}

/// Keyword families with their category and base weight.
const KEYWORDS: &[(&str, PageCategory, f64)] = &[
    ("contact", PageCategory::Contact, 3.0),
    ("kontakt", PageCategory::Contact, 3.0),
    ("get in touch", PageCategory::Contact, 3.0),
    ("reach us", PageCategory::Contact, 2.5),
    ("impressum", PageCategory::Contact, 2.5),
    ("about", PageCategory::About, 2.0),
    ("company", PageCategory::About, 1.5),
    ("who we are", PageCategory::About, 2.0),
    ("team", PageCategory::Team, 2.0),
    ("people", PageCategory::Team, 1.5),
    ("staff", PageCategory::Team, 1.5),
    ("leadership", PageCategory::Team, 2.0),
    ("our-team", PageCategory::Team, 2.0),
];

const VISITED_PENALTY: f64 = 5.0;
const OFF_DOMAIN_PENALTY: f64 = 4.0;

/// Rank `links` by how likely they lead to a contact/about/team page.
///
/// Output is ordered by descending priority; ties break on URL so identical
/// input always produces identical output. Links scoring at or below zero
/// (visited, off-domain with no signal) are dropped.
pub fn rank_links(
    links: &[PageLink],
    visited: &HashSet<String>,
    site_domain: &str,
) -> Vec<NavigationCandidate> {
    let mut ranked: Vec<NavigationCandidate> = links
        .iter()
        .map(|link| {
            let anchor = link.anchor_text.to_lowercase();
            let path = Url::parse(&link.url)
                .map(|u| u.path().to_lowercase())
                .unwrap_or_else(|_| link.url.to_lowercase());

            let mut score = 0.0;
            let mut category = PageCategory::Unknown;
            let mut best_weight = 0.0;

            for (keyword, kw_category, weight) in KEYWORDS {
                let mut hit = 0.0;
                if anchor.contains(keyword) {
                    hit += weight * 2.0;
                }
                if path.contains(keyword) {
                    hit += weight * 1.5;
                }
                if hit > 0.0 {
                    score += hit;
                    if *weight > best_weight {
                        best_weight = *weight;
                        category = *kw_category;
                    }
                }
            }

            if visited.contains(&link.url) {
                score -= VISITED_PENALTY;
            }
            if !same_domain(&link.url, site_domain) {
                score -= OFF_DOMAIN_PENALTY;
            }

            NavigationCandidate {
                url: link.url.clone(),
                anchor_text: link.anchor_text.clone(),
                priority_score: score,
                page_category: category,
            }
        })
        .filter(|c| c.priority_score > 0.0)
        .collect();

    ranked.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.url.cmp(&b.url))
    });
    ranked
}

/// Classify fetched page text into a category.
pub fn classify_page(page_text: &str) -> PageCategory {
    let lowered = page_text.to_lowercase();

    let mut scores: [(PageCategory, f64); 3] = [
        (PageCategory::Contact, 0.0),
        (PageCategory::About, 0.0),
        (PageCategory::Team, 0.0),
    ];

    for (keyword, category, weight) in KEYWORDS {
        let hits = lowered.matches(keyword).count();
        if hits == 0 {
            continue;
        }
        let slot = scores
            .iter_mut()
            .find(|(c, _)| *c == *category)
            .expect("category slot");
        slot.1 += weight * (hits.min(5) as f64);
    }

    // Contact surfaces have contact details even when the word is absent.
    if lowered.contains('@') || lowered.contains("phone") || lowered.contains("tel:") {
        scores[0].1 += 1.5;
    }

    let (category, best) = scores
        .iter()
        .fold((PageCategory::Unknown, 0.0), |acc, &(c, s)| {
            if s > acc.1 {
                (c, s)
            } else {
                acc
            }
        });

    if best >= 2.0 {
        category
    } else {
        PageCategory::Unknown
    }
}

fn same_domain(link: &str, site_domain: &str) -> bool {
    if site_domain.is_empty() {
        return true;
    }
    match Url::parse(link) {
        Ok(u) => u
            .host_str()
            .map(|h| h == site_domain || h.ends_with(&format!(".{site_domain}")))
            .unwrap_or(false),
        // Relative links stay on the site.
        Err(_) => !link.starts_with("http"),
    }
}
