//! Contact scorer: pure mapping from candidate + page context to
//! quality/business/personal scores.
//!
//! Weights come from runtime configuration so a campaign can bias toward
//! business or personal outreach without touching code. The function is
//! deterministic: identical inputs produce bit-identical output.

use crate::config::ScoringWeights;
use crate::extraction::{ContactCandidate, ContactKind};
use crate::navigation::PageCategory;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Free-mail providers that rarely belong to the business being crawled.
const FREEMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
    "icloud.com",
    "protonmail.com",
    "proton.me",
    "gmx.com",
    "mail.com",
    "live.com",
    "msn.com",
];

/// Role keywords scoring high on the business axis.
const ROLE_HIGH: &[&str] = &[
    "ceo", "cto", "cfo", "coo", "vp", "founder", "owner", "president", "partner", "principal",
    "director", "sales", "bd", "business",
];

/// Generic shared-mailbox keywords scoring medium.
const ROLE_MEDIUM: &[&str] = &[
    "info",
    "admin",
    "office",
    "contact",
    "hello",
    "team",
    "support",
    "enquiries",
    "inquiries",
    "mail",
    "hq",
];

/// Context a candidate was found in, as seen by the scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContext {
    /// Registrable domain of the site being crawled.
    pub site_domain: String,
    /// Category the navigation planner assigned to the page.
    pub page_category: PageCategory,
    /// Text near the candidate, used for role-keyword hints. Optional.
    #[serde(default)]
    pub surrounding_text: Option<String>,
}

impl PageContext {
    pub fn new(site_domain: impl Into<String>) -> Self {
        Self {
            site_domain: site_domain.into(),
            page_category: PageCategory::Unknown,
            surrounding_text: None,
        }
    }
}

/// A candidate with its outreach scores attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredContact {
    pub candidate: ContactCandidate,
    pub quality_score: f64,
    pub business_score: f64,
    pub personal_score: f64,
    /// Weighted sum of the three axes, clipped to [0, 1].
    pub combined_score: f64,
    /// True iff the combined score clears the configured threshold AND the
    /// normalized value passes syntactic validation.
    pub is_actionable: bool,
}

/// Score one candidate against its page context.
pub fn score(
    candidate: &ContactCandidate,
    context: &PageContext,
    weights: &ScoringWeights,
) -> ScoredContact {
    let quality = quality_score(candidate, context);
    let (business, personal) = business_personal(candidate, context);

    let combined = (weights.quality * quality
        + weights.business * business
        + weights.personal * personal)
        .clamp(0.0, 1.0);

    let actionable =
        combined >= weights.actionable_threshold && syntactic_valid(candidate.kind, &candidate.normalized_value);

    ScoredContact {
        candidate: candidate.clone(),
        quality_score: quality,
        business_score: business,
        personal_score: personal,
        combined_score: combined,
        is_actionable: actionable,
    }
}

/// Final syntactic gate for actionability.
pub fn syntactic_valid(kind: ContactKind, value: &str) -> bool {
    match kind {
        ContactKind::Email => {
            value.split_once('@').is_some_and(|(local, domain)| {
                !local.is_empty() && domain.contains('.') && !value.contains("..")
            })
        }
        ContactKind::Phone => {
            let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
            value.starts_with('+') && (8..=15).contains(&digits)
        }
        ContactKind::Address => value.len() >= 8 && value.chars().any(|c| c.is_ascii_digit()),
    }
}

fn quality_score(candidate: &ContactCandidate, context: &PageContext) -> f64 {
    match candidate.kind {
        ContactKind::Email => {
            let (local, domain) = candidate
                .normalized_value
                .split_once('@')
                .unwrap_or((candidate.normalized_value.as_str(), ""));
            let mut q: f64 = 0.7;

            if FREEMAIL_DOMAINS.contains(&domain) {
                q -= 0.35;
            }
            if digit_ratio(local) > 0.3 {
                q -= 0.2;
            }
            if local.len() < 2 {
                q -= 0.3;
            }
            // Alignment with the crawled site's own domain is the strongest
            // signal that the address really belongs to this business.
            if !context.site_domain.is_empty()
                && (domain == context.site_domain
                    || domain.ends_with(&format!(".{}", context.site_domain))
                    || context.site_domain.ends_with(&format!(".{domain}")))
            {
                q += 0.3;
            }
            q.clamp(0.0, 1.0)
        }
        ContactKind::Phone => {
            let tag = candidate
                .source_location
                .rsplit_once(':')
                .map(|(_, t)| t)
                .unwrap_or("unknown");
            let mut q: f64 = 0.6;
            if tag != "unknown" {
                q += 0.15;
            }
            if tag == "fax" {
                q -= 0.25;
            }
            q.clamp(0.0, 1.0)
        }
        ContactKind::Address => {
            let v = &candidate.normalized_value;
            let mut q: f64 = 0.5;
            if v.len() > 12 && v.chars().any(|c| c.is_ascii_digit()) {
                q += 0.2;
            }
            q.clamp(0.0, 1.0)
        }
    }
}

fn business_personal(candidate: &ContactCandidate, context: &PageContext) -> (f64, f64) {
    let local = match candidate.kind {
        ContactKind::Email => candidate
            .normalized_value
            .split_once('@')
            .map(|(l, _)| l)
            .unwrap_or(""),
        // Phones and addresses have no local part; they score on context only.
        _ => "",
    };

    let tokens: Vec<&str> = local
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|t| !t.is_empty())
        .collect();

    let mut business: f64 = 0.0;
    for token in &tokens {
        if ROLE_HIGH.contains(token) {
            business = business.max(1.0);
        } else if ROLE_MEDIUM.contains(token) {
            business = business.max(0.6);
        }
    }

    // Role keywords near the match nudge the business axis.
    if let Some(text) = &context.surrounding_text {
        let lowered = text.to_lowercase();
        if ROLE_HIGH.iter().any(|k| lowered.contains(k)) {
            business = (business + 0.2).min(1.0);
        }
    }

    // Complement of the business axis, with headroom reserved for the
    // first.last name boost so a named person outranks a generic mailbox.
    let mut personal = (1.0 - business).max(0.0) * 0.7;
    if first_last_pattern().is_match(local) {
        personal = (personal + 0.3).min(1.0);
    }

    (business, personal)
}

fn digit_ratio(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    digits as f64 / s.chars().count() as f64
}

/// `first.last` / `first_last` shaped local parts.
fn first_last_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2,}[._][a-z]{2,}$").expect("name pattern"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionMethod;

    fn email_candidate(value: &str) -> ContactCandidate {
        ContactCandidate {
            raw_text: value.to_string(),
            normalized_value: value.to_string(),
            kind: ContactKind::Email,
            source_location: "text".to_string(),
            extraction_method: ExtractionMethod::PlainText,
        }
    }

    #[test]
    fn scoring_is_deterministic_bit_identical() {
        let candidate = email_candidate("jane.doe@acme.com");
        let context = PageContext::new("acme.com");
        let weights = ScoringWeights::default();

        let a = score(&candidate, &context, &weights);
        let b = score(&candidate, &context, &weights);
        assert_eq!(a.combined_score.to_bits(), b.combined_score.to_bits());
        assert_eq!(a.quality_score.to_bits(), b.quality_score.to_bits());
        assert_eq!(a.business_score.to_bits(), b.business_score.to_bits());
        assert_eq!(a.personal_score.to_bits(), b.personal_score.to_bits());
        assert_eq!(a.is_actionable, b.is_actionable);
    }

    #[test]
    fn freemail_scores_below_own_domain() {
        let context = PageContext::new("acme.com");
        let weights = ScoringWeights::default();
        let own = score(&email_candidate("sales@acme.com"), &context, &weights);
        let free = score(&email_candidate("sales@gmail.com"), &context, &weights);
        assert!(own.quality_score > free.quality_score);
    }

    #[test]
    fn digit_heavy_local_part_is_penalized() {
        let context = PageContext::new("acme.com");
        let weights = ScoringWeights::default();
        let clean = score(&email_candidate("sales@other.com"), &context, &weights);
        let noisy = score(&email_candidate("x9412358@other.com"), &context, &weights);
        assert!(clean.quality_score > noisy.quality_score);
    }

    #[test]
    fn role_keywords_drive_business_axis() {
        let context = PageContext::new("acme.com");
        let weights = ScoringWeights::default();
        let ceo = score(&email_candidate("ceo@acme.com"), &context, &weights);
        let info = score(&email_candidate("info@acme.com"), &context, &weights);
        let person = score(&email_candidate("jane.doe@acme.com"), &context, &weights);

        assert_eq!(ceo.business_score, 1.0);
        assert_eq!(info.business_score, 0.6);
        assert_eq!(person.business_score, 0.0);
        assert!(person.personal_score > ceo.personal_score);
    }

    #[test]
    fn first_last_pattern_boosts_personal() {
        let context = PageContext::new("acme.com");
        let weights = ScoringWeights::default();
        let named = score(&email_candidate("jane.doe@acme.com"), &context, &weights);
        let generic = score(&email_candidate("webmaster@acme.com"), &context, &weights);
        assert!(named.personal_score > generic.personal_score);
    }

    #[test]
    fn weights_bias_business_vs_personal() {
        let context = PageContext::new("acme.com");
        let candidate = email_candidate("sales@acme.com");

        let business_heavy = ScoringWeights {
            quality: 0.2,
            business: 0.8,
            personal: 0.0,
            actionable_threshold: 0.45,
        };
        let personal_heavy = ScoringWeights {
            quality: 0.2,
            business: 0.0,
            personal: 0.8,
            actionable_threshold: 0.45,
        };
        let b = score(&candidate, &context, &business_heavy);
        let p = score(&candidate, &context, &personal_heavy);
        assert!(b.combined_score > p.combined_score);
    }

    #[test]
    fn combined_score_is_clipped_to_unit_interval() {
        let context = PageContext::new("acme.com");
        let weights = ScoringWeights {
            quality: 5.0,
            business: 5.0,
            personal: 5.0,
            actionable_threshold: 0.45,
        };
        let s = score(&email_candidate("sales@acme.com"), &context, &weights);
        assert!(s.combined_score <= 1.0);
        assert!(s.combined_score >= 0.0);
    }

    #[test]
    fn actionable_requires_threshold_and_validity() {
        let context = PageContext::new("acme.com");
        let weights = ScoringWeights {
            actionable_threshold: 0.99,
            ..Default::default()
        };
        let s = score(&email_candidate("sales@acme.com"), &context, &weights);
        assert!(!s.is_actionable);

        let weights = ScoringWeights {
            actionable_threshold: 0.1,
            ..Default::default()
        };
        let s = score(&email_candidate("sales@acme.com"), &context, &weights);
        assert!(s.is_actionable);
    }

    #[test]
    fn phone_fax_scores_below_office() {
        let weights = ScoringWeights::default();
        let context = PageContext::new("acme.com");
        let fax = ContactCandidate {
            raw_text: "612-555-0100".into(),
            normalized_value: "+16125550100".into(),
            kind: ContactKind::Phone,
            source_location: "text:fax".into(),
            extraction_method: ExtractionMethod::PhonePattern,
        };
        let office = ContactCandidate {
            source_location: "text:office".into(),
            ..fax.clone()
        };
        assert!(
            score(&office, &context, &weights).quality_score
                > score(&fax, &context, &weights).quality_score
        );
    }
}
