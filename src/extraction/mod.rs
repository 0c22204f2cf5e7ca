//! Pattern extraction library: stateless contact recognition.
//!
//! Pulls emails, phone numbers, and street addresses out of free text and,
//! when a DOM context is supplied, out of `mailto:` hrefs, image alt text,
//! and inline script/style blocks (via the `scraper` crate). Everything here
//! is a pure function: no network, no mutable state, deterministic and
//! order-stable for identical input. Malformed encodings that fail to decode
//! are silently dropped; this layer is heuristic, not validating.
//!
//! # Overlap precedence
//!
//! Decoders run in fixed specificity order (mailto > HTML entity >
//! full-width > bracket > word > separator > plain). The first decoder to
//! match a span consumes it; later decoders never re-match inside a consumed
//! span, so overlapping obfuscations resolve deterministically to the most
//! specific pattern.

pub mod address;
pub mod email;
pub mod phone;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

/// What kind of contact a candidate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Email,
    Phone,
    Address,
}

/// Which recognizer produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// `mailto:` link in text or an anchor href.
    MailtoLink,
    /// Numeric or hex HTML entity encoding (`&#64;`, `&#x40;`).
    HtmlEntity,
    /// Full-width unicode separators (＠, ．).
    FullWidth,
    /// Bracketed substitutions: `[at]`, `(at)`, `{dot}`.
    BracketSubstitution,
    /// Spelled-out separators: `sales at biz dot com`.
    WordSubstitution,
    /// Underscore/dash substitutions: `_at_`, `-dot-`.
    SeparatorSubstitution,
    /// Unobfuscated address.
    PlainText,
    /// North-American or international phone pattern.
    PhonePattern,
    /// Street-address pattern.
    AddressPattern,
}

/// An unscored match from pattern extraction. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactCandidate {
    /// The text exactly as matched.
    pub raw_text: String,
    /// Canonical form: `user@host.tld`, `+1...` digits, or a collapsed
    /// address line.
    pub normalized_value: String,
    pub kind: ContactKind,
    /// Provenance: `"text"`, `"a[mailto]"`, `"img[alt]"`, `"script"`,
    /// `"style"`. Phone candidates append a context tag, e.g. `"text:fax"`.
    pub source_location: String,
    pub extraction_method: ExtractionMethod,
}

/// Extract every contact candidate from `text`, plus DOM-only surfaces when
/// `dom_context` carries the page HTML.
///
/// Output order: text candidates by position, then DOM candidates in
/// document order. Duplicate (kind, normalized value) pairs keep only the
/// first occurrence, which by construction is the most specific match.
pub fn extract_contacts(text: &str, dom_context: Option<&str>) -> Vec<ContactCandidate> {
    let mut candidates = email::extract_emails(text, "text");
    candidates.extend(phone::extract_phones(text, "text"));
    candidates.extend(address::extract_addresses(text, "text"));

    if let Some(html) = dom_context {
        candidates.extend(extract_from_dom(html));
    }

    dedupe_stable(candidates)
}

/// DOM surfaces that plain text extraction never sees.
fn extract_from_dom(html: &str) -> Vec<ContactCandidate> {
    let document = Html::parse_document(html);
    let mut out = Vec::new();

    // mailto anchors carry the address even when the anchor text is "Email us".
    if let Ok(sel) = Selector::parse(r#"a[href^="mailto:"]"#) {
        for el in document.select(&sel) {
            if let Some(href) = el.value().attr("href") {
                if let Some(normalized) = email::normalize_mailto(href) {
                    out.push(ContactCandidate {
                        raw_text: href.to_string(),
                        normalized_value: normalized,
                        kind: ContactKind::Email,
                        source_location: "a[mailto]".to_string(),
                        extraction_method: ExtractionMethod::MailtoLink,
                    });
                }
            }
        }
    }

    // Alt text is a common hiding spot for scrape-resistant contact info.
    if let Ok(sel) = Selector::parse("img[alt]") {
        for el in document.select(&sel) {
            if let Some(alt) = el.value().attr("alt") {
                out.extend(email::extract_emails(alt, "img[alt]"));
                out.extend(phone::extract_phones(alt, "img[alt]"));
            }
        }
    }

    // Inline scripts and styles often assemble or hide addresses.
    for (tag, source) in [("script", "script"), ("style", "style")] {
        if let Ok(sel) = Selector::parse(tag) {
            for el in document.select(&sel) {
                let inner: String = el.text().collect();
                out.extend(email::extract_emails(&inner, source));
                out.extend(phone::extract_phones(&inner, source));
            }
        }
    }

    out
}

/// Keep the first candidate per (kind, normalized value), preserving order.
fn dedupe_stable(candidates: Vec<ContactCandidate>) -> Vec<ContactCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.kind, c.normalized_value.clone())))
        .collect()
}
