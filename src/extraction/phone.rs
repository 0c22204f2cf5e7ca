//! Phone number recognition with surrounding-context classification.
//!
//! Two pattern families: North-American (optional +1, 3-3-4 grouping) and
//! generic international (+CC then 6-12 digits with soft separators). The
//! words around a match classify it ("fax", "mobile", "office") and the
//! tag rides along in `source_location` as `"{source}:{tag}"`.

use super::{ContactCandidate, ContactKind, ExtractionMethod};
use regex::Regex;
use std::sync::OnceLock;

/// How far (in chars) around a match we look for a context keyword.
const CONTEXT_WINDOW: usize = 48;

fn international() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\+[1-9]\d{0,2}[\s().\-]{0,2}(?:\d[\s().\-]{0,2}){5,11}\d").expect("intl regex")
    })
}

fn north_american() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\+?1[\s.\-]?)?(?:\(\d{3}\)|\d{3})[\s.\-]?\d{3}[\s.\-]?\d{4}\b")
            .expect("na regex")
    })
}

/// Extract phone candidates from `text`. International patterns are more
/// specific (leading +CC) and consume their spans first.
pub fn extract_phones(text: &str, source: &str) -> Vec<ContactCandidate> {
    let mut consumed: Vec<(usize, usize)> = Vec::new();
    let mut found: Vec<(usize, ContactCandidate)> = Vec::new();

    for re in [international(), north_american()] {
        for m in re.find_iter(text) {
            if consumed.iter().any(|&(s, e)| m.start() < e && m.end() > s) {
                continue;
            }
            consumed.push((m.start(), m.end()));

            let Some(normalized) = normalize_phone(m.as_str()) else {
                continue;
            };
            let tag = classify_context(text, m.start(), m.end());
            found.push((
                m.start(),
                ContactCandidate {
                    raw_text: m.as_str().to_string(),
                    normalized_value: normalized,
                    kind: ContactKind::Phone,
                    source_location: format!("{source}:{tag}"),
                    extraction_method: ExtractionMethod::PhonePattern,
                },
            ));
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, c)| c).collect()
}

/// E.164-ish canonical form: `+` and digits only. North-American numbers
/// without a country code get `+1`. Implausible digit counts are dropped.
fn normalize_phone(raw: &str) -> Option<String> {
    let had_plus = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    let normalized = if had_plus {
        format!("+{digits}")
    } else if digits.len() == 10 {
        format!("+1{digits}")
    } else if digits.len() == 11 && digits.starts_with('1') {
        format!("+{digits}")
    } else {
        return None;
    };

    let count = normalized.len() - 1;
    (8..=15).contains(&count).then_some(normalized)
}

/// Look for a classifying keyword near the match.
fn classify_context(text: &str, start: usize, end: usize) -> &'static str {
    let before = text[..start]
        .chars()
        .rev()
        .take(CONTEXT_WINDOW)
        .collect::<String>()
        .chars()
        .rev()
        .collect::<String>();
    let after: String = text[end..].chars().take(CONTEXT_WINDOW).collect();
    let window = format!("{} {}", before, after).to_lowercase();

    for (keyword, tag) in [
        ("fax", "fax"),
        ("mobile", "mobile"),
        ("cell", "mobile"),
        ("whatsapp", "mobile"),
        ("office", "office"),
        ("work", "office"),
        ("tel", "tel"),
        ("phone", "tel"),
        ("call", "tel"),
    ] {
        if window.contains(keyword) {
            return tag;
        }
    }
    "unknown"
}
