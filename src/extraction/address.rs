//! Street-address recognition.
//!
//! Deliberately loose: a leading street number, a few name words, a street
//! suffix, then optional unit / city / state-zip continuations. Listings
//! render addresses a hundred ways; the scorer and the caller's validation
//! decide what is actually usable.

use super::{ContactCandidate, ContactKind, ExtractionMethod};
use regex::Regex;
use std::sync::OnceLock;

fn street() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            \b\d{1,5}\s+
            (?:[A-Za-z0-9'.\-]+\s+){0,3}
            (?:street|st|avenue|ave|road|rd|boulevard|blvd|drive|dr|lane|ln|
               way|court|ct|place|pl|terrace|ter|circle|cir|parkway|pkwy|
               highway|hwy|square|sq)\b\.?
            (?:\s*,?\s*(?:suite|ste|unit|apt|\#)\s*[\w\-]+)?
            # verbose mode eats literal spaces, hence \x20 in the class
            (?:\s*,\s*[A-Za-z][A-Za-z\x20.'\-]+)?
            (?:\s*,?\s+[A-Z]{2}\s+\d{5}(?:-\d{4})?)?
            ",
        )
        .expect("street regex")
    })
}

/// Extract street-address candidates from `text`.
pub fn extract_addresses(text: &str, source: &str) -> Vec<ContactCandidate> {
    street()
        .find_iter(text)
        .filter_map(|m| {
            let normalized = normalize_address(m.as_str())?;
            Some(ContactCandidate {
                raw_text: m.as_str().to_string(),
                normalized_value: normalized,
                kind: ContactKind::Address,
                source_location: source.to_string(),
                extraction_method: ExtractionMethod::AddressPattern,
            })
        })
        .collect()
}

/// Collapse whitespace and trim trailing punctuation. Too-short fragments
/// (a bare number plus suffix) are dropped.
fn normalize_address(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_end_matches(['.', ',', ';']).to_string();
    (trimmed.len() >= 8).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_address_with_city_state_zip() {
        let found = extract_addresses("Visit us at 350 Fifth Avenue, New York, NY 10118.", "text");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].normalized_value, "350 Fifth Avenue, New York, NY 10118");
        assert_eq!(found[0].extraction_method, ExtractionMethod::AddressPattern);
    }

    #[test]
    fn short_street_line() {
        let found = extract_addresses("HQ: 12 Main St, Springfield", "text");
        assert_eq!(found.len(), 1);
        assert!(found[0].normalized_value.starts_with("12 Main St"));
    }

    #[test]
    fn suite_continuation_is_kept() {
        let found = extract_addresses("1600 Market Street, Suite 2200, Philadelphia", "text");
        assert_eq!(found.len(), 1);
        assert!(found[0].normalized_value.contains("Suite 2200"));
    }

    #[test]
    fn bare_number_without_suffix_is_not_an_address() {
        assert!(extract_addresses("we have 42 employees", "text").is_empty());
    }
}
