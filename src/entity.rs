//! Listing entities read from the scroll surface.
//!
//! Identity is a hash of the normalized name and address, so the same
//! business re-rendered with minor text drift across scroll frames (extra
//! whitespace, trailing punctuation, case changes) dedupes to one entity.

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;

/// One business/listing entry as read from the visible viewport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingEntity {
    /// Display name as rendered.
    pub name: String,
    /// Street address as rendered, possibly empty.
    pub address: String,
    /// Any extra text the session reader captured (category, snippet).
    #[serde(default)]
    pub extra: Option<String>,
}

impl ListingEntity {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            extra: None,
        }
    }

    /// Stable dedup key: FNV over (normalized name, normalized address).
    pub fn identity(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        hasher.write(normalize(&self.name).as_bytes());
        hasher.write(&[0x1f]);
        hasher.write(normalize(&self.address).as_bytes());
        hasher.finish()
    }
}

/// Lowercase, collapse runs of whitespace, strip edge punctuation.
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = true;
    for ch in lowered.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim_matches(|c: char| c.is_ascii_punctuation() || c == ' ')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_tolerates_whitespace_and_case_drift() {
        let a = ListingEntity::new("Acme  Plumbing", "12 Main St.");
        let b = ListingEntity::new("acme plumbing", " 12 Main St ");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn different_addresses_are_different_entities() {
        let a = ListingEntity::new("Acme Plumbing", "12 Main St");
        let b = ListingEntity::new("Acme Plumbing", "99 Oak Ave");
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn normalize_collapses_interior_whitespace() {
        assert_eq!(normalize("  A \t B\n C  "), "a b c");
    }
}
