//! Email recognition across obfuscation encodings.
//!
//! Each decoder is a compiled regex paired with the [`ExtractionMethod`] it
//! reports. Decoders run in specificity order over the original text;
//! matched spans are consumed so a less specific decoder never re-matches
//! inside them. Candidates that fail syntactic validation after decoding are
//! dropped without comment.

use super::{ContactCandidate, ContactKind, ExtractionMethod};
use regex::Regex;
use std::sync::OnceLock;

/// Local-part fragment shared by most decoders.
const LOCAL: &str = r"[A-Za-z0-9][A-Za-z0-9._%+\-]{0,63}";

struct Decoder {
    method: ExtractionMethod,
    pattern: Regex,
}

fn decoders() -> &'static [Decoder] {
    static DECODERS: OnceLock<Vec<Decoder>> = OnceLock::new();
    DECODERS.get_or_init(|| {
        let make = |method, pattern: String| Decoder {
            method,
            pattern: Regex::new(&pattern).expect("decoder regex"),
        };
        vec![
            // mailto: links, optionally with %40 for the separator.
            make(
                ExtractionMethod::MailtoLink,
                r"(?i)mailto:\s*([A-Za-z0-9._%+\-]+(?:@|%40)[A-Za-z0-9.\-]+\.[A-Za-z]{2,24})"
                    .to_string(),
            ),
            // Numeric/hex entity separators: &#64; &#x40; &#46; &#x2e;
            make(
                ExtractionMethod::HtmlEntity,
                format!(
                    r"(?i)({LOCAL})\s*(?:&#0*64;|&#x0*40;)\s*((?:[A-Za-z0-9\-]+(?:\.|&#0*46;|&#x0*2e;))+[A-Za-z]{{2,24}})"
                ),
            ),
            // Full-width unicode at/dot.
            make(
                ExtractionMethod::FullWidth,
                format!(r"(?i)({LOCAL})\s*＠\s*((?:[A-Za-z0-9\-]+(?:\.|．))+[A-Za-z]{{2,24}})"),
            ),
            // [at] (at) {at} with [dot] (dot) {dot} in the domain.
            make(
                ExtractionMethod::BracketSubstitution,
                format!(
                    r"(?i)({LOCAL})\s*[\[({{]\s*at\s*[\])}}]\s*((?:[A-Za-z0-9\-]+\s*(?:\.|[\[({{]\s*dot\s*[\])}}])\s*)+[A-Za-z]{{2,24}})"
                ),
            ),
            // Spelled-out " at " / " AT " with " dot " in the domain.
            make(
                ExtractionMethod::WordSubstitution,
                format!(
                    r"(?i)\b({LOCAL})\s+at\s+((?:[A-Za-z0-9\-]+(?:\.|\s+dot\s+))+[A-Za-z]{{2,24}})\b"
                ),
            ),
            // _at_ and -at- substitutions; local excludes _ and - to keep the
            // separator unambiguous.
            make(
                ExtractionMethod::SeparatorSubstitution,
                r"(?i)\b([A-Za-z0-9][A-Za-z0-9.%+]{0,63})[_\-]at[_\-]((?:[A-Za-z0-9]+(?:\.|[_\-]dot[_\-]))+[A-Za-z]{2,24})\b"
                    .to_string(),
            ),
            // Plain, unobfuscated address.
            make(
                ExtractionMethod::PlainText,
                format!(r"(?i)\b({LOCAL})@((?:[A-Za-z0-9\-]+\.)+[A-Za-z]{{2,24}})\b"),
            ),
        ]
    })
}

/// Final shape every decoded value must satisfy.
fn valid_email(value: &str) -> bool {
    static VALID: OnceLock<Regex> = OnceLock::new();
    let re = VALID.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9._%+\-]*@[a-z0-9][a-z0-9.\-]*\.[a-z]{2,24}$")
            .expect("email validation regex")
    });
    if !re.is_match(value) || value.contains("..") {
        return false;
    }
    let (local, _) = value.split_once('@').expect("validated shape");
    !local.ends_with('.')
}

/// Scan `text` with every decoder, most specific first.
pub fn extract_emails(text: &str, source: &str) -> Vec<ContactCandidate> {
    let mut consumed: Vec<(usize, usize)> = Vec::new();
    let mut found: Vec<(usize, ContactCandidate)> = Vec::new();

    for decoder in decoders() {
        for caps in decoder.pattern.captures_iter(text) {
            let whole = caps.get(0).expect("match group 0");
            if overlaps(&consumed, whole.start(), whole.end()) {
                continue;
            }
            // The span belongs to this decoder whether or not it decodes
            // cleanly; malformed encodings are dropped, not retried.
            consumed.push((whole.start(), whole.end()));

            let normalized = match decoder.method {
                ExtractionMethod::MailtoLink => normalize_mailto(whole.as_str()),
                _ => normalize_parts(&caps[1], &caps[2]),
            };
            let Some(normalized) = normalized else { continue };

            found.push((
                whole.start(),
                ContactCandidate {
                    raw_text: whole.as_str().to_string(),
                    normalized_value: normalized,
                    kind: ContactKind::Email,
                    source_location: source.to_string(),
                    extraction_method: decoder.method,
                },
            ));
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, c)| c).collect()
}

/// Decode a `mailto:` href or text fragment to a canonical address.
pub fn normalize_mailto(raw: &str) -> Option<String> {
    let rest = raw.trim().strip_prefix("mailto:").unwrap_or(raw.trim());
    // Drop ?subject=... and friends.
    let addr = rest.split('?').next()?.replace("%40", "@");
    let addr = addr.trim().to_lowercase();
    valid_email(&addr).then_some(addr)
}

/// Reassemble a (local, obfuscated-domain) capture pair.
fn normalize_parts(local: &str, domain: &str) -> Option<String> {
    static DOT_VARIANTS: OnceLock<Regex> = OnceLock::new();
    let dots = DOT_VARIANTS.get_or_init(|| {
        Regex::new(r"(?i)&#0*46;|&#x0*2e;|．|[\[({]\s*dot\s*[\])}]|\s+dot\s+|[_\-]dot[_\-]")
            .expect("dot variant regex")
    });

    let local = local.trim().to_lowercase();
    let domain: String = dots
        .replace_all(domain, ".")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let value = format!("{local}@{}", domain.to_lowercase());
    valid_email(&value).then_some(value)
}

fn overlaps(consumed: &[(usize, usize)], start: usize, end: usize) -> bool {
    consumed.iter().any(|&(s, e)| start < e && end > s)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One synthetic string per encoding must yield exactly one candidate
    /// with the canonical normalized value.
    fn assert_single(text: &str, expected: &str, method: ExtractionMethod) {
        let found = extract_emails(text, "text");
        assert_eq!(found.len(), 1, "input {text:?} found {found:?}");
        assert_eq!(found[0].normalized_value, expected);
        assert_eq!(found[0].extraction_method, method);
    }

    #[test]
    fn plain_address() {
        assert_single(
            "write to Sales@Biz.com today",
            "sales@biz.com",
            ExtractionMethod::PlainText,
        );
    }

    #[test]
    fn bracket_substitution() {
        assert_single(
            "sales [at] biz [dot] com",
            "sales@biz.com",
            ExtractionMethod::BracketSubstitution,
        );
        assert_single(
            "info (at) shop (dot) example (dot) org",
            "info@shop.example.org",
            ExtractionMethod::BracketSubstitution,
        );
    }

    #[test]
    fn word_substitution() {
        assert_single(
            "contact: sales AT biz DOT com.",
            "sales@biz.com",
            ExtractionMethod::WordSubstitution,
        );
    }

    #[test]
    fn separator_substitution() {
        assert_single(
            "ping sales_at_biz_dot_com for pricing",
            "sales@biz.com",
            ExtractionMethod::SeparatorSubstitution,
        );
        assert_single(
            "ping sales-at-biz-dot-com for pricing",
            "sales@biz.com",
            ExtractionMethod::SeparatorSubstitution,
        );
    }

    #[test]
    fn html_entity_encodings() {
        assert_single(
            "sales&#64;biz&#46;com",
            "sales@biz.com",
            ExtractionMethod::HtmlEntity,
        );
        assert_single(
            "sales&#x40;biz.com",
            "sales@biz.com",
            ExtractionMethod::HtmlEntity,
        );
    }

    #[test]
    fn full_width_separators() {
        assert_single("sales＠biz．com", "sales@biz.com", ExtractionMethod::FullWidth);
    }

    #[test]
    fn mailto_link_with_query() {
        assert_single(
            "see mailto:Owner@Shop.example?subject=Hi",
            "owner@shop.example",
            ExtractionMethod::MailtoLink,
        );
    }

    #[test]
    fn mailto_percent_encoded_at() {
        assert_single(
            "mailto:owner%40shop.example",
            "owner@shop.example",
            ExtractionMethod::MailtoLink,
        );
    }

    #[test]
    fn most_specific_decoder_wins_overlap() {
        // A mailto wrapping a plain address must not double-count.
        let found = extract_emails("mailto:sales@biz.com", "text");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].extraction_method, ExtractionMethod::MailtoLink);
    }

    #[test]
    fn malformed_encoding_is_dropped_silently() {
        // Entity sequence that decodes to an invalid domain.
        assert!(extract_emails("sales&#64;&#46;com", "text").is_empty());
        assert!(extract_emails("@nodomain.com", "text").is_empty());
    }

    #[test]
    fn double_dot_rejected_after_decode() {
        assert!(valid_email("a@b.com"));
        assert!(!valid_email("a..b@c.com"));
        assert!(!valid_email("a@b..com"));
    }

    #[test]
    fn multiple_distinct_addresses_in_order() {
        let found = extract_emails("first@a.com then second [at] b [dot] org", "text");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].normalized_value, "first@a.com");
        assert_eq!(found[1].normalized_value, "second@b.org");
    }
}
