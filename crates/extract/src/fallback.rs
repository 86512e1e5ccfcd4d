//! Deterministic, network-free extraction.
//!
//! Each field name is mapped onto a [`FieldRule`] by matching the normalized
//! name against an ordered registry. Unrecognized names use the generic
//! keyword rule, which treats the field name itself as the search token.

use regex::Regex;
use std::sync::LazyLock;

use crate::normalizer::clean_value;
use crate::schema::{Engine, EntityCandidate, FieldSchema};

/// Characters scanned after a keyword when looking for a nearby span.
const PROXIMITY_CHARS: usize = 80;
/// Longest line returned by the line rule.
const MAX_LINE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    Email,
    Phone,
    Date,
    GenericKeyword,
}

static RULE_REGISTRY: LazyLock<Vec<(Regex, FieldRule)>> = LazyLock::new(|| {
    [
        (r"\be ?mails?\b", FieldRule::Email),
        (
            r"\b(?:tele|cell)?phones?\b|\btel\b|\bmobile\b|\bcell\b|\bfax\b",
            FieldRule::Phone,
        ),
        (r"\bdates?\b|\bdob\b|\bbirth|\bdeadlines?\b|\bexpir", FieldRule::Date),
    ]
    .into_iter()
    .map(|(pattern, rule)| (Regex::new(pattern).expect("valid regex"), rule))
    .collect()
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid regex")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{2,4}\)\s?|\b\d{2,4}[\s.-])?\b\d{3}[\s.-]\d{4}\b")
        .expect("valid regex")
});

static DATE: LazyLock<Regex> = LazyLock::new(|| {
    let month = r"(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)";
    Regex::new(&format!(
        r"(?i)\b\d{{4}}-\d{{2}}-\d{{2}}\b|\b\d{{1,2}}[/.-]\d{{1,2}}[/.-]\d{{2,4}}\b|\b{month}\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b|\b\d{{1,2}}(?:st|nd|rd|th)?\s+{month}\.?,?\s+\d{{4}}\b"
    ))
    .expect("valid regex")
});

static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("\"([^\"\\n]{1,80})\"|\u{201C}([^\u{201D}\\n]{1,80})\u{201D}").expect("valid regex")
});

static CAPITALIZED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\p{Lu}[\p{L}\p{N}&'.-]*(?:[ \t]+\p{Lu}[\p{L}\p{N}&'.-]*)*").expect("valid regex")
});

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex"));

impl FieldRule {
    /// First registry entry whose pattern matches the normalized field name.
    pub fn for_field(field: &str) -> Self {
        let normalized = NON_ALNUM.replace_all(&field.to_lowercase(), " ").into_owned();

        RULE_REGISTRY
            .iter()
            .find(|(pattern, _)| pattern.is_match(&normalized))
            .map(|(_, rule)| *rule)
            .unwrap_or(FieldRule::GenericKeyword)
    }
}

/// A value found by a rule, tagged with the rule variant that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Match {
    value: String,
    class: &'static str,
}

impl Match {
    fn new(value: &str, class: &'static str) -> Option<Self> {
        let value = clean_value(value.trim_end_matches(['.', ',', ';', ':']));
        if value.is_empty() {
            None
        } else {
            Some(Self { value, class })
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackExtractor;

impl FallbackExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Run every field's rule over the text. Output order is schema order,
    /// then text order within a field.
    pub fn extract(&self, document: &str, text: &str, schema: &FieldSchema) -> Vec<EntityCandidate> {
        let mut candidates = Vec::new();

        for field in schema.iter() {
            let matches = match FieldRule::for_field(field) {
                FieldRule::Email => pattern_matches(&EMAIL, text, "email"),
                FieldRule::Phone => pattern_matches(&PHONE, text, "phone"),
                FieldRule::Date => pattern_matches(&DATE, text, "date"),
                FieldRule::GenericKeyword => keyword_matches(field, text),
            };

            candidates.extend(matches.into_iter().map(|m| EntityCandidate {
                field: field.to_string(),
                value: m.value,
                source_document: document.to_string(),
                extraction_class: m.class.to_string(),
                engine: Engine::Fallback,
            }));
        }

        candidates
    }
}

fn pattern_matches(pattern: &Regex, text: &str, class: &'static str) -> Vec<Match> {
    pattern
        .find_iter(text)
        .filter_map(|m| Match::new(m.as_str(), class))
        .collect()
}

/// Generic rule: `field: value` labels first, then a quoted or capitalized
/// span shortly after the keyword, then the first line mentioning it.
fn keyword_matches(field: &str, text: &str) -> Vec<Match> {
    let words: Vec<String> = NON_ALNUM
        .split(field)
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();

    if words.is_empty() {
        return Vec::new();
    }

    let token = words.join(r"[\s_-]*");

    let (label, keyword) = match (
        Regex::new(&format!(
            r"(?im)\b{token}\b[ \t]*(?::|=|-[ \t])[ \t]*([^\n\r,;|]+)"
        )),
        Regex::new(&format!(r"(?i)\b{token}\b")),
    ) {
        (Ok(label), Ok(keyword)) => (label, keyword),
        _ => {
            tracing::warn!(field, "could not build keyword pattern for field");
            return Vec::new();
        }
    };

    let labelled: Vec<Match> = label
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| Match::new(m.as_str(), "keyword_label"))
        .collect();
    if !labelled.is_empty() {
        return labelled;
    }

    let nearby: Vec<Match> = keyword
        .find_iter(text)
        .filter_map(|m| nearby_span(&text[m.end()..]))
        .collect();
    if !nearby.is_empty() {
        return nearby;
    }

    text.lines()
        .find(|line| keyword.is_match(line))
        .and_then(|line| Match::new(truncate_chars(line.trim(), MAX_LINE_CHARS), "keyword_line"))
        .into_iter()
        .collect()
}

/// Earliest quoted or capitalized span in the rest of the keyword's line.
fn nearby_span(rest: &str) -> Option<Match> {
    let line = rest.lines().next().unwrap_or("");
    let window = truncate_chars(line, PROXIMITY_CHARS);

    let quoted = QUOTED.captures(window).and_then(|c| {
        let whole = c.get(0)?;
        let inner = c.get(1).or_else(|| c.get(2))?;
        Some((whole.start(), inner.as_str(), "keyword_quoted"))
    });
    let capitalized = CAPITALIZED
        .find(window)
        .map(|m| (m.start(), m.as_str(), "keyword_proximity"));

    let (_, value, class) = match (quoted, capitalized) {
        (Some(q), Some(c)) => {
            if q.0 <= c.0 {
                q
            } else {
                c
            }
        }
        (Some(q), None) => q,
        (None, Some(c)) => c,
        (None, None) => return None,
    };

    Match::new(value, class)
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(candidates: &[EntityCandidate], field: &str) -> Vec<String> {
        candidates
            .iter()
            .filter(|c| c.field == field)
            .map(|c| c.value.clone())
            .collect()
    }

    #[test]
    fn test_rule_selection() {
        assert_eq!(FieldRule::for_field("email"), FieldRule::Email);
        assert_eq!(FieldRule::for_field("Contact E-Mail"), FieldRule::Email);
        assert_eq!(FieldRule::for_field("phone_number"), FieldRule::Phone);
        assert_eq!(FieldRule::for_field("Telephone"), FieldRule::Phone);
        assert_eq!(FieldRule::for_field("mobile"), FieldRule::Phone);
        assert_eq!(FieldRule::for_field("Invoice Date"), FieldRule::Date);
        assert_eq!(FieldRule::for_field("DOB"), FieldRule::Date);
        assert_eq!(FieldRule::for_field("hotel"), FieldRule::GenericKeyword);
        assert_eq!(FieldRule::for_field("company"), FieldRule::GenericKeyword);
        assert_eq!(FieldRule::for_field("Date of Birth"), FieldRule::Date);
        assert_eq!(FieldRule::for_field("expiry"), FieldRule::Date);
    }

    #[test]
    fn test_rule_selection_matches_whole_words() {
        for field in ["candidate", "Candidate Name", "update", "mandate", "headphones model"] {
            assert_eq!(FieldRule::for_field(field), FieldRule::GenericKeyword, "{field}");
        }
    }

    #[test]
    fn test_candidate_field_uses_keyword_rule() {
        let schema = FieldSchema::from_names(["candidate"]).unwrap();
        let text = "Candidate: Alice Smith\nApplied 2024-03-01";
        let candidates = FallbackExtractor::new().extract("cv.txt", text, &schema);

        assert_eq!(values(&candidates, "candidate"), vec!["Alice Smith"]);
        assert_eq!(candidates[0].extraction_class, "keyword_label");
    }

    #[test]
    fn test_contact_scenario() {
        let schema = FieldSchema::from_names(["email", "phone"]).unwrap();
        let text = "Contact: jane@example.com, phone 555-1234";
        let candidates = FallbackExtractor::new().extract("doc.txt", text, &schema);

        assert_eq!(values(&candidates, "email"), vec!["jane@example.com"]);
        assert_eq!(values(&candidates, "phone"), vec!["555-1234"]);
        assert!(candidates.iter().all(|c| c.engine == Engine::Fallback));
        assert!(candidates.iter().all(|c| c.source_document == "doc.txt"));
    }

    #[test]
    fn test_phone_formats() {
        let schema = FieldSchema::from_names(["phone"]).unwrap();
        let text = "Call (555) 123-4567 or +1 555-987-6543. Ref 2024-01-15.";
        let candidates = FallbackExtractor::new().extract("d", text, &schema);

        assert_eq!(
            values(&candidates, "phone"),
            vec!["(555) 123-4567", "+1 555-987-6543"]
        );
    }

    #[test]
    fn test_date_formats() {
        let schema = FieldSchema::from_names(["date"]).unwrap();
        let text = "Signed 2024-03-01, renewed on March 5th, 2025 and 12/31/2026.";
        let candidates = FallbackExtractor::new().extract("d", text, &schema);

        assert_eq!(
            values(&candidates, "date"),
            vec!["2024-03-01", "March 5th, 2025", "12/31/2026"]
        );
    }

    #[test]
    fn test_generic_label_rule() {
        let schema = FieldSchema::from_names(["company name", "city"]).unwrap();
        let text = "Company Name: Acme Corp\nCITY = Springfield, IL";
        let candidates = FallbackExtractor::new().extract("d", text, &schema);

        assert_eq!(values(&candidates, "company name"), vec!["Acme Corp"]);
        assert_eq!(values(&candidates, "city"), vec!["Springfield"]);
        assert_eq!(candidates[0].extraction_class, "keyword_label");
    }

    #[test]
    fn test_generic_proximity_rule() {
        let schema = FieldSchema::from_names(["vendor", "project"]).unwrap();
        let text = "The vendor selected was Globex Industries for this.\nOur project \"Blue Harbor\" starts soon.";
        let candidates = FallbackExtractor::new().extract("d", text, &schema);

        assert_eq!(values(&candidates, "vendor"), vec!["Globex Industries"]);
        assert_eq!(values(&candidates, "project"), vec!["Blue Harbor"]);
    }

    #[test]
    fn test_generic_line_rule() {
        let schema = FieldSchema::from_names(["budget"]).unwrap();
        let text = "Intro.\n  the budget is about forty thousand  \nEnd.";
        let candidates = FallbackExtractor::new().extract("d", text, &schema);

        assert_eq!(
            values(&candidates, "budget"),
            vec!["the budget is about forty thousand"]
        );
        assert_eq!(candidates[0].extraction_class, "keyword_line");
    }

    #[test]
    fn test_no_match_yields_nothing() {
        let schema = FieldSchema::from_names(["email", "salary"]).unwrap();
        let candidates = FallbackExtractor::new().extract("d", "nothing useful here", &schema);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let schema = FieldSchema::from_names(["email", "date", "owner"]).unwrap();
        let text = "Owner: Ada\nmail a@b.io and c@d.org on 2020-01-01";
        let extractor = FallbackExtractor::new();

        let first = extractor.extract("d", text, &schema);
        for _ in 0..5 {
            assert_eq!(extractor.extract("d", text, &schema), first);
        }
    }

    #[test]
    fn test_symbol_only_field_is_harmless() {
        let schema = FieldSchema::from_names(["#"]).unwrap();
        assert!(FallbackExtractor::new().extract("d", "# heading", &schema).is_empty());
    }
}
