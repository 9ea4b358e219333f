//! Attribute extraction from free-text insurance queries.
//!
//! Turns text such as "46M knee surgery, 6-month policy, Pune" into a
//! [`StructuredQuery`]. Extraction never fails: anything that cannot be read
//! with confidence is marked [`Unresolved`].
//!
//! # Rules
//!
//! - Matching runs on a lower-cased, whitespace-collapsed copy of the text.
//! - Age and policy duration: several distinct values make the field
//!   ambiguous. Durations next to a policy word ("policy", "plan", "cover")
//!   outrank stray ones.
//! - Procedure and location: the longest literal match wins, ties go to the
//!   earliest position. A procedure alias takes over the words around it
//!   ("root canal treatment" is dental treatment).
//! - Short durations ("6m", "1y") only count before a policy word.
//! - Spans read as an age ("35-year-old") are never re-read as a duration.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::{Attr, CoreError, Gender, StructuredQuery, SynonymTables, Unresolved};

const MAX_AGE: u32 = 120;

/// Keywords that name a medical procedure on their own or after a modifier.
const PROCEDURE_KEYWORDS: &[&str] = &[
    "surgery",
    "surgical",
    "operation",
    "replacement",
    "implant",
    "reconstruction",
    "repair",
    "treatment",
    "therapy",
    "biopsy",
    "scan",
    "screening",
    "examination",
    "angioplasty",
    "bypass",
    "stent",
    "transplant",
    "transplantation",
    "procedure",
    "chemotherapy",
    "dialysis",
    "removal",
];

/// Words that never act as a procedure modifier ("needs surgery").
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "my", "his", "her", "their", "our", "your", "this", "that", "any", "some",
    "of", "on", "for", "to", "and", "or", "with", "in", "at", "after", "before", "is", "was",
    "be", "been", "need", "needs", "needed", "needing", "require", "requires", "required",
    "requiring", "undergo", "undergoes", "undergoing", "underwent", "had", "has", "have",
    "having", "get", "gets", "getting", "got", "want", "wants", "do", "does", "did", "planned",
    "scheduled", "old", "year", "years", "month", "months", "day", "days", "policy", "plan",
];

/// Words that tie a duration to the policy rather than something else.
const POLICY_WORDS: &[&str] = &[
    "policy",
    "plan",
    "cover",
    "coverage",
    "insured",
    "insurance",
    "active",
    "premium",
    "membership",
    "tenure",
];

/// Maximum byte distance between a duration and a policy word.
const POLICY_CONTEXT_BYTES: usize = 25;

static AGE_YEARS_OLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3})\s*-?\s*(?:years?|yrs?|y)\s*-?\s*(?:old|of age)\b")
        .expect("valid age regex")
});

static AGE_YO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,3})\s*(?:yo|y/o)\b").expect("valid age regex"));

static AGE_MARKED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\baged?\s*(?:is|of|:|=|-)?\s*(\d{1,3})\b").expect("valid age regex")
});

static AGE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,3})\s*[-/,]?\s*([mf])\b").expect("valid age regex"));

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,4})\s*-?\s*(days?|weeks?|wks?|months?|mos?|years?|yrs?)\b")
        .expect("valid duration regex")
});

static SHORT_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,4})\s*-?\s*([dmy])\b").expect("valid duration regex")
});

static WAITING_PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bwaiting\s+period\s+(?:of\s+)?(\d{1,4})\s*-?\s*(days?|weeks?|wks?|months?|mos?|years?|yrs?)\b",
    )
    .expect("valid waiting period regex")
});

static UNIT_AHEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-?\s*(?:days?|weeks?|wks?|months?|mos?|years?|yrs?)\b")
        .expect("valid unit regex")
});

static SHORT_UNIT_AHEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-?\s*(?:days?|weeks?|wks?|months?|mos?)\b").expect("valid unit regex")
});

static POLICY_AHEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*-?\s*(?:policy|plan|cover|coverage)\b").expect("valid policy regex")
});

/// Reads structured attributes out of query text.
///
/// Holds the synonym tables and the regexes derived from them; both are
/// fixed at construction. [`extract`](Self::extract) is a pure function of
/// its input.
#[derive(Debug, Clone)]
pub struct AttributeExtractor {
    tables: SynonymTables,
    number_gender: Regex,
    gender_number: Regex,
    procedure_modified: Regex,
    procedure_object: Regex,
    procedure_bare: Regex,
}

impl Default for AttributeExtractor {
    fn default() -> Self {
        // The built-in tables only contain plain words; escaping keeps the
        // derived patterns valid.
        Self::new(SynonymTables::builtin()).expect("built-in synonym tables compile")
    }
}

impl AttributeExtractor {
    /// Build an extractor over the given synonym tables.
    pub fn new(tables: SynonymTables) -> Result<Self, CoreError> {
        let mut gender_aliases: Vec<&str> = tables.gender_aliases().map(|(a, _)| a).collect();
        // Longest first so the alternation prefers "female" over "male" prefixes.
        gender_aliases.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let gender_alt = alternation(&gender_aliases);
        let keyword_alt = alternation(PROCEDURE_KEYWORDS);

        let number_gender = compile(&format!(
            r"\b(\d{{1,3}})\s*[-/,]?\s*({gender_alt})\b"
        ))?;
        let gender_number = compile(&format!(
            r"\b({gender_alt})\s*[,/]?\s*(?:aged?\s*:?\s*)?(\d{{1,3}})\b"
        ))?;
        let procedure_modified = compile(&format!(
            r"\b([a-z][a-z-]*)\s+((?:{keyword_alt})(?:\s+(?:{keyword_alt}))?)\b"
        ))?;
        let procedure_object = compile(&format!(
            r"\b(?:{keyword_alt})\s+(?:of|on|for|to)\s+(?:the\s+)?(?:left\s+|right\s+)?([a-z][a-z-]*)\b"
        ))?;
        let procedure_bare = compile(&format!(r"\b(?:{keyword_alt})\b"))?;

        Ok(Self {
            tables,
            number_gender,
            gender_number,
            procedure_modified,
            procedure_object,
            procedure_bare,
        })
    }

    pub fn tables(&self) -> &SynonymTables {
        &self.tables
    }

    /// Extract a [`StructuredQuery`] from free text.
    pub fn extract(&self, text: &str) -> StructuredQuery {
        let normalized = normalize_text(text);
        let mut query = StructuredQuery::new(text);
        if normalized.is_empty() {
            return query;
        }

        let mut ages: Vec<Hit<u32>> = Vec::new();
        let mut genders: Vec<Hit<Gender>> = Vec::new();
        self.collect_ages_and_genders(&normalized, &mut ages, &mut genders);

        let age_spans: Vec<(usize, usize)> = ages.iter().map(|h| h.span).collect();
        query.age = resolve_age(&ages);
        query.gender = resolve_distinct(genders.iter().map(|h| h.value));
        query.policy_duration_months = resolve_duration(&normalized, &age_spans);
        query.procedure = self.resolve_procedure(&normalized);
        query.location = resolve_longest(self.location_hits(&normalized));

        debug!(
            age = ?query.age,
            gender = ?query.gender,
            procedure = ?query.procedure,
            location = ?query.location,
            policy_duration_months = ?query.policy_duration_months,
            "extracted query attributes"
        );
        query
    }

    fn collect_ages_and_genders(
        &self,
        text: &str,
        ages: &mut Vec<Hit<u32>>,
        genders: &mut Vec<Hit<Gender>>,
    ) {
        for caps in AGE_YEARS_OLD.captures_iter(text) {
            push_number(ages, &caps, 1, caps.get(0));
        }
        for caps in AGE_YO.captures_iter(text) {
            push_number(ages, &caps, 1, caps.get(0));
        }
        for caps in AGE_MARKED.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            // "age 3 months" and "policy age 2 years" are durations.
            if SHORT_UNIT_AHEAD.is_match(&text[whole.end()..])
                || ends_with_policy_word(&text[..whole.start()])
            {
                continue;
            }
            push_number(ages, &caps, 1, Some(whole));
        }
        for caps in AGE_LETTER.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            // "6m policy" reads as a duration shorthand, not "6-year-old male".
            if POLICY_AHEAD.is_match(&text[whole.end()..]) {
                continue;
            }
            push_number(ages, &caps, 1, Some(whole));
            let gender = match caps.get(2).map(|m| m.as_str()) {
                Some("m") => Gender::Male,
                _ => Gender::Female,
            };
            genders.push(Hit::new(gender, whole.start(), whole.end()));
        }
        for caps in self.number_gender.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            push_number(ages, &caps, 1, Some(whole));
            if let Some(g) = caps.get(2).and_then(|m| self.tables.gender(m.as_str())) {
                genders.push(Hit::new(g, whole.start(), whole.end()));
            }
        }
        for caps in self.gender_number.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            // "male 3 month policy": the number belongs to the duration.
            if UNIT_AHEAD.is_match(&text[whole.end()..]) {
                continue;
            }
            push_number(ages, &caps, 2, Some(whole));
        }

        for (alias, gender) in self.tables.gender_aliases() {
            for start in find_word(text, alias) {
                genders.push(Hit::new(gender, start, start + alias.len()));
            }
        }
    }

    fn resolve_procedure(&self, text: &str) -> Attr<String> {
        let mut aliases: Vec<Hit<String>> = Vec::new();
        for (alias, canonical) in self.tables.procedure_aliases() {
            for start in find_word(text, alias) {
                aliases.push(Hit::new(canonical.to_string(), start, start + alias.len()));
            }
        }

        let mut hits = self.procedure_pattern_hits(text);
        hits.sort_by_key(|h| h.span.0);

        // An alias absorbs pattern hits it overlaps or touches, so
        // "root canal treatment" stays "dental treatment" and keeps the
        // length of the whole phrase.
        for alias in &mut aliases {
            for h in &hits {
                if distance(alias.span, h.span) <= 1 {
                    alias.span = (alias.span.0.min(h.span.0), alias.span.1.max(h.span.1));
                }
            }
        }
        hits.retain(|h| !aliases.iter().any(|a| distance(a.span, h.span) <= 1));
        aliases.extend(hits);

        resolve_longest(aliases)
    }

    fn procedure_pattern_hits(&self, text: &str) -> Vec<Hit<String>> {
        let mut hits: Vec<Hit<String>> = Vec::new();

        for caps in self.procedure_modified.captures_iter(text) {
            let (Some(whole), Some(modifier)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if self.is_stop_word(modifier.as_str()) {
                continue;
            }
            hits.push(Hit::new(
                collapse(whole.as_str()),
                whole.start(),
                whole.end(),
            ));
        }

        for caps in self.procedure_object.captures_iter(text) {
            let (Some(whole), Some(object)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if self.is_stop_word(object.as_str()) {
                continue;
            }
            hits.push(Hit::new(
                collapse(whole.as_str()),
                whole.start(),
                whole.end(),
            ));
        }

        for m in self.procedure_bare.find_iter(text) {
            hits.push(Hit::new(m.as_str().to_string(), m.start(), m.end()));
        }
        hits
    }

    fn location_hits(&self, text: &str) -> Vec<Hit<String>> {
        let mut hits = Vec::new();
        for (alias, canonical) in self.tables.location_aliases() {
            for start in find_word(text, alias) {
                hits.push(Hit::new(canonical.to_string(), start, start + alias.len()));
            }
        }
        hits
    }

    fn is_stop_word(&self, word: &str) -> bool {
        STOP_WORDS.contains(&word)
            || POLICY_WORDS.contains(&word)
            || self.tables.gender(word).is_some()
    }
}

// ── Hits ──

/// A value found at a byte span of the normalized text.
#[derive(Debug, Clone)]
struct Hit<T> {
    value: T,
    span: (usize, usize),
}

impl<T> Hit<T> {
    fn new(value: T, start: usize, end: usize) -> Self {
        Self {
            value,
            span: (start, end),
        }
    }

    fn len(&self) -> usize {
        self.span.1 - self.span.0
    }
}

fn push_number(
    ages: &mut Vec<Hit<u32>>,
    caps: &regex::Captures<'_>,
    group: usize,
    whole: Option<regex::Match<'_>>,
) {
    let (Some(num), Some(whole)) = (caps.get(group), whole) else {
        return;
    };
    if let Ok(value) = num.as_str().parse::<u32>() {
        ages.push(Hit::new(value, whole.start(), whole.end()));
    }
}

// ── Resolution ──

fn resolve_age(hits: &[Hit<u32>]) -> Attr<u32> {
    match resolve_distinct(hits.iter().map(|h| h.value)) {
        Attr::Resolved(age) if age > MAX_AGE => Attr::Unresolved(Unresolved::OutOfRange),
        other => other,
    }
}

/// One distinct value resolves; none is missing; several are ambiguous.
fn resolve_distinct<T: Ord + Copy>(values: impl Iterator<Item = T>) -> Attr<T> {
    let distinct: BTreeSet<T> = values.collect();
    let mut iter = distinct.into_iter();
    match (iter.next(), iter.next()) {
        (None, _) => Attr::missing(),
        (Some(v), None) => Attr::Resolved(v),
        (Some(_), Some(_)) => Attr::Unresolved(Unresolved::Ambiguous),
    }
}

/// Longest literal match wins; ties go to the earliest position.
fn resolve_longest(mut hits: Vec<Hit<String>>) -> Attr<String> {
    // Stable sort keeps insertion order (table aliases first) on full ties.
    hits.sort_by(|a, b| b.len().cmp(&a.len()).then(a.span.0.cmp(&b.span.0)));
    hits.into_iter().next().map(|h| h.value).into()
}

fn resolve_duration(text: &str, age_spans: &[(usize, usize)]) -> Attr<u32> {
    // "6m policy", "1y plan": single-letter units only count before a policy word.
    let short = SHORT_DURATION
        .captures_iter(text)
        .filter(|caps| caps.get(0).is_some_and(|m| POLICY_AHEAD.is_match(&text[m.end()..])));
    let hits: Vec<Hit<u32>> = DURATION
        .captures_iter(text)
        .chain(short)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let span = (whole.start(), whole.end());
            if age_spans.iter().any(|&a| overlaps(a, span)) {
                return None;
            }
            let n: u32 = caps.get(1)?.as_str().parse().ok()?;
            let unit = caps.get(2)?.as_str();
            Some(Hit::new(to_months(n, unit), span.0, span.1))
        })
        .collect();

    match resolve_distinct(hits.iter().map(|h| h.value)) {
        Attr::Unresolved(Unresolved::Ambiguous) => {
            // Keep only the durations closest to a policy word.
            let policy_spans = policy_word_spans(text);
            let scored: Vec<(usize, u32)> = hits
                .iter()
                .filter_map(|h| {
                    let d = policy_spans.iter().map(|&p| distance(p, h.span)).min()?;
                    (d <= POLICY_CONTEXT_BYTES).then_some((d, h.value))
                })
                .collect();
            let nearest = scored.iter().map(|(d, _)| *d).min();
            let closest = scored
                .iter()
                .filter(|(d, _)| Some(*d) == nearest)
                .map(|(_, v)| *v);
            match resolve_distinct(closest) {
                Attr::Resolved(v) => Attr::Resolved(v),
                _ => Attr::Unresolved(Unresolved::Ambiguous),
            }
        }
        other => other,
    }
}

fn to_months(n: u32, unit: &str) -> u32 {
    if n == 0 {
        return 0;
    }
    if unit.starts_with('y') {
        n.saturating_mul(12)
    } else if unit.starts_with('w') {
        ((n as f64 * 7.0 / 30.0).round() as u32).max(1)
    } else if unit.starts_with('d') {
        ((n as f64 / 30.0).round() as u32).max(1)
    } else {
        n
    }
}

/// Smallest waiting period stated in clause text ("waiting period of 24
/// months"), in months.
pub fn waiting_period_in_text(text: &str) -> Option<u32> {
    let normalized = normalize_text(text);
    WAITING_PERIOD
        .captures_iter(&normalized)
        .filter_map(|caps| {
            let n: u32 = caps.get(1)?.as_str().parse().ok()?;
            Some(to_months(n, caps.get(2)?.as_str()))
        })
        .min()
}

fn ends_with_policy_word(before: &str) -> bool {
    before
        .split_whitespace()
        .next_back()
        .is_some_and(|w| {
            matches!(
                w,
                "policy" | "plan" | "cover" | "coverage" | "membership" | "tenure"
            )
        })
}

fn policy_word_spans(text: &str) -> Vec<(usize, usize)> {
    POLICY_WORDS
        .iter()
        .flat_map(|w| find_word(text, w).into_iter().map(|s| (s, s + w.len())))
        .collect()
}

// ── Text helpers ──

/// Lower-case and collapse whitespace runs to single spaces.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Start offsets of whole-word occurrences of `needle`.
fn find_word(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    haystack
        .match_indices(needle)
        .map(|(i, _)| i)
        .filter(|&i| {
            let before = haystack[..i].chars().next_back();
            let after = haystack[i + needle.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .collect()
}

fn overlaps(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

fn distance(a: (usize, usize), b: (usize, usize)) -> usize {
    if overlaps(a, b) {
        0
    } else if a.1 <= b.0 {
        b.0 - a.1
    } else {
        a.0 - b.1
    }
}

fn alternation(words: &[&str]) -> String {
    words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|")
}

fn compile(pattern: &str) -> Result<Regex, CoreError> {
    Regex::new(pattern).map_err(|e| CoreError::InvalidArgument(format!("synonym pattern: {e}")))
}
