//! Clause corpus loading.
//!
//! The corpus is a JSON object keyed by clause id:
//!
//! ```json
//! {
//!   "C1": {
//!     "text": "Knee surgery is covered for members aged 18 to 65 ...",
//!     "category": "coverage",
//!     "embedding": [0.12, -0.03, ...],
//!     "metadata": { "minAge": 18, "maxAge": 65, "procedures": ["knee surgery"] }
//!   }
//! }
//! ```
//!
//! Entries that cannot be turned into a valid [`Clause`] are skipped and
//! reported; only a source that is not a JSON object fails the whole load.
//!
//! Missing metadata is filled from the clause text: the category from
//! exclusion phrases, the waiting period from "waiting period of N months".

use std::path::Path;

use clausewise_core::{Category, Clause, ClauseRule, Eligibility, waiting_period_in_text};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::StoreError;

/// Phrases marking a clause as an exclusion when no category is given.
const EXCLUSION_KEYWORDS: &[&str] = &[
    "not covered",
    "excluded",
    "exclusion",
    "not payable",
    "not eligible",
    "does not cover",
    "shall not",
    "not applicable",
    "not included",
    "excluding",
];

/// Outcome of loading a clause corpus.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Valid clauses, in clause id order.
    pub clauses: Vec<Clause>,
    /// Entries that were dropped, with the reason.
    pub skipped: Vec<SkippedClause>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedClause {
    pub id: String,
    pub reason: String,
}

// ── Raw shapes ──

#[derive(Debug, Deserialize)]
struct RawClause {
    text: String,
    #[serde(default)]
    category: Option<String>,
    embedding: Vec<f32>,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetadata {
    #[serde(alias = "minAge")]
    min_age: Option<u32>,
    #[serde(alias = "maxAge")]
    max_age: Option<u32>,
    #[serde(
        alias = "allowedProcedures",
        alias = "allowed_procedures",
        alias = "excludedProcedures",
        alias = "excluded_procedures"
    )]
    procedures: Option<Procedures>,
    #[serde(alias = "waitingPeriodMonths", alias = "waiting_period")]
    waiting_period_months: Option<u32>,
    #[serde(alias = "subLimit")]
    sub_limit: Option<f64>,
}

/// A single procedure name or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Procedures {
    One(String),
    Many(Vec<String>),
}

impl Procedures {
    fn into_vec(self) -> Vec<String> {
        let list = match self {
            Self::One(p) => vec![p],
            Self::Many(ps) => ps,
        };
        list.into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }
}

// ── Loading ──

/// Read and load a clause corpus file.
pub fn load_clauses_from_path(path: &Path) -> Result<LoadReport, StoreError> {
    if !path.exists() {
        return Err(StoreError::ClausesNotFound(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path)?;
    let report = load_clauses_from_str(&raw)?;
    info!(
        path = %path.display(),
        loaded = report.clauses.len(),
        skipped = report.skipped.len(),
        "loaded clause file"
    );
    Ok(report)
}

pub fn load_clauses_from_str(raw: &str) -> Result<LoadReport, StoreError> {
    let value: Value = serde_json::from_str(raw)?;
    load_clauses(&value)
}

/// Load clauses from a parsed JSON value.
///
/// The embedding dimension is fixed by the first valid entry in id order.
pub fn load_clauses(source: &Value) -> Result<LoadReport, StoreError> {
    let entries = source
        .as_object()
        .ok_or(StoreError::NotAnObject(json_kind(source)))?;

    let mut report = LoadReport::default();
    let mut dim: Option<usize> = None;

    for (id, entry) in entries {
        match parse_entry(id, entry, dim) {
            Ok(clause) => {
                dim.get_or_insert(clause.embedding.len());
                report.clauses.push(clause);
            }
            Err(StoreError::MalformedClause { id, reason }) => {
                warn!(clause_id = %id, reason = %reason, "skipping malformed clause");
                report.skipped.push(SkippedClause { id, reason });
            }
            Err(other) => return Err(other),
        }
    }

    info!(
        loaded = report.clauses.len(),
        skipped = report.skipped.len(),
        dim = dim.unwrap_or(0),
        "loaded clause corpus"
    );
    Ok(report)
}

fn parse_entry(id: &str, entry: &Value, dim: Option<usize>) -> Result<Clause, StoreError> {
    let malformed = |reason: String| StoreError::MalformedClause {
        id: id.to_string(),
        reason,
    };

    if id.trim().is_empty() {
        return Err(malformed("empty clause id".into()));
    }

    let raw: RawClause =
        serde_json::from_value(entry.clone()).map_err(|e| malformed(e.to_string()))?;

    if raw.embedding.is_empty() {
        return Err(malformed("empty embedding".into()));
    }
    if raw.embedding.iter().any(|x| !x.is_finite()) {
        return Err(malformed("embedding contains non-finite values".into()));
    }
    if let Some(expected) = dim
        && raw.embedding.len() != expected
    {
        return Err(malformed(format!(
            "embedding has {} dimensions, expected {expected}",
            raw.embedding.len()
        )));
    }

    let category = match raw.category.as_deref() {
        Some(c) => c.parse::<Category>().map_err(|e| malformed(e.to_string()))?,
        None => infer_category(&raw.text),
    };

    let meta = raw.metadata.unwrap_or_default();
    if let (Some(min), Some(max)) = (meta.min_age, meta.max_age)
        && min > max
    {
        return Err(malformed(format!("min_age {min} exceeds max_age {max}")));
    }
    if meta.sub_limit.is_some_and(|s| !s.is_finite()) {
        return Err(malformed("sub_limit is not finite".into()));
    }

    let mut eligibility = Eligibility::default()
        .with_age_range(meta.min_age, meta.max_age)
        .with_procedures(meta.procedures.map(Procedures::into_vec).unwrap_or_default());
    if let Some(months) = meta
        .waiting_period_months
        .or_else(|| waiting_period_in_text(&raw.text))
    {
        eligibility = eligibility.with_waiting_period(months);
    }

    let rule = match category {
        Category::Coverage => ClauseRule::coverage(eligibility),
        Category::Exclusion => ClauseRule::exclusion(eligibility),
        Category::Limit => ClauseRule::limit(eligibility, meta.sub_limit),
    };

    Ok(Clause::new(id, raw.text, rule, raw.embedding))
}

/// Category for a clause with none given: exclusion when the text uses an
/// exclusion phrase, coverage otherwise.
pub fn infer_category(text: &str) -> Category {
    let lower = text.to_lowercase();
    if EXCLUSION_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Category::Exclusion
    } else {
        Category::Coverage
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
