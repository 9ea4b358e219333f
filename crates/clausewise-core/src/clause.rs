//! Policy clauses and their typed rule parameters.
//!
//! Each clause carries one [`ClauseRule`] variant per category instead of a
//! free-form metadata map. Rule parameters are optional: an absent parameter
//! means the corresponding structural check does not apply.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Clause category, derived from the rule variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Exclusion,
    Coverage,
    Limit,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exclusion => "exclusion",
            Self::Coverage => "coverage",
            Self::Limit => "limit",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclusion" | "exclusions" => Ok(Self::Exclusion),
            "coverage" | "cover" => Ok(Self::Coverage),
            "limit" | "limits" => Ok(Self::Limit),
            other => Err(CoreError::UnknownCategory(other.to_string())),
        }
    }
}

/// Structural parameters shared by every rule variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    /// Procedures the clause speaks about. Empty means any procedure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub procedures: Vec<String>,
    pub waiting_period_months: Option<u32>,
}

impl Eligibility {
    pub fn with_age_range(mut self, min_age: Option<u32>, max_age: Option<u32>) -> Self {
        self.min_age = min_age;
        self.max_age = max_age;
        self
    }

    pub fn with_procedures<I, S>(mut self, procedures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.procedures = procedures.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_waiting_period(mut self, months: u32) -> Self {
        self.waiting_period_months = Some(months);
        self
    }
}

/// Coverage clause: the procedure is payable when every check passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageRule {
    #[serde(flatten)]
    pub eligibility: Eligibility,
}

/// Exclusion clause: the claim is rejected when the scope matches.
///
/// A waiting period on an exclusion means the exclusion holds only while the
/// policy is younger than the period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRule {
    #[serde(flatten)]
    pub scope: Eligibility,
}

/// Limit clause: qualifies matching coverage, or removes it when the
/// sub-limit leaves nothing payable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitRule {
    #[serde(flatten)]
    pub eligibility: Eligibility,
    pub sub_limit: Option<f64>,
}

impl LimitRule {
    /// True when the limit caps matching coverage at zero eligibility.
    pub fn caps_to_zero(&self) -> bool {
        self.sub_limit.is_some_and(|limit| limit <= 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ClauseRule {
    Coverage(CoverageRule),
    Exclusion(ExclusionRule),
    Limit(LimitRule),
}

impl ClauseRule {
    pub fn coverage(eligibility: Eligibility) -> Self {
        Self::Coverage(CoverageRule { eligibility })
    }

    pub fn exclusion(scope: Eligibility) -> Self {
        Self::Exclusion(ExclusionRule { scope })
    }

    pub fn limit(eligibility: Eligibility, sub_limit: Option<f64>) -> Self {
        Self::Limit(LimitRule {
            eligibility,
            sub_limit,
        })
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Coverage(_) => Category::Coverage,
            Self::Exclusion(_) => Category::Exclusion,
            Self::Limit(_) => Category::Limit,
        }
    }

    /// The structural parameters, regardless of variant.
    pub fn eligibility(&self) -> &Eligibility {
        match self {
            Self::Coverage(r) => &r.eligibility,
            Self::Exclusion(r) => &r.scope,
            Self::Limit(r) => &r.eligibility,
        }
    }
}

/// A discrete unit of policy text with its rule and embedding.
///
/// Immutable once loaded; the index hands out shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub id: String,
    pub text: String,
    pub rule: ClauseRule,
    pub embedding: Vec<f32>,
}

impl Clause {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        rule: ClauseRule,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            rule,
            embedding,
        }
    }

    pub fn category(&self) -> Category {
        self.rule.category()
    }
}

/// One ranked search hit. Lives for a single decision cycle.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub clause: Arc<Clause>,
    /// Cosine similarity in [-1, 1].
    pub similarity: f32,
    /// 1-based position in the ranked result list.
    pub rank: usize,
}

impl MatchResult {
    pub fn new(clause: Arc<Clause>, similarity: f32, rank: usize) -> Self {
        Self {
            clause,
            similarity,
            rank,
        }
    }

    pub fn clause_id(&self) -> &str {
        &self.clause.id
    }
}
