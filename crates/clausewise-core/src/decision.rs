//! Decision records produced by the decision engine.
//!
//! A [`Decision`] is built once per query and exposes read-only accessors.
//! Clauses are referenced by id only; the decision never owns clause data.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::QueryField;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Reject,
    InsufficientInformation,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::InsufficientInformation => "insufficient_information",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cited clause bears on the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contribution {
    /// Matching exclusion that rejects the claim.
    Excludes,
    /// Matching coverage that supports approval.
    Covers,
    /// Limit attached to an approval as a qualifying note.
    Qualifies,
    /// Limit that leaves no eligible amount.
    Caps,
    /// Coverage that matched semantically but failed a structural check.
    NotSatisfied,
    /// Clause that could not be evaluated because the query lacks a field.
    NeedsInformation,
}

impl Contribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excludes => "excludes",
            Self::Covers => "covers",
            Self::Qualifies => "qualifies",
            Self::Caps => "caps",
            Self::NotSatisfied => "not satisfied",
            Self::NeedsInformation => "needs information",
        }
    }
}

/// One cited clause with the reason it was cited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Justification {
    pub clause_id: String,
    pub contribution: Contribution,
    pub similarity: f32,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Retrieved but below the acceptance threshold.
    BelowThreshold,
    /// Above threshold but a structural check failed.
    StructuralMismatch,
    /// Above threshold but a needed query field was unresolved.
    Inconclusive,
    /// The same clause appeared more than once among the candidates.
    DuplicateCandidate,
    /// No candidate clauses were supplied.
    NoCandidates,
    /// The embedder could not produce a query vector.
    EmbeddingUnavailable,
}

/// A non-verdict note explaining what the engine considered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clause_id: Option<String>,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            clause_id: None,
            detail: detail.into(),
        }
    }

    pub fn for_clause(
        kind: DiagnosticKind,
        clause_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            clause_id: Some(clause_id.into()),
            detail: detail.into(),
        }
    }
}

/// Verdict plus ordered justification for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    verdict: Verdict,
    justification: Vec<Justification>,
    confidence: f32,
    #[serde(default)]
    unresolved: Vec<QueryField>,
    #[serde(default)]
    diagnostics: Vec<Diagnostic>,
}

impl Decision {
    /// Build a decision. Confidence is clamped to [0, 1]; NaN becomes 0.
    pub fn new(
        verdict: Verdict,
        justification: Vec<Justification>,
        confidence: f32,
        unresolved: Vec<QueryField>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            verdict,
            justification,
            confidence,
            unresolved,
            diagnostics,
        }
    }

    /// An `insufficient_information` decision with no cited clauses.
    pub fn insufficient(diagnostics: Vec<Diagnostic>) -> Self {
        Self::new(
            Verdict::InsufficientInformation,
            Vec::new(),
            0.0,
            Vec::new(),
            diagnostics,
        )
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn justification(&self) -> &[Justification] {
        &self.justification
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Fields the rules needed but the query did not resolve.
    pub fn unresolved(&self) -> &[QueryField] {
        &self.unresolved
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Cited clause ids in justification order.
    pub fn clause_ids(&self) -> Vec<&str> {
        self.justification
            .iter()
            .map(|j| j.clause_id.as_str())
            .collect()
    }
}
