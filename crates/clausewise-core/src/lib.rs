//! Core types for clause-based claim decisions: queries, clauses, decisions,
//! synonym tables, and attribute extraction.

mod clause;
mod decision;
mod error;
mod extract;
mod query;
mod similarity;
mod synonyms;

pub use clause::{
    Category, Clause, ClauseRule, CoverageRule, Eligibility, ExclusionRule, LimitRule, MatchResult,
};
pub use decision::{Contribution, Decision, Diagnostic, DiagnosticKind, Justification, Verdict};
pub use error::CoreError;
pub use extract::{AttributeExtractor, waiting_period_in_text};
pub use query::{Attr, Gender, QueryField, StructuredQuery, Unresolved};
pub use similarity::{UNMATCHED, cosine_similarity};
pub use synonyms::{SynonymOverrides, SynonymTables};
