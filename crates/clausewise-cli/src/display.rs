//! Vertical card display for queries, matches and decisions.
//!
//! Cards are rendered to strings and printed by the binary; JSON output goes
//! through [`outcome_json`].

use std::fmt::{Display, Write};

use chrono::Utc;
use clausewise_core::{Attr, MatchResult, StructuredQuery};
use clausewise_store::LoadReport;
use serde_json::{Value, json};

use crate::pipeline::Outcome;

const MAX_CLAUSE_TEXT: usize = 96;

// ── Public API ──

pub fn render_query(query: &StructuredQuery) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Query ===");
    let _ = writeln!(out, "{}", query.raw_text.trim());
    let _ = writeln!(out);
    write_query_section(&mut out, query);
    out
}

pub fn render_matches(query: &StructuredQuery, matches: &[MatchResult]) -> String {
    let mut out = render_query(query);
    write_matches_section(&mut out, matches);
    out
}

pub fn render_outcome(outcome: &Outcome) -> String {
    let decision = &outcome.decision;
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", decision.verdict().as_str().to_uppercase());
    let _ = writeln!(out, "{}", outcome.query.raw_text.trim());
    let _ = writeln!(out);

    let _ = writeln!(out, "Decision");
    row(&mut out, "verdict", decision.verdict());
    row(&mut out, "confidence", format!("{:.2}", decision.confidence()));
    if !decision.unresolved().is_empty() {
        let fields: Vec<&str> = decision.unresolved().iter().map(|f| f.as_str()).collect();
        row(&mut out, "needs", fields.join(", "));
    }
    let _ = writeln!(out);

    write_query_section(&mut out, &outcome.query);

    if !decision.justification().is_empty() {
        let _ = writeln!(out, "Justification");
        for (i, j) in decision.justification().iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {:<23} {} [{:.2}]",
                i + 1,
                j.clause_id,
                j.contribution.as_str(),
                j.similarity
            );
            let _ = writeln!(out, "     {}", j.reason);
        }
        let _ = writeln!(out);
    }

    write_matches_section(&mut out, &outcome.matches);

    if !decision.diagnostics().is_empty() {
        let _ = writeln!(out, "Diagnostics");
        for d in decision.diagnostics() {
            let label = d.clause_id.as_deref().unwrap_or("-");
            let _ = writeln!(out, "  {:<26} {}", label, d.detail);
        }
        let _ = writeln!(out);
    }
    out
}

pub fn render_load_report(source: &str, report: &LoadReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {source} ===");
    let _ = writeln!(out);
    let _ = writeln!(out, "Corpus");
    row(&mut out, "loaded", report.clauses.len());
    row(&mut out, "skipped", report.skipped.len());
    if let Some(first) = report.clauses.first() {
        row(&mut out, "dimensions", first.embedding.len());
    }
    let _ = writeln!(out);

    if !report.skipped.is_empty() {
        let _ = writeln!(out, "Skipped");
        for s in &report.skipped {
            row(&mut out, &s.id, &s.reason);
        }
        let _ = writeln!(out);
    }
    out
}

/// JSON record for one outcome, stamped with the decision time.
pub fn outcome_json(outcome: &Outcome) -> Value {
    json!({
        "query": outcome.query,
        "decision": outcome.decision,
        "matches": matches_json(&outcome.matches),
        "decided_at": Utc::now().to_rfc3339(),
    })
}

pub fn matches_json(matches: &[MatchResult]) -> Value {
    Value::Array(
        matches
            .iter()
            .map(|m| {
                json!({
                    "rank": m.rank,
                    "clause_id": m.clause_id(),
                    "category": m.clause.category(),
                    "similarity": m.similarity,
                })
            })
            .collect(),
    )
}

// ── Sections ──

fn write_query_section(out: &mut String, query: &StructuredQuery) {
    let _ = writeln!(out, "Attributes");
    row(out, "age", fmt_attr(&query.age));
    row(out, "gender", fmt_attr(&query.gender));
    row(out, "procedure", fmt_attr(&query.procedure));
    row(out, "location", fmt_attr(&query.location));
    row(
        out,
        "policy_duration_months",
        fmt_attr(&query.policy_duration_months),
    );
    let _ = writeln!(out);
}

fn write_matches_section(out: &mut String, matches: &[MatchResult]) {
    if matches.is_empty() {
        return;
    }
    let _ = writeln!(out, "Matches");
    for m in matches {
        let _ = writeln!(
            out,
            "  {:>2}. {:<22} {:<10} {:.3}",
            m.rank,
            m.clause_id(),
            m.clause.category().as_str(),
            m.similarity
        );
        let _ = writeln!(out, "      {}", truncate(&m.clause.text, MAX_CLAUSE_TEXT));
    }
    let _ = writeln!(out);
}

// ── Helpers ──

fn row(out: &mut String, label: &str, value: impl Display) {
    let _ = writeln!(out, "  {label:<26} {value}");
}

fn fmt_attr<T: Display>(attr: &Attr<T>) -> String {
    match attr {
        Attr::Resolved(v) => v.to_string(),
        Attr::Unresolved(reason) => format!("({})", reason.as_str()),
    }
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clausewise_core::{
        Clause, ClauseRule, Contribution, Decision, Eligibility, Gender, Justification,
        Unresolved, Verdict,
    };
    use clausewise_store::SkippedClause;
    use std::sync::Arc;

    fn outcome() -> Outcome {
        let clause = Arc::new(Clause::new(
            "C1",
            "Knee surgery is covered for insured persons aged 18 to 65.",
            ClauseRule::coverage(Eligibility::default()),
            vec![1.0, 0.0],
        ));
        let query = StructuredQuery::new("46M knee surgery Pune")
            .with_age(46)
            .with_gender(Gender::Male)
            .with_procedure("knee surgery")
            .with_location("Pune");
        let decision = Decision::new(
            Verdict::Approve,
            vec![Justification {
                clause_id: "C1".into(),
                contribution: Contribution::Covers,
                similarity: 0.9,
                reason: "'knee surgery' is covered by this clause (similarity 0.90)".into(),
            }],
            0.9,
            vec![],
            vec![],
        );
        Outcome {
            query,
            matches: vec![MatchResult::new(clause, 0.9, 1)],
            decision,
        }
    }

    #[test]
    fn outcome_card_lists_verdict_and_justification() {
        let card = render_outcome(&outcome());
        assert!(card.starts_with("=== APPROVE ===\n46M knee surgery Pune\n"));
        assert!(card.contains("  confidence                 0.90\n"));
        assert!(card.contains("1. C1"));
        assert!(card.contains("'knee surgery' is covered"));
        assert!(card.contains("  policy_duration_months     (missing)\n"));
        assert!(!card.contains("Diagnostics"));
    }

    #[test]
    fn unresolved_attributes_show_reason() {
        let mut q = StructuredQuery::new("x");
        q.age = Attr::Unresolved(Unresolved::Ambiguous);
        let card = render_query(&q);
        assert!(card.contains("  age                        (ambiguous)\n"));
    }

    #[test]
    fn json_envelope_has_all_parts() {
        let v = outcome_json(&outcome());
        assert_eq!(v["decision"]["verdict"], "approve");
        assert_eq!(v["query"]["age"]["resolved"], 46);
        assert_eq!(v["matches"][0]["clause_id"], "C1");
        assert_eq!(v["matches"][0]["category"], "coverage");
        assert!(v["decided_at"].as_str().is_some());
    }

    #[test]
    fn load_report_lists_skipped() {
        let report = LoadReport {
            clauses: vec![],
            skipped: vec![SkippedClause {
                id: "C9".into(),
                reason: "empty embedding".into(),
            }],
        };
        let card = render_load_report("clauses.json", &report);
        assert!(card.contains("  loaded                     0\n"));
        assert!(card.contains("  C9                         empty embedding\n"));
    }

    #[test]
    fn long_text_is_truncated() {
        let long = "word ".repeat(50);
        let t = truncate(&long, 20);
        assert!(t.ends_with("..."));
        assert!(t.chars().count() <= 20);
        assert_eq!(truncate("short", 20), "short");
    }
}
