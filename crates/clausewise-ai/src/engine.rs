//! Decision engine: turns a structured query and ranked candidate clauses
//! into a verdict with clause-level justification.
//!
//! Candidates are thresholded on similarity, checked structurally against
//! their typed rule, and then reconciled by a configurable precedence of
//! steps. The default order is exclusion, then unresolved fields, then
//! coverage, with a rejection as the fallback.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use clausewise_core::{
    Category, ClauseRule, Contribution, CoreError, Decision, Diagnostic, DiagnosticKind,
    Eligibility, Justification, MatchResult, QueryField, StructuredQuery, Verdict,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Policy ──

/// One reconciliation step. Rejection when nothing applies always runs last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStep {
    /// Reject on a conclusively matching exclusion.
    Exclusion,
    /// Report insufficient information when a needed field is unresolved
    /// and nothing matched conclusively.
    Unresolved,
    /// Approve on conclusively matching coverage not capped to zero.
    Coverage,
}

impl PolicyStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exclusion => "exclusion",
            Self::Unresolved => "unresolved",
            Self::Coverage => "coverage",
        }
    }
}

impl fmt::Display for PolicyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecisionPolicy {
    /// Minimum similarity for a candidate to take part in the verdict.
    pub threshold: f32,
    /// Confidence multiplier applied when a rule-checked field was unresolved.
    pub unresolved_penalty: f32,
    pub precedence: Vec<PolicyStep>,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            unresolved_penalty: 0.5,
            precedence: vec![
                PolicyStep::Exclusion,
                PolicyStep::Unresolved,
                PolicyStep::Coverage,
            ],
        }
    }
}

impl DecisionPolicy {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.threshold.is_finite() || !(-1.0..=1.0).contains(&self.threshold) {
            return Err(CoreError::InvalidArgument(format!(
                "threshold must be within [-1, 1], got {}",
                self.threshold
            )));
        }
        if !self.unresolved_penalty.is_finite() || !(0.0..=1.0).contains(&self.unresolved_penalty)
        {
            return Err(CoreError::InvalidArgument(format!(
                "unresolved_penalty must be within [0, 1], got {}",
                self.unresolved_penalty
            )));
        }
        let distinct: HashSet<PolicyStep> = self.precedence.iter().copied().collect();
        if self.precedence.len() != 3 || distinct.len() != 3 {
            return Err(CoreError::InvalidArgument(format!(
                "precedence must list exclusion, unresolved and coverage exactly once, got [{}]",
                self.precedence
                    .iter()
                    .map(PolicyStep::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(())
    }
}

// ── Structural checks ──

/// Result of checking one clause rule against the query.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CheckOutcome {
    Pass,
    Fail(String),
    /// The listed query fields were needed but unresolved.
    Inconclusive(Vec<QueryField>),
}

fn check_rule(rule: &ClauseRule, query: &StructuredQuery) -> CheckOutcome {
    let is_exclusion = rule.category() == Category::Exclusion;
    let elig = rule.eligibility();
    let mut failures: Vec<String> = Vec::new();
    let mut needed: Vec<QueryField> = Vec::new();

    if elig.min_age.is_some() || elig.max_age.is_some() {
        match query.age.value() {
            Some(&age) if !age_in_range(age, elig) => failures.push(format!(
                "age {age} outside eligible range {}",
                describe_range(elig)
            )),
            Some(_) => {}
            None => needed.push(QueryField::Age),
        }
    }

    if !elig.procedures.is_empty() {
        match query.procedure.value() {
            Some(p) if !procedure_matches(p, &elig.procedures) => {
                failures.push(format!("procedure '{p}' is not named by this clause"))
            }
            Some(_) => {}
            None => needed.push(QueryField::Procedure),
        }
    }

    if let Some(waiting) = elig.waiting_period_months {
        match query.policy_duration_months.value() {
            // An exclusion with a waiting period only holds while it runs.
            Some(&months) if is_exclusion && months >= waiting => failures.push(format!(
                "waiting period of {waiting} months already served (policy active {months} months)"
            )),
            Some(&months) if !is_exclusion && months < waiting => failures.push(format!(
                "waiting period of {waiting} months not served (policy active {months} months)"
            )),
            Some(_) => {}
            None => needed.push(QueryField::PolicyDuration),
        }
    }

    if !failures.is_empty() {
        CheckOutcome::Fail(failures.join("; "))
    } else if !needed.is_empty() {
        CheckOutcome::Inconclusive(needed)
    } else {
        CheckOutcome::Pass
    }
}

fn age_in_range(age: u32, elig: &Eligibility) -> bool {
    elig.min_age.is_none_or(|min| age >= min) && elig.max_age.is_none_or(|max| age <= max)
}

fn describe_range(elig: &Eligibility) -> String {
    match (elig.min_age, elig.max_age) {
        (Some(min), Some(max)) => format!("{min}-{max}"),
        (Some(min), None) => format!("{min}+"),
        (None, Some(max)) => format!("up to {max}"),
        (None, None) => "any".to_string(),
    }
}

/// Case-insensitive substring match in either direction.
fn procedure_matches(procedure: &str, listed: &[String]) -> bool {
    let procedure = procedure.trim().to_lowercase();
    if procedure.is_empty() {
        return false;
    }
    listed
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .any(|p| p.contains(&procedure) || procedure.contains(&p))
}

// ── Engine ──

/// A thresholded candidate with its check outcome.
struct Evaluated<'a> {
    candidate: &'a MatchResult,
    outcome: CheckOutcome,
}

impl Evaluated<'_> {
    fn id(&self) -> &str {
        self.candidate.clause_id()
    }

    fn similarity(&self) -> f32 {
        self.candidate.similarity
    }

    fn category(&self) -> Category {
        self.candidate.clause.category()
    }

    fn passes(&self) -> bool {
        self.outcome == CheckOutcome::Pass
    }
}

/// Everything the policy steps need for one query.
struct Evaluation<'a> {
    query: &'a StructuredQuery,
    /// Above-threshold candidates, by similarity descending then id.
    accepted: Vec<Evaluated<'a>>,
    unresolved: Vec<QueryField>,
    diagnostics: Vec<Diagnostic>,
    penalty: f32,
}

impl Evaluation<'_> {
    fn of(&self, category: Category) -> impl Iterator<Item = &Evaluated<'_>> {
        self.accepted.iter().filter(move |e| e.category() == category)
    }

    fn conclusive_match(&self) -> bool {
        self.accepted
            .iter()
            .any(|e| e.passes() && e.category() != Category::Limit)
    }

    /// Confidence comes from the first justification entry, which is the
    /// top contributing clause.
    fn decision(&self, verdict: Verdict, justification: Vec<Justification>) -> Decision {
        let top = justification.first().map_or(0.0, |j| j.similarity);
        Decision::new(
            verdict,
            justification,
            top * self.penalty,
            self.unresolved.clone(),
            self.diagnostics.clone(),
        )
    }
}

/// Applies a [`DecisionPolicy`] to candidate clauses.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    policy: DecisionPolicy,
}

impl DecisionEngine {
    pub fn new(policy: DecisionPolicy) -> Result<Self, CoreError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Decide a query against its ranked candidates.
    ///
    /// Deterministic: the input order of `candidates` does not matter.
    pub fn decide(&self, query: &StructuredQuery, candidates: &[MatchResult]) -> Decision {
        if candidates.is_empty() {
            return Decision::insufficient(vec![Diagnostic::new(
                DiagnosticKind::NoCandidates,
                "no candidate clauses",
            )]);
        }

        let eval = self.evaluate(query, candidates);

        for step in &self.policy.precedence {
            let decided = match step {
                PolicyStep::Exclusion => self.exclusion_step(&eval),
                PolicyStep::Unresolved => self.unresolved_step(&eval),
                PolicyStep::Coverage => self.coverage_step(&eval),
            };
            if let Some(decision) = decided {
                debug!(
                    step = %step,
                    verdict = %decision.verdict(),
                    confidence = decision.confidence(),
                    clauses = ?decision.clause_ids(),
                    "decided"
                );
                return decision;
            }
        }

        let decision = self.fallback(&eval);
        debug!(
            verdict = %decision.verdict(),
            confidence = decision.confidence(),
            "no applicable coverage"
        );
        decision
    }

    fn evaluate<'a>(
        &self,
        query: &'a StructuredQuery,
        candidates: &'a [MatchResult],
    ) -> Evaluation<'a> {
        let mut sorted: Vec<&MatchResult> = candidates.iter().collect();
        sorted.sort_by(|a, b| {
            sort_key(b.similarity)
                .total_cmp(&sort_key(a.similarity))
                .then_with(|| a.clause_id().cmp(b.clause_id()))
        });

        let mut diagnostics = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut accepted = Vec::new();
        let mut unresolved: BTreeSet<QueryField> = BTreeSet::new();

        for candidate in sorted {
            let id = candidate.clause_id();
            if !seen.insert(id) {
                diagnostics.push(Diagnostic::for_clause(
                    DiagnosticKind::DuplicateCandidate,
                    id,
                    "clause listed more than once, kept highest similarity",
                ));
                continue;
            }
            // NaN never reaches the threshold.
            if !(candidate.similarity >= self.policy.threshold) {
                diagnostics.push(Diagnostic::for_clause(
                    DiagnosticKind::BelowThreshold,
                    id,
                    format!(
                        "considered but not matched: similarity {:.2} below threshold {:.2}",
                        candidate.similarity, self.policy.threshold
                    ),
                ));
                continue;
            }

            let outcome = check_rule(&candidate.clause.rule, query);
            match &outcome {
                CheckOutcome::Pass => {}
                CheckOutcome::Fail(reason) => diagnostics.push(Diagnostic::for_clause(
                    DiagnosticKind::StructuralMismatch,
                    id,
                    reason.clone(),
                )),
                CheckOutcome::Inconclusive(fields) => {
                    unresolved.extend(fields.iter().copied());
                    diagnostics.push(Diagnostic::for_clause(
                        DiagnosticKind::Inconclusive,
                        id,
                        format!("cannot evaluate without {}", join_fields(fields)),
                    ));
                }
            }
            accepted.push(Evaluated { candidate, outcome });
        }

        let penalty = if unresolved.is_empty() {
            1.0
        } else {
            self.policy.unresolved_penalty
        };

        Evaluation {
            query,
            accepted,
            unresolved: unresolved.into_iter().collect(),
            diagnostics,
            penalty,
        }
    }

    fn exclusion_step(&self, eval: &Evaluation<'_>) -> Option<Decision> {
        let top = eval.of(Category::Exclusion).find(|e| e.passes())?;
        let reason = match (
            eval.query.procedure.value(),
            top.candidate.clause.rule.eligibility().waiting_period_months,
        ) {
            (_, Some(waiting)) => format!(
                "excluded during the {waiting}-month waiting period (similarity {:.2})",
                top.similarity()
            ),
            (Some(p), None) => format!(
                "'{p}' falls under this exclusion (similarity {:.2})",
                top.similarity()
            ),
            (None, None) => format!(
                "claim falls under this exclusion (similarity {:.2})",
                top.similarity()
            ),
        };
        Some(eval.decision(
            Verdict::Reject,
            vec![justify(top, Contribution::Excludes, reason)],
        ))
    }

    fn unresolved_step(&self, eval: &Evaluation<'_>) -> Option<Decision> {
        if eval.unresolved.is_empty() || eval.conclusive_match() {
            return None;
        }
        let justification = eval
            .accepted
            .iter()
            .filter_map(|e| match &e.outcome {
                CheckOutcome::Inconclusive(fields) => Some(justify(
                    e,
                    Contribution::NeedsInformation,
                    format!("cannot evaluate without {}", join_fields(fields)),
                )),
                _ => None,
            })
            .collect();
        Some(eval.decision(Verdict::InsufficientInformation, justification))
    }

    fn coverage_step(&self, eval: &Evaluation<'_>) -> Option<Decision> {
        let covers: Vec<&Evaluated<'_>> = eval
            .of(Category::Coverage)
            .filter(|e| e.passes())
            .collect();
        if covers.is_empty() {
            return None;
        }
        let limits: Vec<&Evaluated<'_>> = eval
            .of(Category::Limit)
            .filter(|e| e.passes())
            .collect();
        if limits.iter().any(|e| caps_to_zero(e)) {
            return None;
        }

        let mut justification: Vec<Justification> = covers
            .iter()
            .map(|e| {
                let reason = match eval.query.procedure.value() {
                    Some(p) => format!(
                        "'{p}' is covered by this clause (similarity {:.2})",
                        e.similarity()
                    ),
                    None => format!("covered by this clause (similarity {:.2})", e.similarity()),
                };
                justify(e, Contribution::Covers, reason)
            })
            .collect();
        justification.extend(limits.iter().map(|e| {
            let reason = match limit_amount(e) {
                Some(amount) => format!("sub-limit of {amount} applies"),
                None => "limit applies to this claim".to_string(),
            };
            justify(e, Contribution::Qualifies, reason)
        }));

        Some(eval.decision(Verdict::Approve, justification))
    }

    /// Reject: no applicable coverage. Cites coverage that failed its checks
    /// and limits that leave nothing payable.
    fn fallback(&self, eval: &Evaluation<'_>) -> Decision {
        let justification = eval
            .accepted
            .iter()
            .filter_map(|e| match (&e.outcome, e.category()) {
                (CheckOutcome::Fail(reason), Category::Coverage) => {
                    Some(justify(e, Contribution::NotSatisfied, reason.clone()))
                }
                (CheckOutcome::Pass, Category::Limit) if caps_to_zero(e) => Some(justify(
                    e,
                    Contribution::Caps,
                    format!(
                        "sub-limit of {} leaves no eligible amount",
                        limit_amount(e).unwrap_or(0.0)
                    ),
                )),
                _ => None,
            })
            .collect();
        eval.decision(Verdict::Reject, justification)
    }
}

fn justify(e: &Evaluated<'_>, contribution: Contribution, reason: String) -> Justification {
    Justification {
        clause_id: e.id().to_string(),
        contribution,
        similarity: e.similarity(),
        reason,
    }
}

fn caps_to_zero(e: &Evaluated<'_>) -> bool {
    matches!(&e.candidate.clause.rule, ClauseRule::Limit(limit) if limit.caps_to_zero())
}

fn limit_amount(e: &Evaluated<'_>) -> Option<f64> {
    match &e.candidate.clause.rule {
        ClauseRule::Limit(limit) => limit.sub_limit,
        _ => None,
    }
}

fn sort_key(similarity: f32) -> f32 {
    if similarity.is_nan() {
        f32::NEG_INFINITY
    } else {
        similarity
    }
}

fn join_fields(fields: &[QueryField]) -> String {
    fields
        .iter()
        .map(QueryField::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clausewise_core::{Clause, Gender};
    use std::sync::Arc;

    fn candidate(id: &str, rule: ClauseRule, similarity: f32) -> MatchResult {
        MatchResult::new(
            Arc::new(Clause::new(id, format!("clause {id}"), rule, vec![1.0, 0.0])),
            similarity,
            1,
        )
    }

    fn knee_coverage(waiting: u32) -> ClauseRule {
        ClauseRule::coverage(
            Eligibility::default()
                .with_age_range(Some(18), Some(65))
                .with_procedures(["knee surgery"])
                .with_waiting_period(waiting),
        )
    }

    /// "35-year-old male needs knee surgery, policy active 6 months"
    fn knee_query() -> StructuredQuery {
        StructuredQuery::new("35-year-old male needs knee surgery, policy active 6 months")
            .with_age(35)
            .with_gender(Gender::Male)
            .with_procedure("knee surgery")
            .with_policy_duration_months(6)
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::default()
    }

    #[test]
    fn approves_served_waiting_period() {
        let d = engine().decide(&knee_query(), &[candidate("C1", knee_coverage(3), 0.9)]);
        assert_eq!(d.verdict(), Verdict::Approve);
        assert_eq!(d.clause_ids(), vec!["C1"]);
        assert_eq!(d.justification()[0].contribution, Contribution::Covers);
        assert!((d.confidence() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn rejects_unserved_waiting_period() {
        let d = engine().decide(&knee_query(), &[candidate("C1", knee_coverage(12), 0.9)]);
        assert_eq!(d.verdict(), Verdict::Reject);
        assert_eq!(d.clause_ids(), vec!["C1"]);
        let j = &d.justification()[0];
        assert_eq!(j.contribution, Contribution::NotSatisfied);
        assert_eq!(
            j.reason,
            "waiting period of 12 months not served (policy active 6 months)"
        );
        assert!((d.confidence() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn missing_age_is_insufficient() {
        let mut q = knee_query();
        q.age = clausewise_core::Attr::missing();
        let d = engine().decide(&q, &[candidate("C1", knee_coverage(3), 0.9)]);
        assert_eq!(d.verdict(), Verdict::InsufficientInformation);
        assert_eq!(d.unresolved(), &[QueryField::Age]);
        assert_eq!(d.clause_ids(), vec!["C1"]);
        assert_eq!(
            d.justification()[0].contribution,
            Contribution::NeedsInformation
        );
        assert!((d.confidence() - 0.45).abs() < 1e-6);
    }

    #[test]
    fn empty_candidates_are_insufficient() {
        let d = engine().decide(&knee_query(), &[]);
        assert_eq!(d.verdict(), Verdict::InsufficientInformation);
        assert!(d.justification().is_empty());
        assert_eq!(d.confidence(), 0.0);
        assert_eq!(d.diagnostics()[0].kind, DiagnosticKind::NoCandidates);
    }

    #[test]
    fn exclusion_takes_precedence() {
        let exclusion = ClauseRule::exclusion(Eligibility::default().with_procedures(["knee"]));
        let d = engine().decide(
            &knee_query(),
            &[
                candidate("C1", knee_coverage(3), 0.95),
                candidate("X1", exclusion.clone(), 0.80),
                candidate("X2", exclusion, 0.85),
            ],
        );
        assert_eq!(d.verdict(), Verdict::Reject);
        assert_eq!(d.clause_ids(), vec!["X2"]);
        assert_eq!(d.justification()[0].contribution, Contribution::Excludes);
        assert!((d.confidence() - 0.85).abs() < 1e-6);
    }

    #[test]
    fn exclusion_outside_scope_does_not_reject() {
        let exclusion =
            ClauseRule::exclusion(Eligibility::default().with_procedures(["cosmetic surgery"]));
        let d = engine().decide(
            &knee_query(),
            &[
                candidate("C1", knee_coverage(3), 0.9),
                candidate("X1", exclusion, 0.95),
            ],
        );
        assert_eq!(d.verdict(), Verdict::Approve);
        assert!(
            d.diagnostics()
                .iter()
                .any(|diag| diag.kind == DiagnosticKind::StructuralMismatch
                    && diag.clause_id.as_deref() == Some("X1"))
        );
    }

    #[test]
    fn waiting_period_exclusion_applies_only_while_running() {
        let exclusion = ClauseRule::exclusion(Eligibility::default().with_waiting_period(24));
        let d = engine().decide(
            &knee_query(),
            &[
                candidate("C1", knee_coverage(3), 0.9),
                candidate("W1", exclusion.clone(), 0.8),
            ],
        );
        assert_eq!(d.verdict(), Verdict::Reject);
        assert_eq!(d.clause_ids(), vec!["W1"]);

        let served = knee_query().with_policy_duration_months(30);
        let d = engine().decide(
            &served,
            &[
                candidate("C1", knee_coverage(3), 0.9),
                candidate("W1", exclusion, 0.8),
            ],
        );
        assert_eq!(d.verdict(), Verdict::Approve);
    }

    #[test]
    fn below_threshold_is_diagnostic_only() {
        let d = engine().decide(&knee_query(), &[candidate("C1", knee_coverage(3), 0.5)]);
        assert_eq!(d.verdict(), Verdict::Reject);
        assert!(d.justification().is_empty());
        assert_eq!(d.confidence(), 0.0);
        assert_eq!(d.diagnostics()[0].kind, DiagnosticKind::BelowThreshold);
    }

    #[test]
    fn nan_similarity_never_passes() {
        let d = engine().decide(
            &knee_query(),
            &[candidate("C1", knee_coverage(3), f32::NAN)],
        );
        assert_eq!(d.verdict(), Verdict::Reject);
        assert_eq!(d.diagnostics()[0].kind, DiagnosticKind::BelowThreshold);
    }

    #[test]
    fn limits_qualify_approval() {
        let limit = ClauseRule::limit(
            Eligibility::default().with_procedures(["knee surgery"]),
            Some(50_000.0),
        );
        let d = engine().decide(
            &knee_query(),
            &[
                candidate("L1", limit, 0.97),
                candidate("C2", knee_coverage(3), 0.8),
                candidate("C1", knee_coverage(3), 0.9),
            ],
        );
        assert_eq!(d.verdict(), Verdict::Approve);
        assert_eq!(d.clause_ids(), vec!["C1", "C2", "L1"]);
        assert_eq!(d.justification()[2].contribution, Contribution::Qualifies);
        assert_eq!(d.justification()[2].reason, "sub-limit of 50000 applies");
        assert!((d.confidence() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn zero_sub_limit_blocks_approval() {
        let limit = ClauseRule::limit(Eligibility::default(), Some(0.0));
        let d = engine().decide(
            &knee_query(),
            &[
                candidate("C1", knee_coverage(3), 0.9),
                candidate("L1", limit, 0.8),
            ],
        );
        assert_eq!(d.verdict(), Verdict::Reject);
        assert_eq!(d.clause_ids(), vec!["L1"]);
        assert_eq!(d.justification()[0].contribution, Contribution::Caps);
        assert!((d.confidence() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn conclusive_match_overrides_unresolved_fields() {
        let mut q = knee_query();
        q.age = clausewise_core::Attr::missing();
        let any_age = ClauseRule::coverage(Eligibility::default().with_procedures(["knee"]));
        let d = engine().decide(
            &q,
            &[
                candidate("C1", knee_coverage(3), 0.95),
                candidate("C2", any_age, 0.9),
            ],
        );
        assert_eq!(d.verdict(), Verdict::Approve);
        assert_eq!(d.clause_ids(), vec!["C2"]);
        // Age was needed by C1 and missing, so the penalty applies.
        assert!((d.confidence() - 0.45).abs() < 1e-6);
        assert_eq!(d.unresolved(), &[QueryField::Age]);
    }

    #[test]
    fn failed_check_beats_inconclusive_on_same_clause() {
        let mut q = knee_query().with_policy_duration_months(1);
        q.age = clausewise_core::Attr::missing();
        let d = engine().decide(&q, &[candidate("C1", knee_coverage(3), 0.9)]);
        assert_eq!(d.verdict(), Verdict::Reject);
        assert_eq!(d.justification()[0].contribution, Contribution::NotSatisfied);
    }

    #[test]
    fn age_outside_range_fails() {
        let q = knee_query().with_age(70);
        let d = engine().decide(&q, &[candidate("C1", knee_coverage(3), 0.9)]);
        assert_eq!(d.verdict(), Verdict::Reject);
        assert_eq!(
            d.justification()[0].reason,
            "age 70 outside eligible range 18-65"
        );
    }

    #[test]
    fn procedure_match_is_case_insensitive_both_ways() {
        let listed = vec!["Knee Surgery".to_string(), "  ".to_string()];
        assert!(procedure_matches("knee surgery", &listed));
        assert!(procedure_matches("arthroscopic knee surgery", &listed));
        assert!(procedure_matches("KNEE", &listed));
        assert!(!procedure_matches("hip replacement", &listed));
        assert!(!procedure_matches("", &listed));
    }

    #[test]
    fn duplicates_keep_highest_similarity() {
        let d = engine().decide(
            &knee_query(),
            &[
                candidate("C1", knee_coverage(3), 0.8),
                candidate("C1", knee_coverage(3), 0.9),
            ],
        );
        assert_eq!(d.clause_ids(), vec!["C1"]);
        assert!((d.confidence() - 0.9).abs() < 1e-6);
        assert!(
            d.diagnostics()
                .iter()
                .any(|diag| diag.kind == DiagnosticKind::DuplicateCandidate)
        );
    }

    #[test]
    fn decide_is_deterministic_and_order_independent() {
        let exclusion =
            ClauseRule::exclusion(Eligibility::default().with_procedures(["cosmetic surgery"]));
        let a = candidate("C1", knee_coverage(3), 0.9);
        let b = candidate("C2", knee_coverage(3), 0.9);
        let c = candidate("X1", exclusion, 0.92);
        let e = engine();
        let first = e.decide(&knee_query(), &[a.clone(), b.clone(), c.clone()]);
        let again = e.decide(&knee_query(), &[a.clone(), b.clone(), c.clone()]);
        let shuffled = e.decide(&knee_query(), &[c, b, a]);
        assert_eq!(first, again);
        assert_eq!(first, shuffled);
        assert_eq!(first.clause_ids(), vec!["C1", "C2"]);
    }

    #[test]
    fn custom_precedence_puts_coverage_first() {
        let policy = DecisionPolicy {
            precedence: vec![
                PolicyStep::Coverage,
                PolicyStep::Exclusion,
                PolicyStep::Unresolved,
            ],
            ..DecisionPolicy::default()
        };
        let exclusion = ClauseRule::exclusion(Eligibility::default());
        let d = DecisionEngine::new(policy).unwrap().decide(
            &knee_query(),
            &[
                candidate("C1", knee_coverage(3), 0.9),
                candidate("X1", exclusion, 0.95),
            ],
        );
        assert_eq!(d.verdict(), Verdict::Approve);
    }

    #[test]
    fn invalid_policies_are_rejected() {
        let bad_threshold = DecisionPolicy {
            threshold: 1.5,
            ..DecisionPolicy::default()
        };
        assert!(DecisionEngine::new(bad_threshold).is_err());

        let bad_penalty = DecisionPolicy {
            unresolved_penalty: -0.1,
            ..DecisionPolicy::default()
        };
        assert!(bad_penalty.validate().is_err());

        let repeated = DecisionPolicy {
            precedence: vec![
                PolicyStep::Exclusion,
                PolicyStep::Exclusion,
                PolicyStep::Coverage,
            ],
            ..DecisionPolicy::default()
        };
        assert!(repeated.validate().is_err());

        let short = DecisionPolicy {
            precedence: vec![PolicyStep::Coverage],
            ..DecisionPolicy::default()
        };
        assert!(short.validate().is_err());
        assert!(DecisionPolicy::default().validate().is_ok());
    }

    #[test]
    fn policy_rejects_unknown_fields() {
        let result: Result<DecisionPolicy, _> = serde_json::from_str(r#"{"treshold": 0.95}"#);
        assert!(result.is_err());
    }

    #[test]
    fn policy_deserializes_from_partial_toml_shape() {
        let policy: DecisionPolicy = serde_json::from_str(
            r#"{"threshold": 0.8, "precedence": ["coverage", "exclusion", "unresolved"]}"#,
        )
        .unwrap();
        assert_eq!(policy.threshold, 0.8);
        assert_eq!(policy.unresolved_penalty, 0.5);
        assert_eq!(policy.precedence[0], PolicyStep::Coverage);
    }
}
