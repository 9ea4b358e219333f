//! In-memory clause index with exact cosine nearest-neighbour search.
//!
//! Read-only after construction. Reloading a corpus means building a new
//! index; share it between concurrent queries behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use clausewise_core::{Clause, MatchResult, cosine_similarity};
use tracing::{debug, info, warn};

use crate::StoreError;

/// Clauses plus their embeddings, searchable by vector similarity.
#[derive(Debug, Default)]
pub struct ClauseIndex {
    clauses: Vec<Arc<Clause>>,
    by_id: HashMap<String, usize>,
    dim: Option<usize>,
}

impl ClauseIndex {
    /// Build an index from loaded clauses.
    ///
    /// The first clause fixes the embedding dimension. Later clauses with a
    /// duplicate id or a different dimension are dropped with a warning.
    pub fn build(clauses: impl IntoIterator<Item = Clause>) -> Self {
        let mut index = Self::default();

        for clause in clauses {
            if index.by_id.contains_key(&clause.id) {
                warn!(clause_id = %clause.id, "duplicate clause id, keeping first");
                continue;
            }
            if clause.embedding.is_empty() {
                warn!(clause_id = %clause.id, "clause has no embedding, skipping");
                continue;
            }
            let dim = *index.dim.get_or_insert(clause.embedding.len());
            if clause.embedding.len() != dim {
                warn!(
                    clause_id = %clause.id,
                    expected = dim,
                    actual = clause.embedding.len(),
                    "clause embedding dimension mismatch, skipping"
                );
                continue;
            }
            index.by_id.insert(clause.id.clone(), index.clauses.len());
            index.clauses.push(Arc::new(clause));
        }

        info!(
            clauses = index.clauses.len(),
            dim = index.dim.unwrap_or(0),
            "built clause index"
        );
        index
    }

    /// Top-`k` clauses by cosine similarity to `query`.
    ///
    /// Results are ordered by descending similarity, ties by clause id
    /// ascending, and ranked from 1. Fails with
    /// [`StoreError::InvalidArgument`] when `k` is zero or the query vector
    /// has the wrong dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<MatchResult>, StoreError> {
        if k == 0 {
            return Err(StoreError::InvalidArgument(
                "k must be a positive integer".into(),
            ));
        }
        let Some(dim) = self.dim else {
            return Ok(Vec::new());
        };
        if query.len() != dim {
            return Err(StoreError::InvalidArgument(format!(
                "query vector has {} dimensions, index has {dim}",
                query.len()
            )));
        }

        let mut scored: Vec<(f32, &Arc<Clause>)> = self
            .clauses
            .iter()
            .map(|c| (cosine_similarity(query, &c.embedding), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(k);

        let results: Vec<MatchResult> = scored
            .into_iter()
            .enumerate()
            .map(|(i, (sim, clause))| MatchResult::new(Arc::clone(clause), sim, i + 1))
            .collect();

        debug!(
            k,
            returned = results.len(),
            top = results.first().map(|m| m.similarity),
            "clause search"
        );
        Ok(results)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Clause>> {
        self.by_id.get(id).map(|&i| &self.clauses[i])
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Embedding dimension, `None` for an empty index.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Clause>> {
        self.clauses.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clausewise_core::{ClauseRule, Eligibility, UNMATCHED};

    fn clause(id: &str, embedding: Vec<f32>) -> Clause {
        Clause::new(
            id,
            format!("clause {id}"),
            ClauseRule::coverage(Eligibility::default()),
            embedding,
        )
    }

    fn index() -> ClauseIndex {
        ClauseIndex::build([
            clause("C1", vec![1.0, 0.0, 0.0]),
            clause("C2", vec![0.0, 1.0, 0.0]),
            clause("C3", vec![0.7, 0.7, 0.0]),
            clause("C4", vec![-1.0, 0.0, 0.0]),
        ])
    }

    #[test]
    fn search_ranks_by_descending_similarity() {
        let results = index().search(&[1.0, 0.1, 0.0], 4).unwrap();
        let ids: Vec<&str> = results.iter().map(|m| m.clause_id()).collect();
        assert_eq!(ids, vec!["C1", "C3", "C2", "C4"]);
        assert!(
            results
                .windows(2)
                .all(|w| w[0].similarity >= w[1].similarity)
        );
        let ranks: Vec<usize> = results.iter().map(|m| m.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn search_returns_at_most_k() {
        let idx = index();
        assert_eq!(idx.search(&[1.0, 0.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(idx.search(&[1.0, 0.0, 0.0], 50).unwrap().len(), 4);
    }

    #[test]
    fn ties_break_by_id_ascending() {
        let idx = ClauseIndex::build([
            clause("B", vec![1.0, 0.0]),
            clause("C", vec![2.0, 0.0]),
            clause("A", vec![3.0, 0.0]),
        ]);
        let results = idx.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = results.iter().map(|m| m.clause_id()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn zero_k_is_invalid() {
        assert!(matches!(
            index().search(&[1.0, 0.0, 0.0], 0),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn wrong_query_dimension_is_invalid() {
        assert!(matches!(
            index().search(&[1.0, 0.0], 3),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_query_vector_scores_unmatched() {
        let results = index().search(&[0.0, 0.0, 0.0], 4).unwrap();
        assert!(results.iter().all(|m| m.similarity == UNMATCHED));
        let ids: Vec<&str> = results.iter().map(|m| m.clause_id()).collect();
        assert_eq!(ids, vec!["C1", "C2", "C3", "C4"]);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let idx = ClauseIndex::build(Vec::new());
        assert!(idx.is_empty());
        assert_eq!(idx.dim(), None);
        assert!(idx.search(&[1.0], 5).unwrap().is_empty());
    }

    #[test]
    fn duplicates_and_mismatched_dimensions_are_dropped() {
        let idx = ClauseIndex::build([
            clause("C1", vec![1.0, 0.0]),
            clause("C1", vec![0.0, 1.0]),
            clause("C2", vec![1.0, 0.0, 0.0]),
            clause("C3", vec![0.0, 1.0]),
        ]);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.dim(), Some(2));
        assert_eq!(idx.get("C1").unwrap().embedding, vec![1.0, 0.0]);
        assert!(idx.get("C2").is_none());
        let ids: Vec<&str> = idx.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C3"]);
    }

    #[test]
    fn results_share_clause_data() {
        let idx = index();
        let results = idx.search(&[1.0, 0.0, 0.0], 1).unwrap();
        assert!(Arc::ptr_eq(&results[0].clause, idx.get("C1").unwrap()));
    }

    #[test]
    fn index_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClauseIndex>();
        assert_send_sync::<Arc<ClauseIndex>>();
    }
}
