//! Query pipeline: extract → embed → search → decide.
//!
//! One [`Pipeline`] serves any number of concurrent queries. The clause
//! index is shared read-only; the embedder call is the only I/O and the only
//! stage that can be cancelled.

use std::sync::Arc;

use clausewise_ai::{DecisionEngine, EmbedError, Embedder, RetryPolicy, embed_with_retry};
use clausewise_core::{
    AttributeExtractor, Decision, Diagnostic, DiagnosticKind, MatchResult, StructuredQuery,
};
use clausewise_store::{ClauseIndex, StoreError};
use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad caller input. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("query cancelled")]
    Cancelled,

    #[error(transparent)]
    Embedding(#[from] EmbedError),
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}

/// Everything produced for one query.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub query: StructuredQuery,
    pub matches: Vec<MatchResult>,
    pub decision: Decision,
}

pub struct Pipeline {
    extractor: AttributeExtractor,
    embedder: Arc<dyn Embedder>,
    index: Arc<ClauseIndex>,
    engine: DecisionEngine,
    top_k: usize,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        extractor: AttributeExtractor,
        embedder: Arc<dyn Embedder>,
        index: Arc<ClauseIndex>,
        engine: DecisionEngine,
    ) -> Self {
        Self {
            extractor,
            embedder,
            index,
            engine,
            top_k: DEFAULT_TOP_K,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_top_k(mut self, k: usize) -> Result<Self, PipelineError> {
        if k == 0 {
            return Err(PipelineError::InvalidArgument(
                "top_k must be a positive integer".into(),
            ));
        }
        self.top_k = k;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn index(&self) -> &Arc<ClauseIndex> {
        &self.index
    }

    pub fn extract(&self, text: &str) -> StructuredQuery {
        self.extractor.extract(text)
    }

    /// Run one query to a decision.
    ///
    /// Embedding failures degrade to an `insufficient_information` decision
    /// with a diagnostic instead of an error.
    pub async fn decide(&self, text: &str) -> Result<Outcome, PipelineError> {
        self.decide_with_cancel(text, &CancellationToken::new())
            .await
    }

    /// Like [`decide`](Self::decide), but abandons the query when `cancel`
    /// fires before the embedding is available. Search and decide never run
    /// for a cancelled query.
    pub async fn decide_with_cancel(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, PipelineError> {
        let query = self.extractor.extract(text);

        let vector = match self.embed(&query, cancel).await {
            Ok(v) => v,
            Err(PipelineError::Embedding(e)) => {
                warn!(error = %e, "embedding unavailable, no decision possible");
                let decision = Decision::insufficient(vec![Diagnostic::new(
                    DiagnosticKind::EmbeddingUnavailable,
                    e.to_string(),
                )]);
                return Ok(Outcome {
                    query,
                    matches: Vec::new(),
                    decision,
                });
            }
            Err(other) => return Err(other),
        };

        let matches = self.index.search(&vector, self.top_k)?;
        let decision = self.engine.decide(&query, &matches);
        info!(
            verdict = %decision.verdict(),
            confidence = decision.confidence(),
            matches = matches.len(),
            "decided query"
        );
        Ok(Outcome {
            query,
            matches,
            decision,
        })
    }

    /// Decide several queries concurrently against the same index.
    ///
    /// Results come back in input order; queries complete in any order.
    pub async fn decide_many<S: AsRef<str>>(
        &self,
        texts: &[S],
        cancel: &CancellationToken,
    ) -> Vec<Result<Outcome, PipelineError>> {
        join_all(
            texts
                .iter()
                .map(|t| self.decide_with_cancel(t.as_ref(), cancel)),
        )
        .await
    }

    /// Ranked clause matches for a query, without a decision.
    pub async fn search(
        &self,
        text: &str,
        k: usize,
    ) -> Result<(StructuredQuery, Vec<MatchResult>), PipelineError> {
        let query = self.extractor.extract(text);
        let vector = self.embed(&query, &CancellationToken::new()).await?;
        let matches = self.index.search(&vector, k)?;
        Ok((query, matches))
    }

    async fn embed(
        &self,
        query: &StructuredQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let text = query.embedding_text();
        let vector = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("query cancelled during embedding");
                return Err(PipelineError::Cancelled);
            }
            result = embed_with_retry(self.embedder.as_ref(), &text, &self.retry) => result?,
        };
        if let Some(dim) = self.index.dim()
            && vector.len() != dim
        {
            return Err(EmbedError::Dimension {
                expected: dim,
                actual: vector.len(),
            }
            .into());
        }
        Ok(vector)
    }
}
