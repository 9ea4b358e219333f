//! HTTP embedder for a remote embedding service.
//!
//! Protocol: `POST {base_url}/embed` with `{"input": text, "model": name}`,
//! answered by `{"embedding": [f32, ...]}`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EmbedError, Embedder};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dim: Option<usize>,
}

impl HttpEmbedder {
    /// `base_url` should be like `http://localhost:8080`; a trailing slash
    /// is dropped.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            dim: None,
        }
    }

    /// Reject vectors that do not have `dim` dimensions.
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/embed", self.base_url);
        let body = EmbedRequest {
            input: text,
            model: &self.model,
        };

        debug!(url = %url, model = %self.model, "requesting embedding");
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Unavailable(format!(
                "server returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::Invalid(e.to_string()))?;
        Ok(parsed.embedding)
    }

    fn dim(&self) -> Option<usize> {
        self.dim
    }
}
