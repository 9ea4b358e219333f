//! Embedder adapters and the decision engine.
//!
//! The HTTP embedder is behind the `http` feature so the engine can be used
//! without a network stack.

mod embedder;
mod engine;
#[cfg(feature = "http")]
mod http;

pub use embedder::{EmbedError, Embedder, RetryPolicy, embed_with_retry};
pub use engine::{DecisionEngine, DecisionPolicy, PolicyStep};
#[cfg(feature = "http")]
pub use http::HttpEmbedder;
