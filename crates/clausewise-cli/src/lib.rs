//! Configuration, pipeline orchestration and output rendering for the
//! `clausewise` binary.

pub mod config;
pub mod display;
pub mod pipeline;

pub use config::{Config, ConfigError};
pub use pipeline::{Outcome, Pipeline, PipelineError};
