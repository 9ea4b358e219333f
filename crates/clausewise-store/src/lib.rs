//! Clause storage: corpus loading and the in-memory similarity index.

mod error;
mod index;
mod loader;

pub use error::StoreError;
pub use index::ClauseIndex;
pub use loader::{
    LoadReport, SkippedClause, infer_category, load_clauses, load_clauses_from_path,
    load_clauses_from_str,
};
