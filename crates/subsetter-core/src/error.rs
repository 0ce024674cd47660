//! Error types for the extraction engine.
//!
//! Configuration and schema-integrity errors are deliberately absent here —
//! they belong to the model loader and schema builder, which are external
//! collaborators the engine only consumes (see crate docs).

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors raised while the engine runs.
///
/// Every variant is fatal: the engine makes no retries and does not resume
/// a partial run. Re-run from scratch on failure.
#[derive(Debug, Error)]
pub enum Error {
    /// The database adapter failed to fetch rows for a work item.
    #[error("fetch failed for table {table}: {source}")]
    Fetch {
        table: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A programmer-error invariant was violated (e.g. mismatched
    /// `cols`/`values` arity, or an unexpected NULL in an effective
    /// primary key).
    #[error("invariant violation: {0}")]
    Invariant(String),
}
