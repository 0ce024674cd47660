//! Error types for the CLI.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read model file {path}: {source}")]
    ReadModel { path: String, #[source] source: std::io::Error },

    #[error("failed to parse model file {path}: {source}")]
    ParseModel { path: String, #[source] source: toml::de::Error },

    #[error("unrecognized database URL scheme in {url:?}: expected sqlite:// or postgres://")]
    UnknownScheme { url: String },

    #[error("failed to connect to database: {0}")]
    Connect(#[from] subsetter_db::DbError),

    #[error("failed to load schema: {0}")]
    Schema(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("extraction failed: {0}")]
    Engine(#[from] subsetter_core::Error),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

pub type CliResult<T> = std::result::Result<T, CliError>;
