use thiserror::Error;

pub type Result<T> = std::result::Result<T, LookupError>;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Corpus error on line {line}: {message}")]
    Corpus { line: usize, message: String },

    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod mcp;
pub mod retriever;

// Deterministic embedders for tests and benchmarks
pub mod testutil;
