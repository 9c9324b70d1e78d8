use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Cannot read {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("Invalid corpus: {0}")]
    InvalidCorpus(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Dimension mismatch: index expects {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Index ({vectors} vectors) and metadata ({records} records) do not belong together")]
    Misaligned { vectors: usize, records: usize },

    #[error("Cannot build an index from zero vectors")]
    EmptyIndex,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Timed out during {operation}")]
    Timeout { operation: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Errors that must stop the query-serving process at startup.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::MissingFile { .. }
                | Self::Parse { .. }
                | Self::Unreadable { .. }
                | Self::Misaligned { .. }
                | Self::EmptyIndex
        )
    }
}

/// Read a whole input file. A missing file becomes `MissingFile`; any other
/// read failure names the path and is fatal as well.
pub(crate) fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => RagError::MissingFile {
            path: path.to_path_buf(),
        },
        _ => RagError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    })
}

pub mod assistant;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod database;
pub mod embeddings;
pub mod generation;
pub mod indexer;
pub mod openai;
pub mod retriever;
