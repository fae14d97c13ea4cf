//! Error types for overlap store operations

use std::path::PathBuf;
use thiserror::Error;

use crate::io::ParseError;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Invalid store format in {}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("Id range [{first}, {last}] outside store range [1, {max_id}]")]
    Range { first: u32, last: u32, max_id: u32 },

    #[error("Corrupt store: shard {shard} ended early while reading records for id {id}")]
    CorruptStore { shard: u32, id: u32 },

    #[error("Record count mismatch for ids [{lo_id}, {hi_id}]: expected {expected}, store holds {actual}")]
    CountMismatch {
        lo_id: u32,
        hi_id: u32,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn format<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
