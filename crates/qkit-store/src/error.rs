//! Error types for the store.

use std::path::PathBuf;

use qkit_format::FormatError;
use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the store. Nothing is retried; every error reaches the
/// caller of the failing operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem error, including a missing file in read or read/write mode.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file bytes are not a readable HDF5 image.
    #[error("HDF5 format error: {0}")]
    Format(#[from] FormatError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Another handle holds the file, or its superblock still advertises an
    /// open writer.
    #[error("file is locked by another writer: {}", path.display())]
    Locked { path: PathBuf },

    /// A write was attempted through a read-only handle or a closed file.
    #[error("file is not open for writing")]
    ReadOnly,

    /// Datasets in the data folder cannot be redefined.
    #[error("dataset '{name}' already exists in '{folder}'")]
    DuplicateDataset { folder: String, name: String },

    #[error("datasets have 1, 2 or 3 dimensions, not {0}")]
    InvalidDimension(u8),

    #[error("folder must be 'data', 'analysis' or 'views', not '{0}'")]
    InvalidFolder(String),

    /// Nothing exists at the given path.
    #[error("no object at '{0}'")]
    NotFound(String),

    #[error("'{0}' is not a dataset")]
    NotADataset(String),

    /// Text appended to a numeric dataset, or numbers to a text dataset.
    #[error("payload does not match dataset '{url}': {reason}")]
    PayloadMismatch { url: String, reason: String },

    /// A view refers to a dataset that has not been written yet.
    #[error("view refers to '{0}', which does not exist yet")]
    ForwardReference(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid UUID '{0}'")]
    InvalidUuid(String),

    /// The operation does not apply to this dataset kind.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
