use thiserror::Error;
use std::path::PathBuf;

/// The main result type for bookrec-core operations.
pub type RecResult<T> = Result<T, RecError>;

/// Enum representing possible errors within the bookrec-core library.
#[derive(Error, Debug)]
pub enum RecError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("I/O error accessing path {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt file {path:?}: {reason}")]
    CorruptFile { path: PathBuf, reason: String },

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding model mismatch: index built with '{expected}', embedder is '{actual}'")]
    ModelMismatch { expected: String, actual: String },

    #[error("Inconsistent build state: {0}")]
    InconsistentState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Entity source error: {0}")]
    Source(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecError {
    /// Wraps an `io::Error` together with the path that produced it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecError::IoError { path: path.into(), source }
    }

    /// Whether re-running the same operation may succeed without operator changes.
    pub fn is_transient(&self) -> bool {
        matches!(self, RecError::IoError { .. } | RecError::Embedding(_) | RecError::Source(_))
    }
}

impl From<std::io::Error> for RecError {
    fn from(err: std::io::Error) -> Self {
        RecError::IoError {
            path: PathBuf::from("<unknown_io_source>"),
            source: err,
        }
    }
}

impl From<bincode::Error> for RecError {
    fn from(err: bincode::Error) -> Self {
        RecError::Serialization(format!("Bincode error: {}", err))
    }
}
