//! Error taxonomy for the retrieval-and-memory core.
//!
//! Every per-file failure maps to one [`Error`] variant so the driver can
//! report `path + kind` and move on to the next file. [`StoreIoError`]
//! carries the detail of a persisted store that could not be trusted.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::StoreKind;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Seed documentation could not be read as text.
    #[error("malformed documentation {origin}: {reason}")]
    DocParse { origin: String, reason: String },

    #[error(transparent)]
    StoreIo(#[from] StoreIoError),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(String),

    /// The generation response lacks a usable artifact block.
    #[error("response has no complete `{label}` block")]
    OutputParse { label: String },

    #[error("cannot read input {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Stable name of the error kind, used in batch reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DocParse { .. } => "DocParseError",
            Error::StoreIo(_) => "StoreIOError",
            Error::Embedding(_) => "EmbeddingError",
            Error::Generation(_) => "GenerationError",
            Error::OutputParse { .. } => "OutputParseError",
            Error::Input { .. } => "InputError",
            Error::Output { .. } => "OutputError",
        }
    }
}

/// Why a persisted store was rejected.
#[derive(Debug, Error)]
pub enum StoreIoError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("unsupported store format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("store declares {declared} records but has {embeddings} embeddings and {records} records")]
    CountMismatch {
        declared: usize,
        embeddings: usize,
        records: usize,
    },

    #[error("record {index} has {found} dimensions, store declares {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("record {index} duplicates an earlier (text, origin) pair")]
    DuplicateRecord { index: usize },

    #[error("store holds {found} chunks, expected {expected}")]
    KindMismatch { expected: StoreKind, found: StoreKind },

    #[error("store was embedded with `{found}`, current model is `{expected}`")]
    ModelMismatch { expected: String, found: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct() {
        let errors = [
            Error::DocParse {
                origin: "a".into(),
                reason: "b".into(),
            },
            Error::StoreIo(StoreIoError::Corrupt("x".into())),
            Error::Embedding("x".into()),
            Error::Generation("x".into()),
            Error::OutputParse {
                label: "lisp".into(),
            },
        ];
        let kinds: std::collections::HashSet<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn test_store_io_message() {
        let err = Error::from(StoreIoError::DimensionMismatch {
            index: 3,
            expected: 768,
            found: 384,
        });
        assert_eq!(err.kind(), "StoreIOError");
        assert!(err.to_string().contains("record 3 has 384 dimensions"));
    }
}
