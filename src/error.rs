use std::path::PathBuf;

use thiserror::Error;

/// A variant line that cannot be turned into a [`VariantRecord`](crate::types::VariantRecord).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecordError {
    #[error("expected at least {expected} tab-separated columns, found {found}")]
    TooFewColumns { expected: usize, found: usize },

    #[error("invalid position: '{0}'")]
    InvalidPosition(String),

    #[error("line is not valid UTF-8 (first invalid byte at offset {0})")]
    InvalidEncoding(usize),
}

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("malformed record at line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: MalformedRecordError,
    },

    #[error("can't read source {}: {source}", path.display())]
    UnreadableSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;
