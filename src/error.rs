//! Error types for matrix loading, sequence validation, scoring and regression.

use std::fmt;
use thiserror::Error;

/// What is wrong with a sequence rejected by [`TssError::InvalidSequence`].
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceFault {
    /// A character outside the alphabet.
    Symbol(char),
    /// The sequence is not the run's fixed length.
    Length { expected: usize, actual: usize },
    /// The sequence set was encoded with a different alphabet than the table expects.
    Alphabet,
}

impl fmt::Display for SequenceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(c) => write!(f, "symbol {:?} is not in the alphabet", c),
            Self::Length { expected, actual } => {
                write!(f, "length {} does not match expected length {}", actual, expected)
            }
            Self::Alphabet => write!(f, "encoded with a different alphabet"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TssError {
    /// A substitution matrix is missing or incomplete.
    #[error("cannot load matrix for cluster {cluster:?}: {reason}")]
    MatrixLoad { cluster: String, reason: String },

    /// A binder or query sequence failed validation.
    ///
    /// `sequence` is the row index within its batch; `position` is the character index
    /// (for a length fault, the first position past the shorter of the two lengths).
    #[error("invalid sequence {sequence} at position {position}: {fault}")]
    InvalidSequence {
        sequence: usize,
        position: usize,
        fault: SequenceFault,
    },

    /// Features and labels do not describe the same peptides.
    #[error("alignment error: {0}")]
    Alignment(String),

    /// Too few rows (or no variance) to fit or correlate.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A run was aborted through its [`CancelToken`](crate::CancelToken).
    #[error("cancelled")]
    Cancelled,

    /// Malformed tabular input.
    #[error("table error: {0}")]
    Table(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T, E = TssError> = std::result::Result<T, E>;

impl TssError {
    pub(crate) fn symbol(sequence: usize, position: usize, symbol: char) -> Self {
        Self::InvalidSequence {
            sequence,
            position,
            fault: SequenceFault::Symbol(symbol),
        }
    }

    pub(crate) fn length(sequence: usize, expected: usize, actual: usize) -> Self {
        Self::InvalidSequence {
            sequence,
            position: expected.min(actual),
            fault: SequenceFault::Length { expected, actual },
        }
    }

    pub(crate) fn matrix(cluster: &str, reason: impl Into<String>) -> Self {
        Self::MatrixLoad {
            cluster: cluster.to_owned(),
            reason: reason.into(),
        }
    }
}
