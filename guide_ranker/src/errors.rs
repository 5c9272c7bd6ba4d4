//! Error types for guide ranking.
//!
//! Per-candidate fold failures are recoverable: the pipeline drops the
//! candidate and keeps going. Model loading and feature-layout mismatches end
//! the request.

use std::path::PathBuf;
use std::time::Duration;

use polars::prelude::PolarsError;
use thiserror::Error;

pub type Result<T, E = GuideError> = std::result::Result<T, E>;

/// Problems with the raw sequence handed to the ranker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("sequence is empty")]
    Empty,

    #[error("expected a single FASTA record, found {0}")]
    MultipleRecords(usize),

    #[error("sequence has nucleotides other than A,C,G,T: {0}")]
    InvalidCharacters(String),

    /// Too short for one window, or no window ends in an allowed PAM suffix.
    #[error("no candidates found (sequence length {length}, k-mer length {kmer_length})")]
    NoCandidates { length: usize, kmer_length: usize },
}

/// A single candidate could not be folded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fold failed for {sequence}: {reason}")]
pub struct FoldError {
    pub sequence: String,
    pub reason: String,
}

impl FoldError {
    pub fn new(sequence: impl Into<String>, reason: impl Into<String>) -> Self {
        FoldError {
            sequence: sequence.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("cannot read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid model artifact {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

impl ModelLoadError {
    /// I/O failures other than a missing file may succeed on a second attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelLoadError::Io { source, .. } => source.kind() != std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum GuideError {
    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error(transparent)]
    Fold(#[from] FoldError),

    #[error("all {attempted} candidates failed to fold")]
    AllFoldsFailed {
        attempted: usize,
        failures: Vec<FoldError>,
    },

    #[error("model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),

    /// Feature layout and model disagree. Never coerced.
    #[error("contract violation: {0}")]
    Contract(String),

    #[error("request deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("report error: {0}")]
    Report(#[from] PolarsError),
}

impl GuideError {
    pub fn contract(message: impl Into<String>) -> Self {
        GuideError::Contract(message.into())
    }

    /// Errors that end the request rather than a single candidate.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GuideError::Input(_) | GuideError::Fold(_))
    }
}
