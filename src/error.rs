//! Error types for kmershard.
//!
//! Every failure in a run is fatal: the coordinator stops, discards in-progress
//! shards and reports one of these errors. Nothing is retried.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in kmershard operations.
#[derive(Debug, Error)]
pub enum KmerShardError {
    /// K-mer length is outside the valid range (1-31).
    #[error("invalid k-mer length {k}: must be between {min} and {max}")]
    InvalidKmerLength { k: usize, min: u8, max: u8 },

    /// Zero workers were requested.
    #[error("invalid worker count {workers}: at least one worker is required")]
    InvalidWorkerCount { workers: usize },

    /// An unrecognized symbol was found while running in strict mode.
    #[error("record {record}: invalid base {}", describe_base(*.base, *.position))]
    InvalidBase {
        record: usize,
        base: u8,
        position: usize,
    },

    /// Failed to read sequence file.
    #[error("failed to read sequence file '{path}': {source}")]
    SequenceRead {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to parse sequence record.
    #[error("failed to parse sequence record: {details}")]
    SequenceParse { details: String },

    /// A shard or receive buffer could not be allocated.
    #[error("unable to allocate {bytes} bytes")]
    Allocation { bytes: u64 },

    /// A counter slot would exceed `u32::MAX`.
    #[error("count for k-mer {kmer} overflowed a 32-bit counter")]
    CounterOverflow { kmer: String },

    /// The sequence broadcast to a worker was interrupted or malformed.
    #[error("worker {rank} failed to receive sequences: {details}")]
    Replication { rank: usize, details: String },

    /// A worker thread panicked before reporting.
    #[error("worker {rank} panicked")]
    WorkerPanicked { rank: usize },

    /// Failed to write a worker's output.
    #[error("failed to write output '{path}': {source}")]
    OutputWrite {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to serialize JSON output.
    #[error("failed to serialize JSON: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },
}

/// Error for invalid k-mer length.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("k-mer length {k} is out of range: must be between {min} and {max}")]
pub struct KmerLengthError {
    /// The invalid k value that was provided.
    pub k: usize,
    /// Minimum valid k-mer length.
    pub min: u8,
    /// Maximum valid k-mer length.
    pub max: u8,
}

/// Error for an unrecognized symbol inside a single sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBaseError {
    /// The invalid byte value.
    pub base: u8,
    /// Position of the invalid byte in the sequence.
    pub position: usize,
}

impl InvalidBaseError {
    /// Attaches the index of the record the byte was found in.
    pub const fn in_record(self, record: usize) -> KmerShardError {
        KmerShardError::InvalidBase {
            record,
            base: self.base,
            position: self.position,
        }
    }
}

fn describe_base(base: u8, position: usize) -> String {
    if base.is_ascii_graphic() || base == b' ' {
        format!("'{}' (0x{base:02x}) at position {position}", base as char)
    } else {
        format!("0x{base:02x} at position {position}")
    }
}

impl std::fmt::Display for InvalidBaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid base {}", describe_base(self.base, self.position))
    }
}

impl std::error::Error for InvalidBaseError {}

impl From<serde_json::Error> for KmerShardError {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source }
    }
}

impl From<KmerLengthError> for KmerShardError {
    fn from(err: KmerLengthError) -> Self {
        Self::InvalidKmerLength {
            k: err.k,
            min: err.min,
            max: err.max,
        }
    }
}
