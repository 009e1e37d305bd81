//! Exact k-mer frequency histograms, partitioned across workers.
//!
//! Every k-mer of length `k` over `{A, C, G, T}` maps to an integer index in
//! `[0, 4^k)`. The index space is split into contiguous, disjoint partitions,
//! one per worker. Each worker receives a full copy of the input, counts only
//! the k-mers whose index falls in its own partition, and writes them to its
//! own file in ascending order. The union of the files is the histogram; no
//! merge step is needed.
//!
//! # Example
//!
//! ```rust
//! use kmershard::{count_sequences, merge_shards, Plan, SequenceSet};
//!
//! let set = SequenceSet::from_records(["GATTACA", "ACGT"]);
//! let shards = count_sequences(&set, Plan::new(2, 3)?)?;
//! let histogram = merge_shards(&shards);
//!
//! assert_eq!(histogram["AC"], 2);
//! assert_eq!(histogram["TA"], 1);
//! # Ok::<(), kmershard::KmerShardError>(())
//! ```

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod counter;
pub mod emit;
pub mod error;
pub mod kmer;
pub mod partition;
pub mod reader;
pub mod store;
pub mod summary;

pub use config::Config;
pub use coordinator::{count_sequences, Coordinator, Plan};
pub use counter::HistogramShard;
pub use emit::OutputFormat;
pub use error::KmerShardError;
pub use kmer::{KmerIndex, KmerLength, SymbolPolicy};
pub use partition::{Partition, PartitionPolicy};
pub use store::SequenceSet;
pub use summary::{merge_shards, RunSummary};
