//! Command-line interface definition.

use clap::Parser;
use std::path::PathBuf;

use crate::{
    emit::OutputFormat,
    kmer::{KmerLength, SymbolPolicy},
    partition::PartitionPolicy,
};

/// Exact k-mer frequency histograms, partitioned across independent workers.
///
/// Every worker writes the k-mers of its own slice of the index space to
/// `<OUTPUT_PREFIX>-<rank>.out`; together the files form the full histogram.
#[derive(Parser, Debug)]
#[command(name = "kmershard")]
#[command(version, author, about, long_about = None)]
pub struct Args {
    /// Path to a FASTA file
    pub input: PathBuf,

    /// K-mer length (1-31)
    #[arg(value_parser = parse_k)]
    pub k: usize,

    /// Prefix of the per-worker output files
    pub output_prefix: PathBuf,

    /// Number of workers, each owning one slice of the index space
    #[arg(short, long, default_value = "1", value_parser = parse_workers)]
    pub workers: usize,

    /// How the index space is split between workers
    #[arg(long, value_enum, default_value = "balanced")]
    pub partition: PartitionPolicy,

    /// Handling of bytes other than A, C, G and T
    #[arg(long, value_enum, default_value = "lenient")]
    pub symbols: SymbolPolicy,

    /// Output format
    #[arg(short, long, value_enum, default_value = "tsv")]
    pub format: OutputFormat,

    /// Minimum count threshold (k-mers below this are excluded)
    #[arg(short, long, default_value = "1")]
    pub min_count: u64,

    /// Join all records into one sequence before counting, so k-mers span record boundaries
    #[arg(long)]
    pub concatenate: bool,

    /// Print a JSON summary of the run to stdout
    #[arg(long)]
    pub summary: bool,

    /// Suppress informational output (only errors are reported)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log progress of every phase to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_k(s: &str) -> Result<usize, String> {
    let k: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    KmerLength::new(k).map_err(|e| e.to_string())?;
    Ok(k)
}

fn parse_workers(s: &str) -> Result<usize, String> {
    let workers: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if workers == 0 {
        return Err("at least one worker is required".to_string());
    }
    Ok(workers)
}
