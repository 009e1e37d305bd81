use std::path::PathBuf;

use crate::{
    cli::Args,
    coordinator::Plan,
    emit::OutputFormat,
    error::KmerShardError,
    kmer::{KmerLength, SymbolPolicy},
    partition::PartitionPolicy,
};

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub input: PathBuf,
    pub k: KmerLength,
    pub output_prefix: PathBuf,
    pub workers: usize,
    pub partition: PartitionPolicy,
    pub symbols: SymbolPolicy,
    pub format: OutputFormat,
    pub min_count: u64,
    /// Join all records into one super-sequence before counting.
    pub concatenate: bool,
}

impl Config {
    /// A single-worker run with default policies.
    pub fn new(
        input: impl Into<PathBuf>,
        k: usize,
        output_prefix: impl Into<PathBuf>,
    ) -> Result<Self, KmerShardError> {
        Ok(Self {
            input: input.into(),
            k: KmerLength::new(k)?,
            output_prefix: output_prefix.into(),
            workers: 1,
            partition: PartitionPolicy::default(),
            symbols: SymbolPolicy::default(),
            format: OutputFormat::default(),
            min_count: 1,
            concatenate: false,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Result<Self, KmerShardError> {
        if workers == 0 {
            return Err(KmerShardError::InvalidWorkerCount { workers });
        }
        self.workers = workers;
        Ok(self)
    }

    #[must_use]
    pub const fn with_partition(mut self, partition: PartitionPolicy) -> Self {
        self.partition = partition;
        self
    }

    #[must_use]
    pub const fn with_symbols(mut self, symbols: SymbolPolicy) -> Self {
        self.symbols = symbols;
        self
    }

    #[must_use]
    pub const fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub const fn with_min_count(mut self, min_count: u64) -> Self {
        self.min_count = min_count;
        self
    }

    #[must_use]
    pub const fn with_concatenate(mut self, concatenate: bool) -> Self {
        self.concatenate = concatenate;
        self
    }

    pub const fn plan(&self) -> Plan {
        Plan {
            k: self.k,
            workers: self.workers,
            partition: self.partition,
            symbols: self.symbols,
        }
    }
}

impl TryFrom<Args> for Config {
    type Error = KmerShardError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        Ok(Self::new(args.input, args.k, args.output_prefix)?
            .with_workers(args.workers)?
            .with_partition(args.partition)
            .with_symbols(args.symbols)
            .with_format(args.format)
            .with_min_count(args.min_count)
            .with_concatenate(args.concatenate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults() {
        let config = Config::new("in.fa", 4, "out").unwrap();
        assert_eq!(config.workers, 1);
        assert_eq!(config.min_count, 1);
        assert_eq!(config.format, OutputFormat::Tsv);
        assert!(!config.concatenate);
        assert_eq!(config.plan().k.get(), 4);
    }

    #[test]
    fn rejects_out_of_range_k() {
        assert!(matches!(
            Config::new("in.fa", 32, "out"),
            Err(KmerShardError::InvalidKmerLength { k: 32, .. })
        ));
    }

    #[test]
    fn rejects_zero_workers() {
        let err = Config::new("in.fa", 4, "out")
            .unwrap()
            .with_workers(0)
            .unwrap_err();
        assert!(matches!(err, KmerShardError::InvalidWorkerCount { workers: 0 }));
    }

    #[test]
    fn from_args() {
        let args = Args::try_parse_from([
            "kmershard",
            "in.fa",
            "5",
            "out",
            "-w",
            "3",
            "-m",
            "2",
            "--concatenate",
        ])
        .unwrap();
        let config = Config::try_from(args).unwrap();
        assert_eq!(config.k.get(), 5);
        assert_eq!(config.workers, 3);
        assert_eq!(config.min_count, 2);
        assert!(config.concatenate);
        assert_eq!(config.output_prefix, PathBuf::from("out"));
    }
}
