//! Run reports, k-mer spectra and shard merging.
//!
//! A k-mer spectrum (count of counts) maps each count value to the number of
//! distinct k-mers that occur that many times. It is computed per shard while
//! the shard is still in memory and combined across workers afterwards, since
//! spectra of disjoint shards simply add up.
//!
//! # Example
//!
//! ```rust
//! use kmershard::summary::{histogram_stats, KmerHistogram};
//!
//! let spectrum: KmerHistogram = [(1, 2), (2, 2)].into();
//! let stats = histogram_stats(&spectrum);
//!
//! assert_eq!(stats.distinct_kmers, 4);
//! assert_eq!(stats.total_kmers, 6);
//! ```

use std::{collections::BTreeMap, path::PathBuf};

use serde::Serialize;

use crate::{
    counter::HistogramShard,
    emit::decoded_counts,
    kmer::{KmerLength, SymbolPolicy},
    partition::{Partition, PartitionPolicy},
};

/// K-mer frequency spectrum: maps count -> number of distinct k-mers with that count.
///
/// Uses `BTreeMap` for sorted iteration (counts in ascending order).
pub type KmerHistogram = BTreeMap<u64, u64>;

/// Summary statistics for a k-mer spectrum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramStats {
    /// Total k-mer occurrences (sum of all k-mer counts).
    pub total_kmers: u64,
    /// Number of unique k-mers.
    pub distinct_kmers: u64,
    /// The count value that appears most frequently (mode of the distribution).
    pub mode_count: u64,
    /// Number of k-mers that have the mode count.
    pub mode_frequency: u64,
    /// Average k-mer count (`total_kmers` / `distinct_kmers`).
    pub mean_count: f64,
}

/// Computes the spectrum of one shard's index-space slots.
///
/// The bucket of windows with unrecognized symbols is not a k-mer and is left
/// out.
pub fn shard_histogram(shard: &HistogramShard) -> KmerHistogram {
    let mut histogram = BTreeMap::new();
    for (_, count) in shard.nonzero() {
        *histogram.entry(u64::from(count)).or_insert(0) += 1;
    }
    histogram
}

/// Adds the spectrum `other` into `into`.
pub fn merge_histograms(into: &mut KmerHistogram, other: &KmerHistogram) {
    for (&count, &frequency) in other {
        *into.entry(count).or_insert(0) += frequency;
    }
}

/// Computes summary statistics for a k-mer spectrum.
#[must_use]
pub fn histogram_stats(histogram: &KmerHistogram) -> HistogramStats {
    let distinct: u64 = histogram.values().sum();
    let total: u64 = histogram.iter().map(|(c, f)| c * f).sum();

    let (mode_count, mode_frequency) = histogram
        .iter()
        .max_by_key(|(_, f)| *f)
        .map_or((0, 0), |(&c, &f)| (c, f));

    HistogramStats {
        total_kmers: total,
        distinct_kmers: distinct,
        mode_count,
        mode_frequency,
        #[allow(clippy::cast_precision_loss)]
        mean_count: if distinct > 0 {
            total as f64 / distinct as f64
        } else {
            0.0
        },
    }
}

/// Union of every shard's `(kmer, count)` pairs, keyed by k-mer.
///
/// Shards from a correct plan are disjoint, so each k-mer appears in at most
/// one of them; overlapping inputs are summed. The bucket of windows with
/// unrecognized symbols is included under its `N`-repeated key.
pub fn merge_shards(shards: &[HistogramShard]) -> BTreeMap<String, u64> {
    let mut merged = BTreeMap::new();
    for shard in shards {
        for entry in decoded_counts(shard, 1) {
            *merged.entry(entry.kmer).or_insert(0) += entry.count;
        }
    }
    merged
}

/// What one worker did during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerReport {
    pub rank: usize,
    pub partition: Partition,
    /// Records in the worker's replica of the sequence set.
    pub records: usize,
    /// Windows scanned, identical on every worker.
    pub windows: u64,
    pub distinct: u64,
    /// Occurrences kept in this shard, including the other bucket.
    pub total: u64,
    pub other: u64,
    pub output: Option<PathBuf>,
    pub records_written: u64,
    #[serde(skip)]
    pub spectrum: KmerHistogram,
}

/// Whole-run report assembled after every worker finished.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub k: KmerLength,
    pub workers: usize,
    pub partition_policy: PartitionPolicy,
    pub symbol_policy: SymbolPolicy,
    /// Indices owned by no worker (nonzero only under the naive plan).
    pub unassigned: u64,
    /// Windows in the input, `sum(len - k + 1)` over records at least `k` long.
    pub windows: u64,
    /// Windows counted across all shards.
    pub counted: u64,
    pub spectrum: KmerHistogram,
    pub stats: HistogramStats,
    pub shards: Vec<WorkerReport>,
}

impl RunSummary {
    pub fn new(
        k: KmerLength,
        partition_policy: PartitionPolicy,
        symbol_policy: SymbolPolicy,
        unassigned: u64,
        shards: Vec<WorkerReport>,
    ) -> Self {
        let mut spectrum = KmerHistogram::new();
        for report in &shards {
            merge_histograms(&mut spectrum, &report.spectrum);
        }
        let stats = histogram_stats(&spectrum);
        Self {
            k,
            workers: shards.len(),
            partition_policy,
            symbol_policy,
            unassigned,
            windows: shards.first().map_or(0, |r| r.windows),
            counted: shards.iter().map(|r| r.total).sum(),
            spectrum,
            stats,
            shards,
        }
    }

    /// Every window was counted exactly once.
    pub const fn is_conserved(&self) -> bool {
        self.windows == self.counted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{counter::count_shard, store::SequenceSet};

    fn shards(records: &[&str], k: usize, parts: &[(u64, u64)]) -> Vec<HistogramShard> {
        let k = KmerLength::new(k).unwrap();
        let set = SequenceSet::from_records(records.iter().copied());
        parts
            .iter()
            .enumerate()
            .map(|(rank, &(start, end))| {
                count_shard(
                    &set,
                    k,
                    Partition::new(start, end),
                    SymbolPolicy::Other,
                    rank == 0,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn shard_histogram_counts_counts() {
        // AA x2, AC x1, CA x1
        let shard = &shards(&["AAACA"], 2, &[(0, 16)])[0];
        let hist = shard_histogram(shard);
        assert_eq!(hist.get(&2), Some(&1));
        assert_eq!(hist.get(&1), Some(&2));
        assert_eq!(hist.get(&3), None);
    }

    #[test]
    fn merged_histograms_add_up() {
        let parts = shards(&["AAACA"], 2, &[(0, 3), (3, 16)]);
        let mut total = KmerHistogram::new();
        for shard in &parts {
            merge_histograms(&mut total, &shard_histogram(shard));
        }
        let whole = shard_histogram(&shards(&["AAACA"], 2, &[(0, 16)])[0]);
        assert_eq!(total, whole);
    }

    #[test]
    fn histogram_stats_basic() {
        let hist: KmerHistogram = [(1, 2), (2, 2)].into();
        let stats = histogram_stats(&hist);

        assert_eq!(stats.distinct_kmers, 4);
        assert_eq!(stats.total_kmers, 6);
        assert_eq!(stats.mode_frequency, 2);
        assert!((stats.mean_count - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn histogram_stats_empty() {
        let stats = histogram_stats(&KmerHistogram::new());

        assert_eq!(stats.distinct_kmers, 0);
        assert_eq!(stats.total_kmers, 0);
        assert_eq!(stats.mode_count, 0);
        assert_eq!(stats.mode_frequency, 0);
        assert!((stats.mean_count - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn histogram_stats_single_kmer() {
        let hist: KmerHistogram = [(42, 1)].into();
        let stats = histogram_stats(&hist);

        assert_eq!(stats.total_kmers, 42);
        assert_eq!(stats.mode_count, 42);
        assert!((stats.mean_count - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_shards_is_union() {
        let parts = shards(&["ACGTNAC"], 2, &[(0, 8), (8, 16)]);
        let merged = merge_shards(&parts);
        let expected: BTreeMap<String, u64> = [
            ("AC".to_string(), 2),
            ("CG".to_string(), 1),
            ("GT".to_string(), 1),
            ("NN".to_string(), 2),
        ]
        .into();
        assert_eq!(merged, expected);
    }
}
