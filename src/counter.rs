//! Per-worker counting over the replicated sequence set.
//!
//! Every worker scans every window of every record and keeps only the
//! windows whose index falls inside its own [`Partition`]. The scan is
//! repeated in full on each worker, which removes the need for any merge or
//! reduction once counting ends: the shards are disjoint by construction.
//!
//! The alternative layout, splitting the records between workers and
//! reducing per-index counts across them afterwards, would do less scanning
//! but needs a cross-worker reduce over the whole index space.

use tracing::debug;

use crate::{
    error::KmerShardError,
    kmer::{decode, KmerIndex, KmerLength, SymbolPolicy, Window, Windows},
    partition::Partition,
    store::SequenceSet,
};

/// Counts for the k-mers in one worker's partition.
///
/// Slots are `u32`; an increment that would overflow is reported as an
/// error instead of wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramShard {
    k: KmerLength,
    partition: Partition,
    counts: Vec<u32>,
    other: u64,
}

impl HistogramShard {
    /// Allocates a zeroed shard covering `partition`.
    ///
    /// # Errors
    ///
    /// Returns [`KmerShardError::Allocation`] if the counter array cannot be
    /// allocated.
    pub fn new(k: KmerLength, partition: Partition) -> Result<Self, KmerShardError> {
        let bytes = partition.len().saturating_mul(std::mem::size_of::<u32>() as u64);
        let slots =
            usize::try_from(partition.len()).map_err(|_| KmerShardError::Allocation { bytes })?;

        let mut counts = Vec::new();
        counts
            .try_reserve_exact(slots)
            .map_err(|_| KmerShardError::Allocation { bytes })?;
        counts.resize(slots, 0);

        Ok(Self {
            k,
            partition,
            counts,
            other: 0,
        })
    }

    pub const fn k(&self) -> KmerLength {
        self.k
    }

    pub const fn partition(&self) -> Partition {
        self.partition
    }

    /// Adds one occurrence of `index`.
    ///
    /// Returns `Ok(false)` without counting if `index` is outside this
    /// shard's partition.
    ///
    /// # Errors
    ///
    /// Returns [`KmerShardError::CounterOverflow`] if the slot is full.
    pub fn increment(&mut self, index: KmerIndex) -> Result<bool, KmerShardError> {
        let Some(offset) = self.partition.offset(index) else {
            return Ok(false);
        };
        let slot = &mut self.counts[offset];
        *slot = slot
            .checked_add(1)
            .ok_or_else(|| KmerShardError::CounterOverflow {
                kmer: decode(index, self.k),
            })?;
        Ok(true)
    }

    /// Adds one window that fell outside the index space.
    pub fn increment_other(&mut self) {
        self.other += 1;
    }

    /// Count for `index`, or `None` if it is outside this shard.
    pub fn get(&self, index: KmerIndex) -> Option<u32> {
        self.partition.offset(index).map(|offset| self.counts[offset])
    }

    /// Windows tallied outside the index space.
    pub const fn other(&self) -> u64 {
        self.other
    }

    /// Raw counter slots, in index order starting at the partition start.
    pub fn slots(&self) -> &[u32] {
        &self.counts
    }

    /// Nonzero slots as `(index, count)`, ascending by index.
    pub fn nonzero(&self) -> impl Iterator<Item = (KmerIndex, u32)> + '_ {
        let start = self.partition.start();
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count != 0)
            .map(move |(offset, &count)| (start + offset as u64, count))
    }

    /// Number of distinct k-mers seen in this shard.
    pub fn distinct(&self) -> u64 {
        self.counts.iter().filter(|&&c| c != 0).count() as u64
    }

    /// Total occurrences in this shard, including the other bucket.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum::<u64>() + self.other
    }
}

/// Scans all of `set` and counts the windows that belong to `partition`.
///
/// `owns_other` decides whether this worker keeps the tally of windows with
/// unrecognized symbols under [`SymbolPolicy::Other`]; exactly one worker
/// should own it so that it is not counted once per worker.
///
/// # Errors
///
/// Returns [`KmerShardError::Allocation`] if the shard cannot be allocated,
/// [`KmerShardError::InvalidBase`] for an unrecognized symbol under
/// [`SymbolPolicy::Strict`], and [`KmerShardError::CounterOverflow`] if a
/// count exceeds `u32::MAX`.
pub fn count_shard(
    set: &SequenceSet,
    k: KmerLength,
    partition: Partition,
    policy: SymbolPolicy,
    owns_other: bool,
) -> Result<HistogramShard, KmerShardError> {
    let mut shard = HistogramShard::new(k, partition)?;
    let mut kept = 0u64;
    let mut discarded = 0u64;

    for (record, seq) in set.iter().enumerate() {
        for window in Windows::new(seq, k, policy) {
            match window.map_err(|err| err.in_record(record))? {
                Window::Index(index) => {
                    if shard.increment(index)? {
                        kept += 1;
                    } else {
                        discarded += 1;
                    }
                }
                Window::Unrecognized if owns_other => shard.increment_other(),
                Window::Unrecognized => discarded += 1,
            }
        }
    }

    debug!(
        partition = %partition,
        kept,
        discarded,
        other = shard.other(),
        "Counted shard"
    );
    Ok(shard)
}
