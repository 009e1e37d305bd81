//! Division of the index space `[0, 4^k)` into one contiguous range per worker.
//!
//! Two planning policies are available. [`PartitionPolicy::Balanced`] hands
//! the remainder of `M / W` to the first `M mod W` workers, so the ranges
//! always cover the whole space. [`PartitionPolicy::Naive`] gives every worker
//! exactly `M / W` indices and leaves the tail unassigned; it is kept so runs
//! can be compared against output produced that way.
//!
//! # Example
//!
//! ```rust
//! use kmershard::partition::{plan_all, PartitionPolicy};
//!
//! let ranges = plan_all(16, 3, PartitionPolicy::Balanced);
//! assert_eq!(ranges[0].start(), 0);
//! assert_eq!(ranges[0].end(), 6);
//! assert_eq!(ranges[2].end(), 16);
//! ```

use clap::ValueEnum;
use serde::Serialize;

use crate::kmer::KmerIndex;

/// Half-open range `[start, end)` of the index space owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Partition {
    start: KmerIndex,
    end: KmerIndex,
}

impl Partition {
    /// Creates a partition. `end` is clamped to be no smaller than `start`.
    pub const fn new(start: KmerIndex, end: KmerIndex) -> Self {
        let end = if end < start { start } else { end };
        Self { start, end }
    }

    pub const fn start(self) -> KmerIndex {
        self.start
    }

    pub const fn end(self) -> KmerIndex {
        self.end
    }

    /// Number of indices in the range.
    pub const fn len(self) -> u64 {
        self.end - self.start
    }

    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }

    pub const fn contains(self, index: KmerIndex) -> bool {
        index >= self.start && index < self.end
    }

    /// Offset of `index` inside this range, if it belongs here.
    pub const fn offset(self, index: KmerIndex) -> Option<usize> {
        if self.contains(index) {
            Some((index - self.start) as usize)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Strategy used to split the index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionPolicy {
    /// First `M mod W` workers receive one extra index; full coverage.
    #[default]
    Balanced,
    /// Every worker receives `M / W` indices; the last `M mod W` are dropped.
    Naive,
}

impl std::fmt::Display for PartitionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Balanced => write!(f, "balanced"),
            Self::Naive => write!(f, "naive"),
        }
    }
}

/// Returns the range owned by worker `rank` out of `workers`.
///
/// `space` is the size of the index space (`4^k`). `workers` must be at least
/// one and `rank` must be below `workers`; out-of-range ranks get an empty
/// partition at the end of the space.
pub fn plan(space: u64, workers: usize, rank: usize, policy: PartitionPolicy) -> Partition {
    if workers == 0 || rank >= workers {
        return Partition::new(space, space);
    }
    let (w, r) = (workers as u64, rank as u64);
    let shard = space / w;
    match policy {
        PartitionPolicy::Naive => Partition::new(r * shard, (r + 1) * shard),
        PartitionPolicy::Balanced => {
            let extra = space % w;
            let start = r * shard + r.min(extra);
            let len = shard + u64::from(r < extra);
            Partition::new(start, start + len)
        }
    }
}

/// Returns every worker's range, in rank order.
pub fn plan_all(space: u64, workers: usize, policy: PartitionPolicy) -> Vec<Partition> {
    (0..workers)
        .map(|rank| plan(space, workers, rank, policy))
        .collect()
}

/// Number of indices no worker owns under the given plan.
pub fn unassigned(space: u64, partitions: &[Partition]) -> u64 {
    space - partitions.iter().map(|p| p.len()).sum::<u64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(space: u64, workers: usize) {
        let parts = plan_all(space, workers, PartitionPolicy::Balanced);
        assert_eq!(parts.len(), workers);
        assert_eq!(parts[0].start(), 0);
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start(), "gap or overlap in {parts:?}");
        }
        assert_eq!(parts[workers - 1].end(), space);
        assert_eq!(unassigned(space, &parts), 0);
    }

    #[test]
    fn naive_plan_drops_tail_for_k2_three_workers() {
        let parts = plan_all(16, 3, PartitionPolicy::Naive);
        assert_eq!(
            parts,
            vec![
                Partition::new(0, 5),
                Partition::new(5, 10),
                Partition::new(10, 15)
            ]
        );
        assert!(!parts.iter().any(|p| p.contains(15)));
        assert_eq!(unassigned(16, &parts), 1);
    }

    #[test]
    fn balanced_plan_covers_tail_for_k2_three_workers() {
        let parts = plan_all(16, 3, PartitionPolicy::Balanced);
        assert_eq!(
            parts,
            vec![
                Partition::new(0, 6),
                Partition::new(6, 11),
                Partition::new(11, 16)
            ]
        );
        assert!(parts.iter().any(|p| p.contains(15)));
        assert_eq!(unassigned(16, &parts), 0);
    }

    #[test]
    fn balanced_plan_is_exact_cover() {
        for space in [1, 4, 16, 64, 100, 1024, 4096] {
            for workers in 1..=17 {
                assert_exact_cover(space, workers);
            }
        }
    }

    #[test]
    fn balanced_sizes_differ_by_at_most_one() {
        let parts = plan_all(1000, 7, PartitionPolicy::Balanced);
        let min = parts.iter().map(|p| p.len()).min().unwrap();
        let max = parts.iter().map(|p| p.len()).max().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn more_workers_than_indices() {
        let parts = plan_all(4, 6, PartitionPolicy::Balanced);
        assert_eq!(parts.iter().filter(|p| p.is_empty()).count(), 2);
        assert_exact_cover(4, 6);

        let naive = plan_all(4, 6, PartitionPolicy::Naive);
        assert!(naive.iter().all(|p| p.is_empty()));
        assert_eq!(unassigned(4, &naive), 4);
    }

    #[test]
    fn single_worker_owns_everything() {
        for policy in [PartitionPolicy::Balanced, PartitionPolicy::Naive] {
            assert_eq!(plan(4096, 1, 0, policy), Partition::new(0, 4096));
        }
    }

    #[test]
    fn out_of_range_rank_is_empty() {
        assert!(plan(16, 2, 5, PartitionPolicy::Balanced).is_empty());
        assert!(plan(16, 0, 0, PartitionPolicy::Balanced).is_empty());
    }

    #[test]
    fn offset_inside_and_outside() {
        let p = Partition::new(10, 20);
        assert_eq!(p.offset(10), Some(0));
        assert_eq!(p.offset(19), Some(9));
        assert_eq!(p.offset(20), None);
        assert_eq!(p.offset(9), None);
    }

    #[test]
    fn display() {
        assert_eq!(Partition::new(0, 6).to_string(), "[0, 6)");
        assert_eq!(PartitionPolicy::Naive.to_string(), "naive");
    }
}
