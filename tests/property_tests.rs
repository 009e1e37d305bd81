//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold across all valid inputs,
//! catching edge cases that might be missed by example-based tests.

use kmershard::{
    count_sequences,
    kmer::{decode, encode, window_count, KmerLength, SymbolPolicy, Window, Windows},
    merge_shards,
    partition::{plan_all, unassigned, PartitionPolicy},
    Plan, SequenceSet,
};
use proptest::prelude::*;

/// Strategy for generating valid DNA sequences.
fn dna_sequence(min_len: usize, max_len: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![Just('A'), Just('C'), Just('G'), Just('T')],
        min_len..=max_len,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

/// Strategy for sequences that may contain unrecognized bytes.
fn noisy_sequence(max_len: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            4 => prop_oneof![Just('A'), Just('C'), Just('G'), Just('T')],
            1 => prop_oneof![Just('N'), Just('R'), Just('-')],
        ],
        0..=max_len,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    /// Decoding an encoded k-mer gives back the k-mer.
    #[test]
    fn decode_inverts_encode(seq in dna_sequence(1, 16)) {
        let k = KmerLength::new(seq.len()).unwrap();
        let index = encode(seq.as_bytes(), SymbolPolicy::Strict).unwrap();
        prop_assert!(index < k.index_space());
        prop_assert_eq!(decode(index, k), seq);
    }

    /// Encoding a decoded index gives back the index.
    #[test]
    fn encode_inverts_decode(k in 1usize..=16, raw in any::<u64>()) {
        let k = KmerLength::new(k).unwrap();
        let index = raw % k.index_space();
        let kmer = decode(index, k);
        prop_assert_eq!(encode(kmer.as_bytes(), SymbolPolicy::Strict).unwrap(), index);
    }

    /// Index order is lexicographic order of the decoded k-mers.
    #[test]
    fn index_order_is_lexicographic(a in dna_sequence(8, 8), b in dna_sequence(8, 8)) {
        let ia = encode(a.as_bytes(), SymbolPolicy::Strict).unwrap();
        let ib = encode(b.as_bytes(), SymbolPolicy::Strict).unwrap();
        prop_assert_eq!(ia.cmp(&ib), a.cmp(&b));
    }

    /// The rolling encoder agrees with encoding each window from scratch.
    #[test]
    fn rolling_matches_direct(seq in dna_sequence(0, 64), k in 1usize..=12) {
        let len = KmerLength::new(k).unwrap();
        let rolled: Vec<_> = Windows::new(seq.as_bytes(), len, SymbolPolicy::Lenient)
            .map(Result::unwrap)
            .collect();
        let direct: Vec<_> = seq
            .as_bytes()
            .windows(k)
            .map(|w| Window::Index(encode(w, SymbolPolicy::Lenient).unwrap()))
            .collect();
        prop_assert_eq!(rolled.len(), window_count(seq.len(), len));
        prop_assert_eq!(rolled, direct);
    }

    /// Balanced partitions cover the whole space exactly, without overlap.
    #[test]
    fn balanced_partitions_cover_space(space in 1u64..=1 << 20, workers in 1usize..=64) {
        let parts = plan_all(space, workers, PartitionPolicy::Balanced);
        prop_assert_eq!(parts.len(), workers);
        prop_assert_eq!(parts[0].start(), 0);
        prop_assert_eq!(parts[workers - 1].end(), space);
        for pair in parts.windows(2) {
            prop_assert_eq!(pair[0].end(), pair[1].start());
            prop_assert!(pair[0].len() >= pair[1].len());
            prop_assert!(pair[0].len() - pair[1].len() <= 1);
        }
        prop_assert_eq!(unassigned(space, &parts), 0);
    }

    /// The naive plan loses exactly `space mod workers` indices.
    #[test]
    fn naive_partitions_lose_remainder(space in 1u64..=1 << 20, workers in 1usize..=64) {
        let parts = plan_all(space, workers, PartitionPolicy::Naive);
        prop_assert_eq!(unassigned(space, &parts), space % workers as u64);
    }

    /// The merged histogram does not depend on the number of workers.
    #[test]
    fn histogram_is_partition_invariant(
        records in proptest::collection::vec(noisy_sequence(40), 0..5),
        k in 1usize..=5,
        workers in 2usize..=6,
        symbols in prop_oneof![Just(SymbolPolicy::Lenient), Just(SymbolPolicy::Other)],
    ) {
        let set = SequenceSet::from_records(records.iter().map(String::as_bytes));
        let single = Plan::new(k, 1).unwrap().with_symbols(symbols);
        let split = Plan::new(k, workers).unwrap().with_symbols(symbols);

        let whole = merge_shards(&count_sequences(&set, single).unwrap());
        let parts = merge_shards(&count_sequences(&set, split).unwrap());
        prop_assert_eq!(&whole, &parts);

        let windows: usize = records
            .iter()
            .map(|r| window_count(r.len(), KmerLength::new(k).unwrap()))
            .sum();
        prop_assert_eq!(parts.values().sum::<u64>(), windows as u64);
    }
}
