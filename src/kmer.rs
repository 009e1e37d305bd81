//! Bijective mapping between k-mers and integer indices.
//!
//! A k-mer of length `k` over `{A, C, G, T}` is read as a base-4 numeral with
//! the last symbol as the least significant digit (`A=0, C=1, G=2, T=3`). The
//! resulting [`KmerIndex`] lies in `[0, 4^k)` and indices sort in the same
//! order as the k-mers themselves under `A < C < G < T`.
//!
//! # Example
//!
//! ```rust
//! use kmershard::kmer::{decode, encode, KmerLength, SymbolPolicy};
//!
//! let k = KmerLength::new(4)?;
//! let index = encode(b"ACGT", SymbolPolicy::Lenient)?;
//! assert_eq!(index, 0b00_01_10_11);
//! assert_eq!(decode(index, k), "ACGT");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use clap::ValueEnum;
use serde::Serialize;

use crate::error::{InvalidBaseError, KmerLengthError};

/// Integer position of a k-mer inside the index space `[0, 4^k)`.
pub type KmerIndex = u64;

/// A validated k-mer length.
///
/// The upper bound keeps `4^k` representable as a [`KmerIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct KmerLength(usize);

impl KmerLength {
    /// Minimum valid k-mer length.
    pub const MIN: usize = 1;

    /// Maximum valid k-mer length.
    pub const MAX: usize = 31;

    /// Creates a new `KmerLength` after validating the range.
    ///
    /// # Errors
    ///
    /// Returns [`KmerLengthError`] if `k` is zero or larger than 31.
    pub const fn new(k: usize) -> Result<Self, KmerLengthError> {
        if k < Self::MIN || k > Self::MAX {
            return Err(KmerLengthError {
                k,
                min: Self::MIN as u8,
                max: Self::MAX as u8,
            });
        }
        Ok(Self(k))
    }

    /// Returns the length as a `usize`.
    pub const fn get(self) -> usize {
        self.0
    }

    /// Size of the index space, `4^k`.
    pub const fn index_space(self) -> u64 {
        1u64 << (2 * self.0)
    }

    /// Mask keeping the low `2k` bits of an index.
    pub const fn mask(self) -> u64 {
        self.index_space() - 1
    }
}

impl TryFrom<usize> for KmerLength {
    type Error = KmerLengthError;

    fn try_from(k: usize) -> Result<Self, Self::Error> {
        Self::new(k)
    }
}

impl std::fmt::Display for KmerLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the four recognized sequence symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Symbol {
    A,
    C,
    G,
    T,
}

impl Symbol {
    /// The 2-bit digit this symbol contributes to an index.
    pub const fn digit(self) -> u64 {
        match self {
            Self::A => 0,
            Self::C => 1,
            Self::G => 2,
            Self::T => 3,
        }
    }

    /// Symbol for the low two bits of `digit`.
    pub const fn from_digit(digit: u64) -> Self {
        match digit & 0b11 {
            0 => Self::A,
            1 => Self::C,
            2 => Self::G,
            _ => Self::T,
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            Self::A => b'A',
            Self::C => b'C',
            Self::G => b'G',
            Self::T => b'T',
        }
    }
}

impl TryFrom<u8> for Symbol {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'A' => Ok(Self::A),
            b'C' => Ok(Self::C),
            b'G' => Ok(Self::G),
            b'T' => Ok(Self::T),
            other => Err(other),
        }
    }
}

/// How bytes outside `{A, C, G, T}` are treated during encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolPolicy {
    /// Unrecognized bytes contribute digit 0, exactly like `A`.
    #[default]
    Lenient,
    /// Unrecognized bytes abort encoding with an error.
    Strict,
    /// Windows containing unrecognized bytes are tallied in a separate bucket.
    Other,
}

impl std::fmt::Display for SymbolPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lenient => write!(f, "lenient"),
            Self::Strict => write!(f, "strict"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[inline]
const fn lenient_digit(byte: u8) -> u64 {
    match byte {
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => 0,
    }
}

/// Encodes a full k-mer into its index.
///
/// The k-mer length is `kmer.len()`; callers are expected to pass a slice of
/// a validated [`KmerLength`]. Under [`SymbolPolicy::Strict`] and
/// [`SymbolPolicy::Other`] the first unrecognized byte is reported as an
/// error, since a single k-mer has no "other" bucket of its own.
///
/// # Errors
///
/// Returns [`InvalidBaseError`] for an unrecognized byte unless the policy is
/// [`SymbolPolicy::Lenient`].
pub fn encode(kmer: &[u8], policy: SymbolPolicy) -> Result<KmerIndex, InvalidBaseError> {
    kmer.iter()
        .enumerate()
        .try_fold(0u64, |index, (position, &byte)| {
            let digit = match (Symbol::try_from(byte), policy) {
                (Ok(symbol), _) => symbol.digit(),
                (Err(_), SymbolPolicy::Lenient) => lenient_digit(byte),
                (Err(base), _) => return Err(InvalidBaseError { base, position }),
            };
            Ok((index << 2) | digit)
        })
}

/// Decodes an index back into its k-mer.
///
/// Only the low `2k` bits of `index` are read.
pub fn decode(index: KmerIndex, k: KmerLength) -> String {
    let bytes = decode_to_bytes(index, k);
    // Every byte is one of A, C, G, T.
    bytes.into_iter().map(char::from).collect()
}

/// Decodes an index into its k-mer as raw bytes.
pub fn decode_to_bytes(index: KmerIndex, k: KmerLength) -> Vec<u8> {
    let k = k.get();
    let mut kmer = vec![b'A'; k];
    for i in 0..k {
        kmer[k - 1 - i] = Symbol::from_digit(index >> (2 * i)).to_byte();
    }
    kmer
}

/// One length-`k` window of a sequence, as seen by the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// The window's position in the index space.
    Index(KmerIndex),
    /// The window contains an unrecognized byte ([`SymbolPolicy::Other`] only).
    Unrecognized,
}

/// Rolling encoder over every length-`k` window of a sequence.
///
/// Yields `len - k + 1` windows for sequences at least `k` long and nothing
/// otherwise. Each step shifts in one symbol instead of re-encoding the whole
/// window. Under [`SymbolPolicy::Strict`] the first unrecognized byte yields
/// an error and ends the iteration.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    seq: &'a [u8],
    k: usize,
    mask: u64,
    policy: SymbolPolicy,
    next: usize,
    code: u64,
    // Position just past the most recent unrecognized byte.
    clean_from: usize,
    done: bool,
}

impl<'a> Windows<'a> {
    pub fn new(seq: &'a [u8], k: KmerLength, policy: SymbolPolicy) -> Self {
        Self {
            seq,
            k: k.get(),
            mask: k.mask(),
            policy,
            next: 0,
            code: 0,
            clean_from: 0,
            done: seq.len() < k.get(),
        }
    }

    fn push(&mut self, position: usize) -> Result<(), InvalidBaseError> {
        let byte = self.seq[position];
        let digit = match (Symbol::try_from(byte), self.policy) {
            (Ok(symbol), _) => symbol.digit(),
            (Err(_), SymbolPolicy::Lenient) => lenient_digit(byte),
            (Err(_), SymbolPolicy::Other) => {
                self.clean_from = position + 1;
                0
            }
            (Err(base), SymbolPolicy::Strict) => return Err(InvalidBaseError { base, position }),
        };
        self.code = ((self.code << 2) | digit) & self.mask;
        Ok(())
    }
}

impl Iterator for Windows<'_> {
    type Item = Result<Window, InvalidBaseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        // Prime the first window on the first call.
        let end = if self.next == 0 {
            for position in 0..self.k - 1 {
                if let Err(err) = self.push(position) {
                    self.done = true;
                    return Some(Err(err));
                }
            }
            self.k - 1
        } else {
            self.next + self.k - 1
        };
        if let Err(err) = self.push(end) {
            self.done = true;
            return Some(Err(err));
        }
        let start = self.next;
        self.next += 1;
        if self.next + self.k > self.seq.len() {
            self.done = true;
        }
        if self.clean_from > start {
            Some(Ok(Window::Unrecognized))
        } else {
            Some(Ok(Window::Index(self.code)))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.done {
            0
        } else {
            self.seq.len() + 1 - self.k - self.next
        };
        (remaining, Some(remaining))
    }
}

/// Number of windows of length `k` in a sequence of length `len`.
pub const fn window_count(len: usize, k: KmerLength) -> usize {
    (len + 1).saturating_sub(k.get())
}
