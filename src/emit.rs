//! Serialization of one worker's shard to its own output file.
//!
//! Records come out strictly ascending by index, which is also lexicographic
//! order of the k-mers. The union of every worker's file is the complete
//! histogram; nothing here merges across workers.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::{
    counter::HistogramShard,
    error::KmerShardError,
    kmer::{decode, KmerIndex},
};

/// Decoded k-mers are formatted in parallel, this many at a time.
const CHUNK: usize = 1 << 16;

/// Output format for k-mer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tab-separated values (kmer\tcount)
    #[default]
    Tsv,
    /// FASTA-like format (>{count}\n{kmer})
    Fasta,
    /// JSON array format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tsv => write!(f, "tsv"),
            Self::Fasta => write!(f, "fasta"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// A k-mer with its count, used for JSON serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KmerCount {
    pub kmer: String,
    pub count: u64,
}

/// Path of the output file for `rank`: `<prefix>-<rank>.out`.
pub fn shard_path(prefix: &Path, rank: usize) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("-{rank}.out"));
    PathBuf::from(name)
}

/// Key used for the bucket of windows with unrecognized symbols.
pub fn other_key(shard: &HistogramShard) -> String {
    "N".repeat(shard.k().get())
}

/// The line-per-record formats. JSON is written as one document instead.
#[derive(Debug, Clone, Copy)]
enum RecordLayout {
    Tsv,
    Fasta,
}

impl RecordLayout {
    fn format(self, kmer: &str, count: u64) -> String {
        match self {
            Self::Tsv => format!("{kmer}\t{count}\n"),
            Self::Fasta => format!(">{count}\n{kmer}\n"),
        }
    }
}

fn qualifying(shard: &HistogramShard, min_count: u64) -> Vec<(KmerIndex, u32)> {
    shard
        .nonzero()
        .filter(|&(_, count)| u64::from(count) >= min_count)
        .collect()
}

/// Decodes the shard's nonzero slots with `count >= min_count`, ascending,
/// followed by the other bucket if it qualifies.
pub fn decoded_counts(shard: &HistogramShard, min_count: u64) -> Vec<KmerCount> {
    let entries = qualifying(shard, min_count);
    let k = shard.k();
    let mut counts: Vec<KmerCount> = entries
        .par_iter()
        .map(|&(index, count)| KmerCount {
            kmer: decode(index, k),
            count: u64::from(count),
        })
        .collect();
    if shard.other() > 0 && shard.other() >= min_count {
        counts.push(KmerCount {
            kmer: other_key(shard),
            count: shard.other(),
        });
    }
    counts
}

/// Writes the shard to `writer` and returns the number of records written.
///
/// # Errors
///
/// Returns any I/O error from `writer`.
pub fn write_shard<W: Write>(
    shard: &HistogramShard,
    format: OutputFormat,
    min_count: u64,
    mut writer: W,
) -> std::io::Result<u64> {
    let written = match format {
        OutputFormat::Json => write_json(shard, min_count, &mut writer)?,
        OutputFormat::Tsv => write_records(shard, RecordLayout::Tsv, min_count, &mut writer)?,
        OutputFormat::Fasta => write_records(shard, RecordLayout::Fasta, min_count, &mut writer)?,
    };
    writer.flush()?;
    Ok(written)
}

fn write_json<W: Write>(
    shard: &HistogramShard,
    min_count: u64,
    mut writer: W,
) -> std::io::Result<u64> {
    let counts = decoded_counts(shard, min_count);
    serde_json::to_writer_pretty(&mut writer, &counts)?;
    writeln!(writer)?;
    Ok(counts.len() as u64)
}

fn write_records<W: Write>(
    shard: &HistogramShard,
    layout: RecordLayout,
    min_count: u64,
    mut writer: W,
) -> std::io::Result<u64> {
    let entries = qualifying(shard, min_count);
    let k = shard.k();
    for chunk in entries.chunks(CHUNK) {
        let text: String = chunk
            .par_iter()
            .map(|&(index, count)| layout.format(&decode(index, k), u64::from(count)))
            .collect();
        writer.write_all(text.as_bytes())?;
    }

    let mut written = entries.len() as u64;
    if shard.other() > 0 && shard.other() >= min_count {
        writer.write_all(layout.format(&other_key(shard), shard.other()).as_bytes())?;
        written += 1;
    }
    Ok(written)
}

/// An output file that is deleted again unless the run keeps it.
///
/// The file is created up front so that an unwritable target is found before
/// any worker emits; dropping the writer without calling
/// [`ShardWriter::persist`] removes it.
#[derive(Debug)]
pub struct ShardWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    keep: bool,
}

impl ShardWriter {
    /// Creates (or truncates) `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KmerShardError::OutputWrite`] if the file cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, KmerShardError> {
        let path = path.into();
        let file = File::create(&path).map_err(|source| KmerShardError::OutputWrite {
            source,
            path: path.clone(),
        })?;
        Ok(Self {
            path,
            out: Some(BufWriter::new(file)),
            keep: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the shard and flushes the file.
    ///
    /// # Errors
    ///
    /// Returns [`KmerShardError::OutputWrite`] on any I/O error.
    pub fn write(
        &mut self,
        shard: &HistogramShard,
        format: OutputFormat,
        min_count: u64,
    ) -> Result<u64, KmerShardError> {
        let to_error = |source| KmerShardError::OutputWrite {
            source,
            path: self.path.clone(),
        };
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| to_error(std::io::ErrorKind::BrokenPipe.into()))?;
        let written = write_shard(shard, format, min_count, out).map_err(to_error)?;
        debug!(path = %self.path.display(), records = written, "Wrote shard");
        Ok(written)
    }

    /// Keeps the file and returns its path.
    pub fn persist(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ShardWriter {
    fn drop(&mut self) {
        // Close before removing.
        drop(self.out.take());
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
