//! Loading FASTA-like input into a [`SequenceSet`].
//!
//! Each record starts with a `>` header line; the header text is ignored and
//! the sequence lines that follow are concatenated into one record. Only the
//! line feed ending each line is removed. Every other byte, including `\r`,
//! spaces and non-ASCII bytes, is kept and left to the symbol policy. Only the
//! rank-0 worker reads the input.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use bstr::io::BufReadExt;
use bytes::Bytes;
use tracing::debug;

use crate::{error::KmerShardError, store::SequenceSet};

/// Check if a path has a gzip extension (.gz).
#[cfg(feature = "gzip")]
fn is_gzip_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Reads every record of the file at `path`, in file order.
///
/// With the `gzip` feature enabled, paths ending in `.gz` are decompressed on
/// the fly.
///
/// # Errors
///
/// Returns [`KmerShardError::SequenceRead`] if the file cannot be opened and
/// [`KmerShardError::SequenceParse`] if its contents are not valid records.
pub fn read<P: AsRef<Path>>(path: P) -> Result<SequenceSet, KmerShardError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| KmerShardError::SequenceRead {
        source,
        path: path.to_path_buf(),
    })?;

    #[cfg(feature = "gzip")]
    if is_gzip_path(path) {
        return read_from(flate2::read::GzDecoder::new(file));
    }

    read_from(file)
}

/// Reads every record from an arbitrary reader.
///
/// Blank lines before the first header are skipped. Any other line there is a
/// parse error.
///
/// # Errors
///
/// Returns [`KmerShardError::SequenceParse`] if the data is not valid records
/// or the reader fails.
pub fn read_from<R: Read>(reader: R) -> Result<SequenceSet, KmerShardError> {
    let mut records = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    let mut line_number = 0_usize;
    let mut stray = None;

    BufReader::new(reader)
        .for_byte_line_with_terminator(|line| {
            line_number += 1;
            let line = line.strip_suffix(b"\n").unwrap_or(line);
            if line.first() == Some(&b'>') {
                if let Some(seq) = current.replace(Vec::new()) {
                    records.push(Bytes::from(seq));
                }
            } else if let Some(seq) = current.as_mut() {
                seq.extend_from_slice(line);
            } else if !line.is_empty() {
                stray = Some(line_number);
                return Ok(false);
            }
            Ok(true)
        })
        .map_err(|e| KmerShardError::SequenceParse {
            details: e.to_string(),
        })?;

    if let Some(line) = stray {
        return Err(KmerShardError::SequenceParse {
            details: format!("line {line}: expected '>' at record start"),
        });
    }
    if let Some(seq) = current {
        records.push(Bytes::from(seq));
    }

    debug!(records = records.len(), "Read sequence records");
    Ok(SequenceSet::new(records))
}
