//! Reading and writing representation contents.
//!
//! A fulltext representation is one strings-table read. A delta
//! representation replays its windows in order: each window resolves its
//! base representation (recursively; a base may itself be a delta),
//! applies its diff payload, and must reproduce its recorded MD5 before
//! the bytes are accepted. The assembled fulltext is then checked against
//! the representation's own MD5. Wrong bytes are never returned silently.

use strata_error::{Result, StrataError};
use strata_store::Trail;
use strata_types::{DeltaWindow, Md5Digest, RepContents, Representation};
use tracing::trace;

use crate::{delta, reps_table, strings_table};

/// Bound on delta-chain depth. The record format has no intrinsic cycle
/// protection, so resolution refuses to chase chains past this.
pub const MAX_DELTA_DEPTH: usize = 64;

/// Span of plaintext covered by one delta window on the write path.
pub const DELTA_WINDOW_SIZE: usize = 102_400;

fn checksum_mismatch(key: &str, expected: &Md5Digest, actual: &Md5Digest) -> StrataError {
    StrataError::ChecksumMismatch {
        key: key.to_owned(),
        expected: expected.to_hex(),
        actual: actual.to_hex(),
    }
}

/// Read the full plaintext of the representation under `rep_key`.
pub fn read_rep_contents(trail: &Trail, rep_key: &str) -> Result<Vec<u8>> {
    read_at_depth(trail, rep_key, 0)
}

fn read_at_depth(trail: &Trail, rep_key: &str, depth: usize) -> Result<Vec<u8>> {
    if depth > MAX_DELTA_DEPTH {
        return Err(StrataError::DeltaChainTooDeep {
            key: rep_key.to_owned(),
            depth,
        });
    }

    let rep = reps_table::get_rep(trail, rep_key)?;
    let contents = match &rep.contents {
        RepContents::Fulltext { string_key } => strings_table::read_string(trail, string_key)?,
        RepContents::Delta { windows } => {
            let mut out = Vec::new();
            for window in windows {
                if window.offset != out.len() as u64 {
                    return Err(StrataError::InvalidDelta {
                        detail: format!(
                            "window at offset {} follows {} reconstructed bytes",
                            window.offset,
                            out.len()
                        ),
                    });
                }
                let produced = apply_window(trail, rep_key, window, depth)?;
                out.extend_from_slice(&produced);
            }
            out
        }
    };

    if let Some(expected) = &rep.checksum {
        let actual = Md5Digest::of(&contents);
        if actual != *expected {
            return Err(checksum_mismatch(rep_key, expected, &actual));
        }
    }
    trace!(rep_key, len = contents.len(), "read representation");
    Ok(contents)
}

fn apply_window(
    trail: &Trail,
    rep_key: &str,
    window: &DeltaWindow,
    depth: usize,
) -> Result<Vec<u8>> {
    let base = if window.rep_key.is_empty() {
        Vec::new()
    } else {
        read_at_depth(trail, &window.rep_key, depth + 1)?
    };
    let payload = strings_table::read_string(trail, &window.string_key)?;
    let produced = delta::apply(&payload, &base)?;

    if produced.len() as u64 != window.size {
        return Err(StrataError::InvalidDelta {
            detail: format!(
                "window promised {} bytes, produced {}",
                window.size,
                produced.len()
            ),
        });
    }
    if let Some(expected) = &window.checksum {
        let actual = Md5Digest::of(&produced);
        if actual != *expected {
            return Err(checksum_mismatch(rep_key, expected, &actual));
        }
    }
    Ok(produced)
}

/// Store `contents` as a fulltext representation created in `txn_id`;
/// returns the new representation key.
pub fn write_fulltext(trail: &Trail, txn_id: &str, contents: &[u8]) -> Result<String> {
    let string_key = strings_table::new_string(trail, contents)?;
    let rep = Representation {
        txn_id: txn_id.to_owned(),
        checksum: Some(Md5Digest::of(contents)),
        contents: RepContents::Fulltext { string_key },
    };
    reps_table::new_rep(trail, &rep)
}

/// Store `contents` as a delta representation against `base_rep_key`
/// (empty for self-contained windows); returns the new representation
/// key.
///
/// The target is cut into windows of at most [`DELTA_WINDOW_SIZE`] bytes,
/// each encoded against the base's fulltext and checksummed over the
/// plaintext it reconstructs.
pub fn write_delta(
    trail: &Trail,
    txn_id: &str,
    base_rep_key: &str,
    contents: &[u8],
) -> Result<String> {
    let base = if base_rep_key.is_empty() {
        Vec::new()
    } else {
        read_rep_contents(trail, base_rep_key)?
    };

    let mut windows = Vec::new();
    let mut offset = 0usize;
    loop {
        let end = contents.len().min(offset + DELTA_WINDOW_SIZE);
        let chunk = &contents[offset..end];
        let payload = delta::encode(&base, chunk);
        let string_key = strings_table::new_string(trail, &payload)?;
        windows.push(DeltaWindow {
            offset: offset as u64,
            version: 0,
            string_key,
            size: chunk.len() as u64,
            rep_key: base_rep_key.to_owned(),
            checksum: Some(Md5Digest::of(chunk)),
        });
        offset = end;
        if offset >= contents.len() {
            break;
        }
    }

    let rep = Representation {
        txn_id: txn_id.to_owned(),
        checksum: Some(Md5Digest::of(contents)),
        contents: RepContents::Delta { windows },
    };
    reps_table::new_rep(trail, &rep)
}
