//! Filesystem schema format.
//!
//! The on-disk schema grew optional fields over time (predecessor counts,
//! mergeinfo accounting, indirect revision records). Which generation a
//! repository uses is explicit configuration carried beside the store and
//! threaded through marshalling; it is never inferred from record shapes.

use serde::{Deserialize, Serialize};
use strata_error::{Result, StrataError};

/// Schema generation of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    version: u32,
}

impl Format {
    /// First format storing a predecessor count on node-revisions.
    pub const MIN_PREDECESSOR_COUNT_FORMAT: u32 = 2;
    /// First format storing revision records indirectly (by transaction
    /// name) rather than embedding root ID and properties.
    pub const MIN_INDIRECT_REVISIONS_FORMAT: u32 = 2;
    /// First format storing mergeinfo accounting on node-revisions and the
    /// mergeinfo-delta catalog on transactions.
    pub const MIN_MERGEINFO_FORMAT: u32 = 3;
    /// Newest format this build writes.
    pub const LATEST_FORMAT: u32 = 3;

    /// A format of the given version; versions outside the known range are
    /// `UnsupportedFormat`.
    pub fn new(version: u32) -> Result<Format> {
        if (1..=Self::LATEST_FORMAT).contains(&version) {
            Ok(Format { version })
        } else {
            Err(StrataError::UnsupportedFormat { version })
        }
    }

    /// The newest supported format.
    pub fn latest() -> Format {
        Format {
            version: Self::LATEST_FORMAT,
        }
    }

    pub fn version(self) -> u32 {
        self.version
    }

    pub fn supports_predecessor_count(self) -> bool {
        self.version >= Self::MIN_PREDECESSOR_COUNT_FORMAT
    }

    pub fn supports_mergeinfo(self) -> bool {
        self.version >= Self::MIN_MERGEINFO_FORMAT
    }

    /// Whether revision records reference their committing transaction
    /// instead of embedding root and properties directly.
    pub fn indirect_revisions(self) -> bool {
        self.version >= Self::MIN_INDIRECT_REVISIONS_FORMAT
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::latest()
    }
}
