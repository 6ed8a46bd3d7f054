//! Native record types for the strata filesystem and their skeleton
//! marshalling.
//!
//! Everything the engine persists is a skeleton (see `strata-skel`); this
//! crate owns the conversion between those skeletons and typed records,
//! the structural validators gating both directions, the node-revision
//! identity scheme, and the schema-format configuration that decides which
//! optional record fields exist on disk.

pub mod checksum;
pub mod format;
pub mod id;
pub mod marshal;
pub mod record;
pub mod validate;

pub use checksum::Md5Digest;
pub use format::Format;
pub use id::NodeRevId;
pub use record::{
    Change, ChangeKind, Copy, CopyKind, DeltaWindow, Entries, Lock, MergeinfoHeader, NodeKind,
    NodeRevision, PathChange, Proplist, RepContents, Representation, Revision, Transaction,
    TxnState,
};
