use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for strata filesystem operations.
///
/// Structured variants for the failure classes the storage engine can
/// actually produce, with a transiency classifier that drives the trail
/// retry loop: only store-level contention is ever retried, everything
/// else propagates to the caller.
#[derive(Error, Debug)]
pub enum StrataError {
    // === Repository lifecycle ===
    /// Repository directory not found.
    #[error("repository not found: '{path}'")]
    RepositoryNotFound { path: PathBuf },

    /// Repository already exists at the target path.
    #[error("repository already exists: '{path}'")]
    RepositoryExists { path: PathBuf },

    /// The format sidecar names a schema version this build does not know.
    #[error("unsupported filesystem format {version}")]
    UnsupportedFormat { version: u32 },

    // === Skeleton / record corruption ===
    /// A byte string failed to parse or validate as the named record kind.
    #[error("malformed {kind} skeleton")]
    MalformedSkel { kind: &'static str },

    /// A key in the nodes table does not encode a node-revision ID.
    #[error("corrupt key in nodes table")]
    CorruptNodesKey,

    /// A revision record is structurally present but unusable.
    #[error("corrupt filesystem revision {revision}")]
    CorruptFsRevision { revision: u64 },

    /// A transaction record is structurally present but unusable.
    #[error("corrupt transaction '{txn_id}'")]
    CorruptTransaction { txn_id: String },

    /// The change rows for a transaction violate the ordering rules.
    #[error("corrupt change list for transaction '{txn_id}': {detail}")]
    CorruptChanges { txn_id: String, detail: String },

    // === Dangling references ===
    /// A node-revision ID is absent from the nodes table.
    #[error("reference to non-existent node '{id}'")]
    DanglingId { id: String },

    /// A revision number is absent from the revisions table.
    #[error("reference to non-existent revision {revision}")]
    DanglingRevision { revision: u64 },

    /// A transaction name is absent from the transactions table.
    #[error("no transaction named '{txn_id}'")]
    DanglingTransaction { txn_id: String },

    /// A copy ID is absent from the copies table.
    #[error("reference to non-existent copy '{copy_id}'")]
    DanglingCopy { copy_id: String },

    /// A representation key is absent from the representations table.
    #[error("reference to non-existent representation '{key}'")]
    DanglingRepresentation { key: String },

    /// A string key is absent from the strings table.
    #[error("reference to non-existent string '{key}'")]
    DanglingString { key: String },

    // === Usage errors ===
    /// Attempted mutation of a transaction that has already been committed.
    #[error("cannot modify transaction '{txn_id}': already committed")]
    TransactionNotMutable { txn_id: String },

    /// A successor ID probe landed on an ID that is already occupied.
    #[error("successor id '{id}' already exists")]
    IdAlreadyExists { id: String },

    // === Content reconstruction ===
    /// Reconstructed content does not match its recorded checksum.
    #[error("checksum mismatch on representation '{key}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// A delta chain exceeded the resolution depth bound (cycle suspected).
    #[error("delta chain too deep resolving representation '{key}' (depth {depth})")]
    DeltaChainTooDeep { key: String, depth: usize },

    /// A delta payload is structurally invalid.
    #[error("invalid delta payload: {detail}")]
    InvalidDelta { detail: String },

    // === Locks ===
    /// No lock is held on the path.
    #[error("no lock on path '{path}'")]
    NoSuchLock { path: String },

    /// The lock on the path has expired.
    #[error("lock on path '{path}' has expired")]
    LockExpired { path: String },

    /// The supplied token does not match the lock on the path.
    #[error("bad lock token for path '{path}'")]
    BadLockToken { path: String },

    // === Trail / store ===
    /// The trail retry bound was reached without a successful commit.
    #[error("transaction retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// Underlying embedded store error.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format sidecar (de)serialization error.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl StrataError {
    /// Create a malformed-skeleton error for the named record kind.
    pub const fn malformed(kind: &'static str) -> Self {
        Self::MalformedSkel { kind }
    }

    /// Create a dangling-node error from a rendered ID.
    pub fn dangling_id(id: impl Into<String>) -> Self {
        Self::DanglingId { id: id.into() }
    }

    /// Create a corrupt-transaction error.
    pub fn corrupt_txn(txn_id: impl Into<String>) -> Self {
        Self::CorruptTransaction {
            txn_id: txn_id.into(),
        }
    }

    /// Whether this error is a store contention signal that a trail may
    /// retry. Everything else is terminal for the calling operation.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Whether this error indicates on-disk corruption (as opposed to a
    /// usage error or contention).
    pub const fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::MalformedSkel { .. }
                | Self::CorruptNodesKey
                | Self::CorruptFsRevision { .. }
                | Self::CorruptTransaction { .. }
                | Self::CorruptChanges { .. }
                | Self::ChecksumMismatch { .. }
        )
    }
}

/// Result type alias using `StrataError`.
pub type Result<T> = std::result::Result<T, StrataError>;
