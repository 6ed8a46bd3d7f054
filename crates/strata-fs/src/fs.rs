//! The repository: lifecycle and the public operation surface.
//!
//! A repository is a directory holding the embedded store plus a format
//! sidecar naming its schema generation. Every operation below runs in
//! its own trail; callers needing multi-operation atomicity compose the
//! table-manager functions inside one [`Filesystem::with_trail`] body.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use strata_error::{Result, StrataError};
use strata_skel::Skel;
use strata_store::{Store, StoreOptions, Trail};
use strata_types::{
    marshal, Change, Copy, Entries, Format, Lock, NodeKind, NodeRevId, NodeRevision, PathChange,
    Proplist, Revision, Transaction, TxnState,
};
use tracing::info;

use crate::{
    changes_table, copies_table, locks_table, nodes_table, reps, rev_table, txn_table,
};

/// Store file inside a repository directory.
pub const STORE_FILE: &str = "store.db";
/// Format sidecar inside a repository directory.
pub const FORMAT_FILE: &str = "format.json";

/// ID of the root directory's first revision, created with the
/// repository and present ever after.
const ROOT_NODE_ID: &[u8] = b"1.1";

/// An open repository.
pub struct Filesystem {
    store: Store,
    format: Format,
    path: PathBuf,
}

impl Filesystem {
    /// Create a repository at `path`: an empty root directory, the
    /// initial committed transaction, and revision 0.
    pub fn create(path: &Path, format: Format) -> Result<Filesystem> {
        if path.join(FORMAT_FILE).exists() {
            return Err(StrataError::RepositoryExists {
                path: path.to_owned(),
            });
        }
        std::fs::create_dir_all(path)?;
        std::fs::write(path.join(FORMAT_FILE), serde_json::to_vec_pretty(&format)?)?;

        let store = Store::create(&path.join(STORE_FILE), StoreOptions::default())?;
        let filesystem = Filesystem {
            store,
            format,
            path: path.to_owned(),
        };

        filesystem.with_trail(|trail| {
            let root_id = NodeRevId::parse(ROOT_NODE_ID).expect("root id literal");
            let root = NodeRevision::new(NodeKind::Dir, "/");
            nodes_table::put_node_rev(trail, format, &root_id, &root)?;

            if format.indirect_revisions() {
                let txn_id = txn_table::create_txn(trail, format, &root_id)?;
                let mut txn = txn_table::get_txn(trail, format, &txn_id)?;
                txn.state = TxnState::Committed { revision: 0 };
                txn_table::put_txn(trail, format, &txn_id, &txn)?;
                rev_table::put_rev(trail, &Revision::Indirect { txn_id })?;
            } else {
                rev_table::put_rev(
                    trail,
                    &Revision::Direct {
                        root_id,
                        props: Proplist::new(),
                    },
                )?;
            }
            Ok(())
        })?;

        info!(path = %path.display(), version = format.version(), "created repository");
        Ok(filesystem)
    }

    /// Open the repository at `path`.
    pub fn open(path: &Path) -> Result<Filesystem> {
        let format_bytes = std::fs::read(path.join(FORMAT_FILE)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StrataError::RepositoryNotFound {
                    path: path.to_owned(),
                }
            } else {
                e.into()
            }
        })?;
        let raw: Format = serde_json::from_slice(&format_bytes)?;
        let format = Format::new(raw.version())?;

        let store_path = path.join(STORE_FILE);
        if !store_path.exists() {
            return Err(StrataError::RepositoryNotFound {
                path: path.to_owned(),
            });
        }
        let store = Store::open(&store_path, StoreOptions::default())?;

        info!(path = %path.display(), version = format.version(), "opened repository");
        Ok(Filesystem {
            store,
            format,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Run `body` in one trail against this repository's store.
    pub fn with_trail<T>(&self, body: impl FnMut(&Trail) -> Result<T>) -> Result<T> {
        self.store.with_trail(body)
    }

    // -----------------------------------------------------------------
    // Revisions
    // -----------------------------------------------------------------

    pub fn youngest_revision(&self) -> Result<u64> {
        self.with_trail(rev_table::youngest_rev)
    }

    /// Root node-revision ID of revision `rev`.
    pub fn revision_root(&self, rev: u64) -> Result<NodeRevId> {
        self.with_trail(|trail| self.rev_root_in(trail, rev))
    }

    fn rev_root_in(&self, trail: &Trail, rev: u64) -> Result<NodeRevId> {
        match rev_table::get_rev(trail, rev)? {
            Revision::Direct { root_id, .. } => Ok(root_id),
            Revision::Indirect { txn_id } => {
                Ok(self.committed_txn_in(trail, rev, &txn_id)?.root_id)
            }
        }
    }

    /// Fetch the committing transaction behind an indirect revision,
    /// insisting it really committed as `rev`.
    fn committed_txn_in(&self, trail: &Trail, rev: u64, txn_id: &str) -> Result<Transaction> {
        let txn = txn_table::get_txn(trail, self.format, txn_id)?;
        match txn.state {
            TxnState::Committed { revision } if revision == rev => Ok(txn),
            _ => Err(StrataError::corrupt_txn(txn_id)),
        }
    }

    pub fn revision_proplist(&self, rev: u64) -> Result<Proplist> {
        self.with_trail(|trail| match rev_table::get_rev(trail, rev)? {
            Revision::Direct { props, .. } => Ok(props),
            Revision::Indirect { txn_id } => {
                Ok(self.committed_txn_in(trail, rev, &txn_id)?.props)
            }
        })
    }

    pub fn revision_prop(&self, rev: u64, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.revision_proplist(rev)?.remove(name))
    }

    /// Set (`Some`) or delete (`None`) one revision property.
    ///
    /// This edits committed history and is the only mutation revisions
    /// permit after the fact.
    pub fn change_rev_prop(&self, rev: u64, name: &str, value: Option<&[u8]>) -> Result<()> {
        self.with_trail(|trail| match rev_table::get_rev(trail, rev)? {
            Revision::Direct { root_id, mut props } => {
                match value {
                    Some(value) => {
                        props.insert(name.to_owned(), value.to_vec());
                    }
                    None => {
                        props.remove(name);
                    }
                }
                rev_table::update_rev(trail, rev, &Revision::Direct { root_id, props })
            }
            Revision::Indirect { txn_id } => {
                let mut txn = self.committed_txn_in(trail, rev, &txn_id)?;
                match value {
                    Some(value) => {
                        txn.props.insert(name.to_owned(), value.to_vec());
                    }
                    None => {
                        txn.props.remove(name);
                    }
                }
                txn_table::put_txn(trail, self.format, &txn_id, &txn)
            }
        })
    }

    // -----------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------

    /// Begin a transaction based on the youngest revision; returns its
    /// name.
    pub fn begin_txn(&self) -> Result<String> {
        self.with_trail(|trail| {
            let youngest = rev_table::youngest_rev(trail)?;
            let base_root = self.rev_root_in(trail, youngest)?;
            txn_table::create_txn(trail, self.format, &base_root)
        })
    }

    /// Commit the named transaction, assigning it the next revision
    /// number. Committing anything but an active transaction is refused.
    pub fn commit_txn(&self, txn_id: &str) -> Result<u64> {
        let rev = self.with_trail(|trail| {
            let mut txn = txn_table::get_txn(trail, self.format, txn_id)?;
            if !matches!(txn.state, TxnState::Active { .. }) {
                return Err(StrataError::TransactionNotMutable {
                    txn_id: txn_id.to_owned(),
                });
            }

            let record = if self.format.indirect_revisions() {
                Revision::Indirect {
                    txn_id: txn_id.to_owned(),
                }
            } else {
                Revision::Direct {
                    root_id: txn.root_id.clone(),
                    props: txn.props.clone(),
                }
            };
            let rev = rev_table::put_rev(trail, &record)?;

            txn.state = TxnState::Committed { revision: rev };
            txn_table::put_txn(trail, self.format, txn_id, &txn)?;
            Ok(rev)
        })?;
        info!(txn_id, revision = rev, "committed transaction");
        Ok(rev)
    }

    /// Abort the named transaction: mark it dead, then purge its record,
    /// change rows, and copy records.
    pub fn abort_txn(&self, txn_id: &str) -> Result<()> {
        self.with_trail(|trail| {
            let mut txn = txn_table::get_txn(trail, self.format, txn_id)?;
            let base_id = match txn.state.clone() {
                TxnState::Active { base_id } | TxnState::Dead { base_id } => base_id,
                TxnState::Committed { .. } => {
                    return Err(StrataError::TransactionNotMutable {
                        txn_id: txn_id.to_owned(),
                    })
                }
            };
            txn.state = TxnState::Dead { base_id };
            txn_table::put_txn(trail, self.format, txn_id, &txn)?;

            changes_table::delete_changes(trail, txn_id)?;
            for copy_id in &txn.copies {
                match copies_table::delete_copy(trail, copy_id) {
                    Ok(()) | Err(StrataError::DanglingCopy { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            txn_table::delete_txn(trail, self.format, txn_id)
        })?;
        info!(txn_id, "aborted transaction");
        Ok(())
    }

    /// Names of all uncommitted transactions.
    pub fn list_transactions(&self) -> Result<Vec<String>> {
        self.with_trail(|trail| txn_table::list_active(trail, self.format))
    }

    pub fn txn_proplist(&self, txn_id: &str) -> Result<Proplist> {
        self.with_trail(|trail| Ok(txn_table::get_txn(trail, self.format, txn_id)?.props))
    }

    pub fn txn_prop(&self, txn_id: &str, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.txn_proplist(txn_id)?.remove(name))
    }

    /// Set (`Some`) or delete (`None`) one property on an active
    /// transaction.
    pub fn change_txn_prop(&self, txn_id: &str, name: &str, value: Option<&[u8]>) -> Result<()> {
        self.with_trail(|trail| {
            let mut txn = txn_table::get_txn(trail, self.format, txn_id)?;
            if !matches!(txn.state, TxnState::Active { .. }) {
                return Err(StrataError::TransactionNotMutable {
                    txn_id: txn_id.to_owned(),
                });
            }
            match value {
                Some(value) => {
                    txn.props.insert(name.to_owned(), value.to_vec());
                }
                None => {
                    txn.props.remove(name);
                }
            }
            txn_table::put_txn(trail, self.format, txn_id, &txn)
        })
    }

    // -----------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------

    pub fn get_node_revision(&self, id: &NodeRevId) -> Result<NodeRevision> {
        self.with_trail(|trail| nodes_table::get_node_rev(trail, self.format, id))
    }

    pub fn put_node_revision(&self, id: &NodeRevId, noderev: &NodeRevision) -> Result<()> {
        self.with_trail(|trail| nodes_table::put_node_rev(trail, self.format, id, noderev))
    }

    /// Allocate an ID for an entirely new node and store `noderev` under
    /// it, atomically. Returns the new ID.
    pub fn create_node(&self, noderev: &NodeRevision) -> Result<NodeRevId> {
        self.with_trail(|trail| {
            let id = nodes_table::new_node_id(trail)?;
            nodes_table::put_node_rev(trail, self.format, &id, noderev)?;
            Ok(id)
        })
    }

    /// Allocate the successor ID of `id` (linear or branched) and store
    /// `noderev` under it, atomically. Returns the new ID.
    pub fn create_successor(&self, id: &NodeRevId, noderev: &NodeRevision) -> Result<NodeRevId> {
        self.with_trail(|trail| {
            let successor = nodes_table::new_successor_id(trail, id)?;
            nodes_table::put_node_rev(trail, self.format, &successor, noderev)?;
            Ok(successor)
        })
    }

    pub fn delete_node_revision(&self, id: &NodeRevId) -> Result<()> {
        self.with_trail(|trail| nodes_table::delete_node_rev(trail, id))
    }

    // -----------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------

    /// Full plaintext of the representation under `rep_key`, checksum
    /// verified.
    pub fn read_representation(&self, rep_key: &str) -> Result<Vec<u8>> {
        self.with_trail(|trail| reps::read_rep_contents(trail, rep_key))
    }

    /// Store contents as a fulltext representation; returns its key.
    pub fn write_fulltext(&self, txn_id: &str, contents: &[u8]) -> Result<String> {
        self.with_trail(|trail| reps::write_fulltext(trail, txn_id, contents))
    }

    /// Store contents as a delta representation against `base_rep_key`
    /// (empty for none); returns its key.
    pub fn write_delta(&self, txn_id: &str, base_rep_key: &str, contents: &[u8]) -> Result<String> {
        self.with_trail(|trail| reps::write_delta(trail, txn_id, base_rep_key, contents))
    }

    /// Directory entries of `noderev`. An absent data key is an empty
    /// directory.
    pub fn node_entries(&self, noderev: &NodeRevision) -> Result<Entries> {
        if noderev.data_key.is_empty() {
            return Ok(Entries::new());
        }
        self.with_trail(|trail| {
            let bytes = reps::read_rep_contents(trail, &noderev.data_key)?;
            let skel = Skel::parse(&bytes)?;
            marshal::parse_entries(&skel)
        })
    }

    /// Store a directory's entry list; returns the representation key to
    /// put in its node-revision's data key.
    pub fn write_entries(&self, txn_id: &str, entries: &Entries) -> Result<String> {
        self.with_trail(|trail| {
            let bytes = marshal::unparse_entries(entries).unparse();
            reps::write_fulltext(trail, txn_id, &bytes)
        })
    }

    // -----------------------------------------------------------------
    // Changes, copies, locks
    // -----------------------------------------------------------------

    pub fn add_change(&self, txn_id: &str, change: &Change) -> Result<()> {
        self.with_trail(|trail| changes_table::add_change(trail, txn_id, change))
    }

    /// Folded per-path summary of the named transaction's changes.
    pub fn paths_changed(&self, txn_id: &str) -> Result<BTreeMap<String, PathChange>> {
        self.with_trail(|trail| changes_table::changes_fetch(trail, txn_id))
    }

    /// Record copy provenance and list it on the (active) transaction.
    pub fn create_copy(&self, txn_id: &str, copy: &Copy) -> Result<String> {
        self.with_trail(|trail| {
            let mut txn = txn_table::get_txn(trail, self.format, txn_id)?;
            if !matches!(txn.state, TxnState::Active { .. }) {
                return Err(StrataError::TransactionNotMutable {
                    txn_id: txn_id.to_owned(),
                });
            }
            let copy_id = copies_table::create_copy(trail, copy)?;
            txn.copies.push(copy_id.clone());
            txn_table::put_txn(trail, self.format, txn_id, &txn)?;
            Ok(copy_id)
        })
    }

    pub fn get_copy(&self, copy_id: &str) -> Result<Copy> {
        self.with_trail(|trail| copies_table::get_copy(trail, copy_id))
    }

    pub fn lock(&self, lock: &Lock) -> Result<()> {
        self.with_trail(|trail| locks_table::lock_path(trail, lock))
    }

    pub fn get_lock(&self, path: &str, now: u64) -> Result<Lock> {
        self.with_trail(|trail| locks_table::get_lock(trail, path, now))
    }

    pub fn unlock(&self, path: &str, token: Option<&str>, now: u64) -> Result<()> {
        self.with_trail(|trail| locks_table::unlock_path(trail, path, token, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(format: Format) -> (tempfile::TempDir, Filesystem) {
        let dir = tempfile::tempdir().unwrap();
        let fs = Filesystem::create(&dir.path().join("repo"), format).unwrap();
        (dir, fs)
    }

    #[test]
    fn create_seeds_revision_zero() {
        for version in [1, 2, 3] {
            let (_dir, fs) = scratch(Format::new(version).unwrap());
            assert_eq!(fs.youngest_revision().unwrap(), 0);
            assert_eq!(fs.revision_root(0).unwrap().to_string(), "1.1");
            let root = fs
                .get_node_revision(&NodeRevId::parse(b"1.1").unwrap())
                .unwrap();
            assert_eq!(root.kind, NodeKind::Dir);
            assert_eq!(root.created_path, "/");
            assert!(fs.node_entries(&root).unwrap().is_empty());
        }
    }

    #[test]
    fn create_refuses_existing_repository() {
        let (dir, _fs) = scratch(Format::latest());
        let result = Filesystem::create(&dir.path().join("repo"), Format::latest());
        assert!(matches!(result, Err(StrataError::RepositoryExists { .. })));
    }

    #[test]
    fn open_missing_repository() {
        let dir = tempfile::tempdir().unwrap();
        let result = Filesystem::open(&dir.path().join("nope"));
        assert!(matches!(result, Err(StrataError::RepositoryNotFound { .. })));
    }

    #[test]
    fn txn_lifecycle() {
        let (_dir, fs) = scratch(Format::latest());

        let txn_id = fs.begin_txn().unwrap();
        assert_eq!(fs.list_transactions().unwrap(), [txn_id.clone()]);

        let rev = fs.commit_txn(&txn_id).unwrap();
        assert_eq!(rev, 1);
        assert_eq!(fs.youngest_revision().unwrap(), 1);
        assert!(fs.list_transactions().unwrap().is_empty());

        // A second commit of the same transaction is a usage error.
        assert!(matches!(
            fs.commit_txn(&txn_id),
            Err(StrataError::TransactionNotMutable { .. })
        ));
    }

    #[test]
    fn abort_purges_the_transaction() {
        let (_dir, fs) = scratch(Format::latest());
        let txn_id = fs.begin_txn().unwrap();
        fs.add_change(
            &txn_id,
            &Change {
                path: "/a".to_owned(),
                noderev_id: Some(NodeRevId::parse(b"2.1").unwrap()),
                kind: strata_types::ChangeKind::Add,
                text_mod: true,
                prop_mod: false,
            },
        )
        .unwrap();

        fs.abort_txn(&txn_id).unwrap();
        assert!(fs.list_transactions().unwrap().is_empty());
        assert!(fs.paths_changed(&txn_id).unwrap().is_empty());
        assert!(matches!(
            fs.commit_txn(&txn_id),
            Err(StrataError::DanglingTransaction { .. })
        ));

        // Aborting a committed transaction is refused.
        let committed = fs.begin_txn().unwrap();
        fs.commit_txn(&committed).unwrap();
        assert!(matches!(
            fs.abort_txn(&committed),
            Err(StrataError::TransactionNotMutable { .. })
        ));
    }

    #[test]
    fn revision_props_work_on_both_generations() {
        for version in [1, 3] {
            let (_dir, fs) = scratch(Format::new(version).unwrap());
            let txn_id = fs.begin_txn().unwrap();
            fs.change_txn_prop(&txn_id, "svn:log", Some(b"the change".as_slice())).unwrap();
            let rev = fs.commit_txn(&txn_id).unwrap();

            assert_eq!(
                fs.revision_prop(rev, "svn:log").unwrap(),
                Some(b"the change".to_vec())
            );

            fs.change_rev_prop(rev, "svn:log", Some(b"amended".as_slice())).unwrap();
            assert_eq!(
                fs.revision_prop(rev, "svn:log").unwrap(),
                Some(b"amended".to_vec())
            );

            fs.change_rev_prop(rev, "svn:log", None).unwrap();
            assert_eq!(fs.revision_prop(rev, "svn:log").unwrap(), None);
        }
    }

    #[test]
    fn change_txn_prop_requires_active_txn() {
        let (_dir, fs) = scratch(Format::latest());
        let txn_id = fs.begin_txn().unwrap();
        fs.commit_txn(&txn_id).unwrap();
        assert!(matches!(
            fs.change_txn_prop(&txn_id, "svn:log", Some(b"too late".as_slice())),
            Err(StrataError::TransactionNotMutable { .. })
        ));
    }

    #[test]
    fn copies_are_listed_on_their_txn() {
        let (_dir, fs) = scratch(Format::latest());
        let txn_id = fs.begin_txn().unwrap();
        let copy = Copy {
            kind: strata_types::CopyKind::Real,
            src_path: "/trunk".to_owned(),
            src_txn_id: txn_id.clone(),
            dst_noderev_id: NodeRevId::parse(b"2.1").unwrap(),
        };
        let copy_id = fs.create_copy(&txn_id, &copy).unwrap();
        assert_eq!(fs.get_copy(&copy_id).unwrap(), copy);

        // Abort removes the copy record along with the transaction.
        fs.abort_txn(&txn_id).unwrap();
        assert!(matches!(
            fs.get_copy(&copy_id),
            Err(StrataError::DanglingCopy { .. })
        ));
    }

    #[test]
    fn directory_entries_roundtrip() {
        let (_dir, fs) = scratch(Format::latest());
        let txn_id = fs.begin_txn().unwrap();

        let mut entries = Entries::new();
        entries.insert("a".to_owned(), NodeRevId::parse(b"2.1").unwrap());
        entries.insert("b".to_owned(), NodeRevId::parse(b"3.1").unwrap());
        let data_key = fs.write_entries(&txn_id, &entries).unwrap();

        let mut dir_node = NodeRevision::new(NodeKind::Dir, "/");
        dir_node.data_key = data_key;
        assert_eq!(fs.node_entries(&dir_node).unwrap(), entries);
    }
}
