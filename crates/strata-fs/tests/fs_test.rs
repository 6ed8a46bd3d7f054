//! End-to-end repository scenarios, including reopen-after-restart.

use strata_error::StrataError;
use strata_fs::{nodes_table, reps, rev_table, strings_table, txn_table, Filesystem};
use strata_types::{
    Change, ChangeKind, Format, NodeKind, NodeRevId, NodeRevision, TxnState,
};

fn id(s: &str) -> NodeRevId {
    NodeRevId::parse(s.as_bytes()).expect("test id")
}

/// Create a file in a fresh transaction, commit, reopen the repository
/// from disk, and read everything back.
#[test]
fn commit_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().join("repo");

    let (txn_id, file_id, rep_key) = {
        let fs = Filesystem::create(&repo_path, Format::latest()).unwrap();

        let txn_id = fs.begin_txn().unwrap();
        let base = fs
            .with_trail(|trail| {
                let txn = txn_table::get_txn(trail, fs.format(), &txn_id)?;
                match txn.state {
                    TxnState::Active { base_id } => Ok(base_id),
                    _ => unreachable!("fresh transaction is active"),
                }
            })
            .unwrap();
        assert_eq!(base, id("1.1"));

        // The first node after the root gets node number 2.
        let (file_id, rep_key) = fs
            .with_trail(|trail| {
                let rep_key = reps::write_fulltext(trail, &txn_id, b"file contents")?;
                let mut file = NodeRevision::new(NodeKind::File, "/greeting");
                file.data_key = rep_key.clone();
                let file_id = nodes_table::new_node_id(trail)?;
                nodes_table::put_node_rev(trail, fs.format(), &file_id, &file)?;
                Ok((file_id, rep_key))
            })
            .unwrap();
        assert_eq!(file_id, id("2.1"));
        assert_eq!(rep_key, "r1");
        // The fulltext landed under the first allocated string key.
        let rep = fs
            .with_trail(|trail| strata_fs::reps_table::get_rep(trail, &rep_key))
            .unwrap();
        match rep.contents {
            strata_types::RepContents::Fulltext { ref string_key } => {
                assert_eq!(string_key, "s1");
            }
            _ => unreachable!("write_fulltext stores fulltext"),
        }

        let rev = fs.commit_txn(&txn_id).unwrap();
        assert_eq!(rev, 1);
        (txn_id, file_id, rep_key)
    };

    // A fresh process: reopen from disk.
    let fs = Filesystem::open(&repo_path).unwrap();
    assert_eq!(fs.youngest_revision().unwrap(), 1);

    let file = fs.get_node_revision(&file_id).unwrap();
    assert_eq!(file.kind, NodeKind::File);
    assert_eq!(file.created_path, "/greeting");
    assert_eq!(file.data_key, rep_key);
    assert_eq!(fs.read_representation(&rep_key).unwrap(), b"file contents");

    // The committing transaction is permanent history now.
    let txn = fs
        .with_trail(|trail| txn_table::get_txn(trail, fs.format(), &txn_id))
        .unwrap();
    assert_eq!(txn.state, TxnState::Committed { revision: 1 });
}

/// A trail body that fails after writing to several tables leaves no
/// trace in any of them.
#[test]
fn failed_trail_leaves_no_partial_state() {
    let dir = tempfile::tempdir().unwrap();
    let fs = Filesystem::create(&dir.path().join("repo"), Format::latest()).unwrap();

    let result = fs.with_trail(|trail| {
        strings_table::new_string(trail, b"doomed")?;
        let mut file = NodeRevision::new(NodeKind::File, "/doomed");
        file.data_key = String::new();
        nodes_table::put_node_rev(trail, fs.format(), &id("2.1"), &file)?;
        rev_table::put_rev(
            trail,
            &strata_types::Revision::Indirect {
                txn_id: "t9".to_owned(),
            },
        )?;
        Err::<(), _>(StrataError::CorruptNodesKey)
    });
    assert!(matches!(result, Err(StrataError::CorruptNodesKey)));

    assert_eq!(fs.youngest_revision().unwrap(), 0);
    assert!(matches!(
        fs.get_node_revision(&id("2.1")),
        Err(StrataError::DanglingId { .. })
    ));
    let strings: i64 = fs
        .with_trail(|trail| {
            let n = trail.db().query_row(
                "SELECT COUNT(*) FROM strings",
                [],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .unwrap();
    assert_eq!(strings, 0);
}

/// Successive edits of one file: linear successors while free, branches
/// once the linear slot is taken, across commits.
#[test]
fn successor_allocation_over_history() {
    let dir = tempfile::tempdir().unwrap();
    let fs = Filesystem::create(&dir.path().join("repo"), Format::latest()).unwrap();

    let txn_id = fs.begin_txn().unwrap();
    let v1 = fs
        .create_node(&NodeRevision::new(NodeKind::File, "/f"))
        .unwrap();
    assert_eq!(v1, id("2.1"));

    let mut edit = NodeRevision::new(NodeKind::File, "/f");
    edit.predecessor_id = Some(v1.clone());
    edit.predecessor_count = Some(1);
    let v2 = fs.create_successor(&v1, &edit).unwrap();
    assert_eq!(v2, id("2.2"));

    // The linear successor of v1 is now taken: the next successor of v1
    // must branch, and the one after that takes the next branch number.
    let b1 = fs.create_successor(&v1, &edit).unwrap();
    assert_eq!(b1, id("2.1.1.1"));
    let b2 = fs.create_successor(&v1, &edit).unwrap();
    assert_eq!(b2, id("2.1.2.1"));

    fs.commit_txn(&txn_id).unwrap();

    // Allocation state survives a reopen.
    drop(fs);
    let fs = Filesystem::open(&dir.path().join("repo")).unwrap();
    let b3 = fs.create_successor(&v1, &edit).unwrap();
    assert_eq!(b3, id("2.1.3.1"));
    let fresh = fs
        .create_node(&NodeRevision::new(NodeKind::File, "/g"))
        .unwrap();
    assert_eq!(fresh, id("3.1"));
}

/// Delta chains reconstruct across process restarts, and corruption in
/// the middle of a chain is caught by checksums.
#[test]
fn delta_chains_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().join("repo");

    let (v1, v2, v3) = {
        let fs = Filesystem::create(&repo_path, Format::latest()).unwrap();
        let txn_id = fs.begin_txn().unwrap();
        let v1 = fs.write_fulltext(&txn_id, b"one two three four").unwrap();
        let v2 = fs.write_delta(&txn_id, &v1, b"one 2 three four").unwrap();
        let v3 = fs.write_delta(&txn_id, &v2, b"one 2 three 4 five").unwrap();
        fs.commit_txn(&txn_id).unwrap();
        (v1, v2, v3)
    };

    let fs = Filesystem::open(&repo_path).unwrap();
    assert_eq!(fs.read_representation(&v3).unwrap(), b"one 2 three 4 five");
    assert_eq!(fs.read_representation(&v2).unwrap(), b"one 2 three four");

    // Corrupt the base fulltext: every chain through it must now fail
    // checksum verification rather than return wrong bytes.
    fs.with_trail(|trail| {
        let rep = strata_fs::reps_table::get_rep(trail, &v1)?;
        let string_key = match rep.contents {
            strata_types::RepContents::Fulltext { string_key } => string_key,
            _ => unreachable!("v1 is fulltext"),
        };
        strings_table::write_string(trail, &string_key, b"one twX three four")
    })
    .unwrap();

    assert!(matches!(
        fs.read_representation(&v1),
        Err(StrataError::ChecksumMismatch { .. })
    ));
    assert!(matches!(
        fs.read_representation(&v3),
        Err(StrataError::ChecksumMismatch { .. })
    ));
}

/// The folded change list drives what a commit reports.
#[test]
fn changes_fold_through_the_api() {
    let dir = tempfile::tempdir().unwrap();
    let fs = Filesystem::create(&dir.path().join("repo"), Format::latest()).unwrap();
    let txn_id = fs.begin_txn().unwrap();

    let change = |path: &str, node: &str, kind, text: bool| Change {
        path: path.to_owned(),
        noderev_id: Some(id(node)),
        kind,
        text_mod: text,
        prop_mod: false,
    };
    fs.add_change(&txn_id, &change("/a", "2.1", ChangeKind::Add, true)).unwrap();
    fs.add_change(&txn_id, &change("/a", "2.1", ChangeKind::Modify, true)).unwrap();
    fs.add_change(&txn_id, &change("/b", "3.1", ChangeKind::Add, false)).unwrap();
    fs.add_change(&txn_id, &change("/b", "3.1", ChangeKind::Delete, false)).unwrap();

    let folded = fs.paths_changed(&txn_id).unwrap();
    assert_eq!(folded.len(), 1);
    assert_eq!(folded["/a"].kind, ChangeKind::Add);
    assert!(folded["/a"].text_mod);
}

/// Multiple transactions get distinct names and commit distinct
/// revisions in order.
#[test]
fn interleaved_transactions() {
    let dir = tempfile::tempdir().unwrap();
    let fs = Filesystem::create(&dir.path().join("repo"), Format::latest()).unwrap();

    let t_a = fs.begin_txn().unwrap();
    let t_b = fs.begin_txn().unwrap();
    assert_ne!(t_a, t_b);

    let mut listed = fs.list_transactions().unwrap();
    listed.sort();
    let mut expected = vec![t_a.clone(), t_b.clone()];
    expected.sort();
    assert_eq!(listed, expected);

    assert_eq!(fs.commit_txn(&t_b).unwrap(), 1);
    assert_eq!(fs.commit_txn(&t_a).unwrap(), 2);
    assert!(fs.list_transactions().unwrap().is_empty());
}
