//! Conversion between native records and skeletons.
//!
//! Every `parse_*` validates the skeleton before reading it, and every
//! `unparse_*` validates what it built before handing it back; a skeleton
//! that never passed its validator never becomes a record, and vice versa.
//! Schema-sensitive records take the repository [`Format`] explicitly.

use strata_error::{Result, StrataError};
use strata_skel::Skel;

use crate::checksum::{Md5Digest, MD5_DIGEST_LEN};
use crate::format::Format;
use crate::id::NodeRevId;
use crate::record::{
    Change, ChangeKind, Copy, CopyKind, DeltaWindow, Entries, Lock, MergeinfoHeader, NodeKind,
    NodeRevision, Proplist, RepContents, Representation, Revision, Transaction, TxnState,
};
use crate::validate;

// ---------------------------------------------------------------------------
// Small helpers
// ---------------------------------------------------------------------------

fn utf8(bytes: &[u8], kind: &'static str) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| StrataError::malformed(kind))
}

fn atom_utf8(skel: &Skel, kind: &'static str) -> Result<String> {
    utf8(skel.atom_bytes().ok_or(StrataError::malformed(kind))?, kind)
}

fn atom_u64(skel: &Skel, kind: &'static str) -> Result<u64> {
    let bytes = skel.atom_bytes().ok_or(StrataError::malformed(kind))?;
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(StrataError::malformed(kind))
}

fn atom_id(skel: &Skel, kind: &'static str) -> Result<NodeRevId> {
    skel.atom_bytes()
        .and_then(NodeRevId::parse)
        .ok_or(StrataError::malformed(kind))
}

fn num_atom(n: u64) -> Skel<'static> {
    Skel::atom_owned(n.to_string().into_bytes())
}

fn id_atom(id: &NodeRevId) -> Skel<'static> {
    Skel::atom_owned(id.to_string().into_bytes())
}

fn checksum_skel(digest: &Md5Digest) -> Skel<'_> {
    Skel::list(vec![Skel::str_atom("md5"), Skel::atom(digest.as_bytes())])
}

fn parse_checksum(skel: &Skel) -> Result<Md5Digest> {
    if !validate::is_valid_checksum(skel) {
        return Err(StrataError::malformed("checksum"));
    }
    let digest = skel.children().expect("validated list")[1]
        .atom_bytes()
        .expect("validated atom");
    if digest.len() != MD5_DIGEST_LEN {
        return Err(StrataError::malformed("checksum"));
    }
    Ok(Md5Digest::from_bytes(digest).expect("length checked"))
}

// ---------------------------------------------------------------------------
// Proplists
// ---------------------------------------------------------------------------

pub fn parse_proplist(skel: &Skel) -> Result<Proplist> {
    if !validate::is_valid_proplist(skel) {
        return Err(StrataError::malformed("proplist"));
    }
    let children = skel.children().expect("validated list");
    let mut props = Proplist::new();
    for pair in children.chunks(2) {
        let name = atom_utf8(&pair[0], "proplist")?;
        let value = pair[1].atom_bytes().expect("validated atom").to_vec();
        props.insert(name, value);
    }
    Ok(props)
}

pub fn unparse_proplist(props: &Proplist) -> Skel<'_> {
    let mut skel = Skel::empty_list();
    for (name, value) in props {
        skel.push(Skel::str_atom(name));
        skel.push(Skel::atom(value));
    }
    skel
}

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

pub fn parse_revision(skel: &Skel) -> Result<Revision> {
    if !validate::is_valid_revision(skel) {
        return Err(StrataError::malformed("revision"));
    }
    match skel.children().expect("validated list") {
        [_, txn] => Ok(Revision::Indirect {
            txn_id: atom_utf8(txn, "revision")?,
        }),
        [_, id, props] => Ok(Revision::Direct {
            root_id: atom_id(id, "revision")?,
            props: parse_proplist(props)?,
        }),
        _ => unreachable!("validated shape"),
    }
}

pub fn unparse_revision(revision: &Revision) -> Result<Skel<'_>> {
    let skel = match revision {
        Revision::Indirect { txn_id } => Skel::list(vec![
            Skel::str_atom("revision"),
            Skel::str_atom(txn_id),
        ]),
        Revision::Direct { root_id, props } => Skel::list(vec![
            Skel::str_atom("revision"),
            id_atom(root_id),
            unparse_proplist(props),
        ]),
    };
    if !validate::is_valid_revision(&skel) {
        return Err(StrataError::malformed("revision"));
    }
    Ok(skel)
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

pub fn parse_transaction(skel: &Skel, format: Format) -> Result<Transaction> {
    if !validate::is_valid_transaction(skel) {
        return Err(StrataError::malformed("transaction"));
    }
    let children = skel.children().expect("validated list");
    let root_id = atom_id(&children[1], "transaction")?;

    let state = if children[0].matches_atom("committed") {
        TxnState::Committed {
            revision: atom_u64(&children[2], "transaction")?,
        }
    } else {
        let base_id = atom_id(&children[2], "transaction")?;
        if children[0].matches_atom("dead") {
            TxnState::Dead { base_id }
        } else {
            TxnState::Active { base_id }
        }
    };

    let props = parse_proplist(&children[3])?;

    let mut copies = Vec::new();
    for copy in children[4].children().expect("validated list") {
        copies.push(atom_utf8(copy, "transaction")?);
    }

    let merges_skel = children[5].children().expect("validated list");
    let merges = match merges_skel {
        [] => Default::default(),
        [catalog] => {
            if !format.supports_mergeinfo() {
                return Err(StrataError::malformed("transaction"));
            }
            let bytes = catalog
                .atom_bytes()
                .ok_or(StrataError::malformed("transaction"))?;
            let inner = Skel::parse(bytes)
                .map_err(|_| StrataError::malformed("transaction"))?;
            parse_proplist(&inner)
                .map_err(|_| StrataError::malformed("transaction"))?
                .into_iter()
                .collect()
        }
        _ => return Err(StrataError::malformed("transaction")),
    };

    Ok(Transaction {
        root_id,
        state,
        props,
        copies,
        merges,
    })
}

pub fn unparse_transaction(txn: &Transaction, format: Format) -> Result<Skel<'_>> {
    let base_or_rev = match &txn.state {
        TxnState::Committed { revision } => num_atom(*revision),
        TxnState::Active { base_id } | TxnState::Dead { base_id } => id_atom(base_id),
    };

    let mut copies = Skel::empty_list();
    for copy in &txn.copies {
        copies.push(Skel::str_atom(copy));
    }

    let merges = if txn.merges.is_empty() {
        Skel::empty_list()
    } else {
        if !format.supports_mergeinfo() {
            return Err(StrataError::malformed("transaction"));
        }
        let mut catalog = Skel::empty_list();
        for (target, delta) in &txn.merges {
            catalog.push(Skel::str_atom(target));
            catalog.push(Skel::atom(delta));
        }
        Skel::list(vec![Skel::atom_owned(catalog.unparse())])
    };

    let skel = Skel::list(vec![
        Skel::str_atom(txn.kind_tag()),
        id_atom(&txn.root_id),
        base_or_rev,
        unparse_proplist(&txn.props),
        copies,
        merges,
    ]);
    if !validate::is_valid_transaction(&skel) {
        return Err(StrataError::malformed("transaction"));
    }
    Ok(skel)
}

// ---------------------------------------------------------------------------
// Representations
// ---------------------------------------------------------------------------

pub fn parse_representation(skel: &Skel) -> Result<Representation> {
    if !validate::is_valid_representation(skel) {
        return Err(StrataError::malformed("representation"));
    }
    let children = skel.children().expect("validated list");
    let header = children[0].children().expect("validated list");
    let txn_id = atom_utf8(&header[1], "representation")?;
    let checksum = match header.get(2) {
        Some(sum) => Some(parse_checksum(sum)?),
        None => None,
    };

    let contents = if header[0].matches_atom("fulltext") {
        RepContents::Fulltext {
            string_key: atom_utf8(&children[1], "representation")?,
        }
    } else {
        let mut windows = Vec::with_capacity(children.len() - 1);
        for chunk in &children[1..] {
            let chunk_children = chunk.children().expect("validated list");
            let offset = atom_u64(&chunk_children[0], "representation")?;
            let window = chunk_children[1].children().expect("validated list");
            let diff = window[0].children().expect("validated list");
            let version = atom_u64(&diff[1], "representation")? as u8;
            let string_key = atom_utf8(&diff[2], "representation")?;
            let size = atom_u64(&window[1], "representation")?;
            let rep_key = atom_utf8(&window[2], "representation")?;
            let checksum = match window.get(3) {
                Some(sum) => Some(parse_checksum(sum)?),
                None => None,
            };
            windows.push(DeltaWindow {
                offset,
                version,
                string_key,
                size,
                rep_key,
                checksum,
            });
        }
        RepContents::Delta { windows }
    };

    Ok(Representation {
        txn_id,
        checksum,
        contents,
    })
}

pub fn unparse_representation(rep: &Representation) -> Result<Skel<'_>> {
    let mut header = vec![Skel::str_atom(rep.kind_tag()), Skel::str_atom(&rep.txn_id)];
    if let Some(sum) = &rep.checksum {
        header.push(checksum_skel(sum));
    }

    let mut children = vec![Skel::list(header)];
    match &rep.contents {
        RepContents::Fulltext { string_key } => {
            children.push(Skel::str_atom(string_key));
        }
        RepContents::Delta { windows } => {
            for w in windows {
                let diff = Skel::list(vec![
                    Skel::str_atom("svndiff"),
                    num_atom(u64::from(w.version)),
                    Skel::str_atom(&w.string_key),
                ]);
                let mut window = vec![diff, num_atom(w.size), Skel::str_atom(&w.rep_key)];
                if let Some(sum) = &w.checksum {
                    window.push(checksum_skel(sum));
                }
                children.push(Skel::list(vec![num_atom(w.offset), Skel::list(window)]));
            }
        }
    }

    let skel = Skel::list(children);
    if !validate::is_valid_representation(&skel) {
        return Err(StrataError::malformed("representation"));
    }
    Ok(skel)
}

// ---------------------------------------------------------------------------
// Node-revisions
// ---------------------------------------------------------------------------

pub fn parse_node_revision(skel: &Skel, format: Format) -> Result<NodeRevision> {
    if !validate::is_valid_node_revision(skel) {
        return Err(StrataError::malformed("node-revision"));
    }
    let children = skel.children().expect("validated list");
    let header = children[0].children().expect("validated list");

    let kind = if header[0].matches_atom("dir") {
        NodeKind::Dir
    } else {
        NodeKind::File
    };
    let created_path = atom_utf8(&header[1], "node-revision")?;

    let predecessor_id = match header.get(2) {
        Some(pred) => {
            let bytes = pred.atom_bytes().expect("validated atom");
            if bytes.is_empty() {
                None
            } else {
                Some(atom_id(pred, "node-revision")?)
            }
        }
        None => None,
    };

    let predecessor_count = match header.get(3) {
        Some(count) => {
            if !format.supports_predecessor_count() {
                return Err(StrataError::malformed("node-revision"));
            }
            let bytes = count.atom_bytes().expect("validated atom");
            if bytes.is_empty() {
                None
            } else {
                Some(atom_u64(count, "node-revision")?)
            }
        }
        None => None,
    };

    let mergeinfo = if header.len() == 6 {
        if !format.supports_mergeinfo() {
            return Err(StrataError::malformed("node-revision"));
        }
        Some(MergeinfoHeader {
            has_mergeinfo: atom_u64(&header[4], "node-revision")? != 0,
            count: atom_u64(&header[5], "node-revision")?,
        })
    } else {
        None
    };

    let prop_key = atom_utf8(&children[1], "node-revision")?;
    let data_key = atom_utf8(&children[2], "node-revision")?;
    let edit_key = match children.get(3) {
        Some(edit) => atom_utf8(edit, "node-revision")?,
        None => String::new(),
    };

    Ok(NodeRevision {
        kind,
        created_path,
        predecessor_id,
        predecessor_count,
        mergeinfo,
        prop_key,
        data_key,
        edit_key,
    })
}

pub fn unparse_node_revision(noderev: &NodeRevision, format: Format) -> Result<Skel<'_>> {
    if noderev.predecessor_count.is_some() && !format.supports_predecessor_count() {
        return Err(StrataError::malformed("node-revision"));
    }
    if noderev.mergeinfo.is_some() && !format.supports_mergeinfo() {
        return Err(StrataError::malformed("node-revision"));
    }
    if noderev.kind == NodeKind::Dir && !noderev.edit_key.is_empty() {
        return Err(StrataError::malformed("node-revision"));
    }

    let mut header = vec![
        Skel::str_atom(noderev.kind.tag()),
        Skel::str_atom(&noderev.created_path),
    ];
    let pred_atom = match &noderev.predecessor_id {
        Some(id) => id_atom(id),
        None => Skel::atom(b""),
    };
    if format.supports_mergeinfo() {
        // Mergeinfo formats always carry the full six-slot header, padding
        // absent middle fields with empty atoms.
        header.push(pred_atom);
        header.push(match noderev.predecessor_count {
            Some(count) => num_atom(count),
            None => Skel::atom(b""),
        });
        let mergeinfo = noderev.mergeinfo.unwrap_or(MergeinfoHeader {
            has_mergeinfo: false,
            count: 0,
        });
        header.push(Skel::str_atom(if mergeinfo.has_mergeinfo { "1" } else { "0" }));
        header.push(num_atom(mergeinfo.count));
    } else {
        header.push(pred_atom);
        if let Some(count) = noderev.predecessor_count {
            header.push(num_atom(count));
        }
    }

    let mut children = vec![
        Skel::list(header),
        Skel::str_atom(&noderev.prop_key),
        Skel::str_atom(&noderev.data_key),
    ];
    if !noderev.edit_key.is_empty() {
        children.push(Skel::str_atom(&noderev.edit_key));
    }

    let skel = Skel::list(children);
    if !validate::is_valid_node_revision(&skel) {
        return Err(StrataError::malformed("node-revision"));
    }
    Ok(skel)
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

pub fn parse_entries(skel: &Skel) -> Result<Entries> {
    if !validate::is_valid_entries(skel) {
        return Err(StrataError::malformed("entries"));
    }
    let mut entries = Entries::new();
    for entry in skel.children().expect("validated list") {
        let pair = entry.children().expect("validated list");
        let name = atom_utf8(&pair[0], "entries")?;
        let id = atom_id(&pair[1], "entries")?;
        entries.insert(name, id);
    }
    Ok(entries)
}

pub fn unparse_entries(entries: &Entries) -> Skel<'_> {
    let mut skel = Skel::empty_list();
    for (name, id) in entries {
        skel.push(Skel::list(vec![Skel::str_atom(name), id_atom(id)]));
    }
    skel
}

// ---------------------------------------------------------------------------
// Copies
// ---------------------------------------------------------------------------

pub fn parse_copy(skel: &Skel) -> Result<Copy> {
    if !validate::is_valid_copy(skel) {
        return Err(StrataError::malformed("copy"));
    }
    let children = skel.children().expect("validated list");
    let kind = if children[0].matches_atom("soft-copy") {
        CopyKind::Soft
    } else {
        CopyKind::Real
    };
    Ok(Copy {
        kind,
        src_path: atom_utf8(&children[1], "copy")?,
        src_txn_id: atom_utf8(&children[2], "copy")?,
        dst_noderev_id: atom_id(&children[3], "copy")?,
    })
}

pub fn unparse_copy(copy: &Copy) -> Result<Skel<'_>> {
    let skel = Skel::list(vec![
        Skel::str_atom(copy.kind.tag()),
        Skel::str_atom(&copy.src_path),
        Skel::str_atom(&copy.src_txn_id),
        id_atom(&copy.dst_noderev_id),
    ]);
    if !validate::is_valid_copy(&skel) {
        return Err(StrataError::malformed("copy"));
    }
    Ok(skel)
}

// ---------------------------------------------------------------------------
// Changes
// ---------------------------------------------------------------------------

pub fn parse_change(skel: &Skel) -> Result<Change> {
    if !validate::is_valid_change(skel) {
        return Err(StrataError::malformed("change"));
    }
    let children = skel.children().expect("validated list");
    let path = atom_utf8(&children[1], "change")?;
    let id_bytes = children[2].atom_bytes().expect("validated atom");
    let noderev_id = if id_bytes.is_empty() {
        None
    } else {
        Some(atom_id(&children[2], "change")?)
    };
    let kind = children[3]
        .atom_bytes()
        .and_then(ChangeKind::from_tag)
        .expect("validated kind");
    let text_mod = !children[4].atom_bytes().expect("validated atom").is_empty();
    let prop_mod = !children[5].atom_bytes().expect("validated atom").is_empty();
    Ok(Change {
        path,
        noderev_id,
        kind,
        text_mod,
        prop_mod,
    })
}

pub fn unparse_change(change: &Change) -> Result<Skel<'_>> {
    let flag = |on: bool| {
        if on {
            Skel::str_atom("1")
        } else {
            Skel::atom(b"")
        }
    };
    let skel = Skel::list(vec![
        Skel::str_atom("change"),
        Skel::str_atom(&change.path),
        match &change.noderev_id {
            Some(id) => id_atom(id),
            None => Skel::atom(b""),
        },
        Skel::str_atom(change.kind.tag()),
        flag(change.text_mod),
        flag(change.prop_mod),
    ]);
    if !validate::is_valid_change(&skel) {
        return Err(StrataError::malformed("change"));
    }
    Ok(skel)
}

// ---------------------------------------------------------------------------
// Locks
// ---------------------------------------------------------------------------

pub fn parse_lock(skel: &Skel) -> Result<Lock> {
    if !validate::is_valid_lock(skel) {
        return Err(StrataError::malformed("lock"));
    }
    let children = skel.children().expect("validated list");
    let comment_bytes = children[4].atom_bytes().expect("validated atom");
    let comment = if comment_bytes.is_empty() {
        None
    } else {
        Some(utf8(comment_bytes, "lock")?)
    };
    let expiration_bytes = children[7].atom_bytes().expect("validated atom");
    let expiration_date = if expiration_bytes.is_empty() {
        None
    } else {
        Some(atom_u64(&children[7], "lock")?)
    };
    Ok(Lock {
        path: atom_utf8(&children[1], "lock")?,
        token: atom_utf8(&children[2], "lock")?,
        owner: atom_utf8(&children[3], "lock")?,
        comment,
        is_dav_comment: children[5].matches_atom("1"),
        creation_date: atom_u64(&children[6], "lock")?,
        expiration_date,
    })
}

pub fn unparse_lock(lock: &Lock) -> Result<Skel<'_>> {
    let skel = Skel::list(vec![
        Skel::str_atom("lock"),
        Skel::str_atom(&lock.path),
        Skel::str_atom(&lock.token),
        Skel::str_atom(&lock.owner),
        match &lock.comment {
            Some(comment) => Skel::str_atom(comment),
            None => Skel::atom(b""),
        },
        Skel::str_atom(if lock.is_dav_comment { "1" } else { "0" }),
        num_atom(lock.creation_date),
        match lock.expiration_date {
            Some(exp) => num_atom(exp),
            None => Skel::atom(b""),
        },
    ]);
    if !validate::is_valid_lock(&skel) {
        return Err(StrataError::malformed("lock"));
    }
    Ok(skel)
}
