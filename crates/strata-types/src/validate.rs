//! Structural validators, one per record kind.
//!
//! These predicates are the only gate between raw store bytes and typed
//! records: the store itself is byte-oblivious, so a record that fails its
//! predicate must be treated as corruption and never operated on.
//! Marshalling calls them in both directions.

use strata_skel::Skel;

use crate::id::NodeRevId;
use crate::record::ChangeKind;

/// `("md5" DIGEST)`.
pub fn is_valid_checksum(skel: &Skel) -> bool {
    match skel.children() {
        Some([tag, digest]) => tag.matches_atom("md5") && digest.is_atom(),
        _ => false,
    }
}

/// `(NAME VALUE ...)`: even length, atoms throughout.
pub fn is_valid_proplist(skel: &Skel) -> bool {
    match skel.children() {
        Some(children) => children.len() % 2 == 0 && children.iter().all(Skel::is_atom),
        None => false,
    }
}

/// `("revision" TXN-NAME)` or `("revision" ROOT-ID PROPLIST)`.
pub fn is_valid_revision(skel: &Skel) -> bool {
    match skel.children() {
        Some([tag, txn]) => tag.matches_atom("revision") && txn.is_atom(),
        Some([tag, id, props]) => {
            tag.matches_atom("revision")
                && id
                    .atom_bytes()
                    .and_then(NodeRevId::parse)
                    .is_some_and(|id| id.is_fully_qualified())
                && is_valid_proplist(props)
        }
        _ => false,
    }
}

/// `(KIND ROOT-ID BASE-OR-REV PROPLIST COPIES MERGES)`.
pub fn is_valid_transaction(skel: &Skel) -> bool {
    match skel.children() {
        Some([kind, root_id, base_or_rev, props, copies, merges]) => {
            (kind.matches_atom("transaction")
                || kind.matches_atom("committed")
                || kind.matches_atom("dead"))
                && root_id.is_atom()
                && base_or_rev.is_atom()
                && is_valid_proplist(props)
                && !copies.is_atom()
                && !merges.is_atom()
        }
        _ => false,
    }
}

/// One delta chunk: `(OFFSET WINDOW)` with WINDOW =
/// `(DIFF SIZE REP-KEY [CHECKSUM])` and DIFF = `("svndiff" VERSION KEY)`.
pub fn is_valid_rep_delta_chunk(skel: &Skel) -> bool {
    let Some([offset, window]) = skel.children() else {
        return false;
    };
    if !offset.is_atom() {
        return false;
    }
    let Some(window_children) = window.children() else {
        return false;
    };
    let (diff, size, rep_key, checksum) = match window_children {
        [d, s, r] => (d, s, r, None),
        [d, s, r, c] => (d, s, r, Some(c)),
        _ => return false,
    };
    if !size.is_atom() || !rep_key.is_atom() {
        return false;
    }
    if let Some(c) = checksum {
        if !is_valid_checksum(c) {
            return false;
        }
    }
    // Only svndiff versions 0 and 1 are known.
    match diff.children() {
        Some([tag, version, key]) => {
            tag.matches_atom("svndiff")
                && (version.matches_atom("0") || version.matches_atom("1"))
                && key.is_atom()
        }
        _ => false,
    }
}

/// `(HEADER BODY...)` with HEADER = `(KIND TXN-ID [CHECKSUM])`.
pub fn is_valid_representation(skel: &Skel) -> bool {
    let Some(children) = skel.children() else {
        return false;
    };
    let [header, body @ ..] = children else {
        return false;
    };
    let Some(header_children) = header.children() else {
        return false;
    };
    let kind = match header_children {
        [kind, txn] if kind.is_atom() && txn.is_atom() => kind,
        [kind, txn, checksum]
            if kind.is_atom() && txn.is_atom() && is_valid_checksum(checksum) =>
        {
            kind
        }
        _ => return false,
    };

    if kind.matches_atom("fulltext") {
        return matches!(body, [key] if key.is_atom());
    }
    if kind.matches_atom("delta") {
        return !body.is_empty() && body.iter().all(is_valid_rep_delta_chunk);
    }
    false
}

/// Node-revision HEADER = `(KIND CREATED-PATH [PRED-ID [PRED-COUNT
/// [HAS-MERGEINFO MERGEINFO-COUNT]]])`, lengths 2, 3, 4, or 6.
pub fn is_valid_node_revision_header(skel: &Skel) -> bool {
    let Some(children) = skel.children() else {
        return false;
    };
    if !matches!(children.len(), 2 | 3 | 4 | 6) {
        return false;
    }
    if !children.iter().all(Skel::is_atom) {
        return false;
    }
    let kind = &children[0];
    if !kind.matches_atom("file") && !kind.matches_atom("dir") {
        return false;
    }
    // The created path is canonical and absolute.
    children[1]
        .atom_bytes()
        .is_some_and(|path| path.first() == Some(&b'/'))
}

/// `(HEADER PROP-KEY DATA-KEY [EDIT-DATA-KEY])`, the edit key on files only.
pub fn is_valid_node_revision(skel: &Skel) -> bool {
    let Some(children) = skel.children() else {
        return false;
    };
    let [header, rest @ ..] = children else {
        return false;
    };
    if !is_valid_node_revision_header(header) {
        return false;
    }
    let is_file = header
        .children()
        .is_some_and(|h| h[0].matches_atom("file"));
    match rest {
        [prop, data] => prop.is_atom() && data.is_atom(),
        [prop, data, edit] => is_file && prop.is_atom() && data.is_atom() && edit.is_atom(),
        _ => false,
    }
}

/// `((NAME ID) ...)`.
pub fn is_valid_entries(skel: &Skel) -> bool {
    match skel.children() {
        Some(children) => children.iter().all(|entry| {
            matches!(entry.children(),
                     Some([name, id]) if name.is_atom() && id.is_atom())
        }),
        None => false,
    }
}

/// `(KIND SRC-PATH SRC-TXN-ID DST-NODE-ID)`.
pub fn is_valid_copy(skel: &Skel) -> bool {
    match skel.children() {
        Some([kind, src_path, src_txn, dst_id]) => {
            (kind.matches_atom("copy") || kind.matches_atom("soft-copy"))
                && src_path.is_atom()
                && src_txn.is_atom()
                && dst_id.is_atom()
        }
        _ => false,
    }
}

/// `("change" PATH NODE-ID KIND TEXT-MOD PROP-MOD)`. The node ID may be
/// empty only for a `reset`.
pub fn is_valid_change(skel: &Skel) -> bool {
    match skel.children() {
        Some([tag, path, node_id, kind, text_mod, prop_mod]) => {
            if !tag.matches_atom("change")
                || !path.is_atom()
                || !text_mod.is_atom()
                || !prop_mod.is_atom()
            {
                return false;
            }
            let Some(kind) = kind.atom_bytes().and_then(ChangeKind::from_tag) else {
                return false;
            };
            match node_id.atom_bytes() {
                Some([]) => kind == ChangeKind::Reset,
                Some(_) => true,
                None => false,
            }
        }
        _ => false,
    }
}

/// `("lock" PATH TOKEN OWNER COMMENT DAV-P CREATED EXPIRES)`.
pub fn is_valid_lock(skel: &Skel) -> bool {
    match skel.children() {
        Some(children) => {
            children.len() == 8
                && children[0].matches_atom("lock")
                && children[1..].iter().all(Skel::is_atom)
        }
        _ => false,
    }
}
