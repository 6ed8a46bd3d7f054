//! Working with the `changes` table.
//!
//! Each row records one path change inside a transaction; a transaction's
//! name keys any number of rows, in insertion order. Readers usually want
//! the folded view: one summarical change per path, with the original
//! ordering rules enforced while folding.

use std::collections::BTreeMap;

use strata_error::{Result, StrataError};
use strata_skel::Skel;
use strata_store::Trail;
use strata_types::{marshal, Change, ChangeKind, PathChange};

fn corrupt(txn_id: &str, detail: &str) -> StrataError {
    StrataError::CorruptChanges {
        txn_id: txn_id.to_owned(),
        detail: detail.to_owned(),
    }
}

/// Record one more change under `txn_id`.
pub fn add_change(trail: &Trail, txn_id: &str, change: &Change) -> Result<()> {
    let skel = marshal::unparse_change(change)?;
    trail.db().execute(
        "INSERT INTO changes (key, value) VALUES (?1, ?2)",
        rusqlite::params![txn_id, skel.unparse()],
    )?;
    Ok(())
}

/// All change rows for `txn_id`, in the order they were recorded.
pub fn changes_fetch_raw(trail: &Trail, txn_id: &str) -> Result<Vec<Change>> {
    let mut stmt = trail
        .db()
        .prepare("SELECT value FROM changes WHERE key = ?1 ORDER BY id")?;
    let rows = stmt.query_map([txn_id], |row| row.get::<_, Vec<u8>>(0))?;

    let mut changes = Vec::new();
    for row in rows {
        let value = row?;
        let skel =
            Skel::parse(&value).map_err(|_| corrupt(txn_id, "unparseable change record"))?;
        changes.push(marshal::parse_change(&skel)?);
    }
    Ok(changes)
}

/// Fold one change into the per-path summary map.
fn fold_change(
    txn_id: &str,
    changes: &mut BTreeMap<String, PathChange>,
    change: &Change,
) -> Result<()> {
    let Some(old) = changes.get_mut(&change.path) else {
        // First change for this path. A reset with no prior change has
        // nothing to erase.
        if let Some(id) = &change.noderev_id {
            changes.insert(
                change.path.clone(),
                PathChange {
                    noderev_id: id.clone(),
                    kind: change.kind,
                    text_mod: change.text_mod,
                    prop_mod: change.prop_mod,
                },
            );
        } else if change.kind != ChangeKind::Reset {
            return Err(corrupt(txn_id, "missing required node revision ID"));
        }
        return Ok(());
    };

    // Only a reset may omit the node revision ID.
    if change.noderev_id.is_none() && change.kind != ChangeKind::Reset {
        return Err(corrupt(txn_id, "missing required node revision ID"));
    }

    // The ID may only shift across a delete boundary.
    if let Some(id) = &change.noderev_id {
        if *id != old.noderev_id && old.kind != ChangeKind::Delete {
            return Err(corrupt(txn_id, "new node revision ID without delete"));
        }
    }

    // Only an add, replace, or reset may follow a delete.
    if old.kind == ChangeKind::Delete
        && !matches!(
            change.kind,
            ChangeKind::Replace | ChangeKind::Reset | ChangeKind::Add
        )
    {
        return Err(corrupt(txn_id, "non-add change on deleted path"));
    }

    match change.kind {
        ChangeKind::Reset => {
            changes.remove(&change.path);
        }
        ChangeKind::Delete => {
            if matches!(old.kind, ChangeKind::Add | ChangeKind::Replace) {
                // The path was born in this transaction; deleting it now
                // erases it from the summary entirely.
                changes.remove(&change.path);
            } else {
                old.kind = ChangeKind::Delete;
                old.text_mod = change.text_mod;
                old.prop_mod = change.prop_mod;
            }
        }
        ChangeKind::Add | ChangeKind::Replace => {
            // An add folded onto an existing change must follow a delete,
            // which makes it a replacement.
            old.kind = ChangeKind::Replace;
            old.noderev_id = change.noderev_id.clone().expect("checked above");
            old.text_mod = change.text_mod;
            old.prop_mod = change.prop_mod;
        }
        ChangeKind::Modify => {
            old.text_mod |= change.text_mod;
            old.prop_mod |= change.prop_mod;
        }
    }
    Ok(())
}

/// The folded per-path view of a transaction's changes.
pub fn changes_fetch(trail: &Trail, txn_id: &str) -> Result<BTreeMap<String, PathChange>> {
    let mut changes = BTreeMap::new();
    for change in changes_fetch_raw(trail, txn_id)? {
        fold_change(txn_id, &mut changes, &change)?;
    }
    Ok(changes)
}

/// Drop every change row for `txn_id`. Having none to drop is fine.
pub fn delete_changes(trail: &Trail, txn_id: &str) -> Result<()> {
    trail
        .db()
        .execute("DELETE FROM changes WHERE key = ?1", [txn_id])?;
    Ok(())
}
