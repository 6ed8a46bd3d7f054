//! Working with the `revisions` table.
//!
//! Revisions are keyed by record number and append-only. Record numbers
//! are 1-based inside the store; revision numbers start at zero, so
//! `recno = revision + 1` and the youngest revision is the last record.

use strata_error::{Result, StrataError};
use strata_skel::Skel;
use strata_store::Trail;
use strata_types::{marshal, Revision};

/// Fetch and unmarshal revision `rev`.
pub fn get_rev(trail: &Trail, rev: u64) -> Result<Revision> {
    let recno = rev + 1;
    let value: Vec<u8> = trail
        .db()
        .query_row(
            "SELECT value FROM revisions WHERE recno = ?1",
            [recno],
            |row| row.get(0),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                Err(StrataError::DanglingRevision { revision: rev })
            }
            other => Err(other.into()),
        })?;
    let skel =
        Skel::parse(&value).map_err(|_| StrataError::CorruptFsRevision { revision: rev })?;
    marshal::parse_revision(&skel)
        .map_err(|_| StrataError::CorruptFsRevision { revision: rev })
}

/// Append `revision` as the next record; returns the revision number it
/// was assigned.
pub fn put_rev(trail: &Trail, revision: &Revision) -> Result<u64> {
    let skel = marshal::unparse_revision(revision)?;
    trail.db().execute(
        "INSERT INTO revisions (value) VALUES (?1)",
        [skel.unparse()],
    )?;
    let recno = trail.db().last_insert_rowid() as u64;
    Ok(recno - 1)
}

/// Overwrite an existing revision record in place.
///
/// Revision records are immutable except through the revision-property
/// editing path, which is the only caller of this.
pub fn update_rev(trail: &Trail, rev: u64, revision: &Revision) -> Result<()> {
    let skel = marshal::unparse_revision(revision)?;
    let updated = trail.db().execute(
        "UPDATE revisions SET value = ?1 WHERE recno = ?2",
        rusqlite::params![skel.unparse(), rev + 1],
    )?;
    if updated == 0 {
        return Err(StrataError::DanglingRevision { revision: rev });
    }
    Ok(())
}

/// The youngest revision number. Revision 0 always exists in a healthy
/// repository, so an empty table is corruption, not emptiness.
pub fn youngest_rev(trail: &Trail) -> Result<u64> {
    let max: Option<u64> = trail
        .db()
        .query_row("SELECT MAX(recno) FROM revisions", [], |row| row.get(0))?;
    match max {
        Some(recno) if recno >= 1 => Ok(recno - 1),
        _ => Err(StrataError::CorruptFsRevision { revision: 0 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::{Store, StoreOptions};
    use strata_types::{NodeRevId, Proplist};

    fn scratch() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Store::create(&dir.path().join("store.db"), StoreOptions::default()).unwrap();
        (dir, store)
    }

    fn direct_rev(root: &str) -> Revision {
        Revision::Direct {
            root_id: NodeRevId::parse(root.as_bytes()).unwrap(),
            props: Proplist::new(),
        }
    }

    #[test]
    fn revisions_append_from_zero() {
        let (_dir, store) = scratch();
        store
            .with_trail(|trail| {
                assert_eq!(put_rev(trail, &direct_rev("1.1"))?, 0);
                assert_eq!(put_rev(trail, &direct_rev("1.2"))?, 1);
                assert_eq!(put_rev(trail, &direct_rev("1.3"))?, 2);
                assert_eq!(youngest_rev(trail)?, 2);
                assert_eq!(get_rev(trail, 1)?, direct_rev("1.2"));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn missing_revision_is_dangling() {
        let (_dir, store) = scratch();
        let result = store.with_trail(|trail| {
            put_rev(trail, &direct_rev("1.1"))?;
            get_rev(trail, 5)
        });
        assert!(matches!(
            result,
            Err(StrataError::DanglingRevision { revision: 5 })
        ));
    }

    #[test]
    fn empty_table_is_corrupt_not_empty() {
        let (_dir, store) = scratch();
        let result = store.with_trail(youngest_rev);
        assert!(matches!(
            result,
            Err(StrataError::CorruptFsRevision { revision: 0 })
        ));
    }

    #[test]
    fn update_replaces_in_place() {
        let (_dir, store) = scratch();
        store
            .with_trail(|trail| {
                put_rev(trail, &direct_rev("1.1"))?;
                let mut props = Proplist::new();
                props.insert("svn:log".to_owned(), b"amended".to_vec());
                let amended = Revision::Direct {
                    root_id: NodeRevId::parse(b"1.1").unwrap(),
                    props,
                };
                update_rev(trail, 0, &amended)?;
                assert_eq!(get_rev(trail, 0)?, amended);
                assert_eq!(youngest_rev(trail)?, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn garbage_record_is_corrupt() {
        let (_dir, store) = scratch();
        let result = store.with_trail(|trail| {
            trail.db().execute(
                "INSERT INTO revisions (value) VALUES (x'2929')",
                [],
            )?;
            get_rev(trail, 0)
        });
        assert!(matches!(
            result,
            Err(StrataError::CorruptFsRevision { revision: 0 })
        ));
    }
}
