//! Working with the `copies` table.
//!
//! Copy records capture provenance for copied nodes. Keys are allocated
//! (`c1`, `c2`, ...); transactions list the copy IDs they created.

use strata_error::{Result, StrataError};
use strata_skel::Skel;
use strata_store::Trail;
use strata_types::{marshal, Copy};

use crate::key_gen::allocate_key;

/// Store `copy` under a freshly allocated ID; returns the ID.
pub fn create_copy(trail: &Trail, copy: &Copy) -> Result<String> {
    let copy_id = allocate_key(trail, "copies", "c")?;
    let skel = marshal::unparse_copy(copy)?;
    trail.db().execute(
        "INSERT INTO copies (key, value) VALUES (?1, ?2)",
        rusqlite::params![copy_id, skel.unparse()],
    )?;
    Ok(copy_id)
}

/// Fetch and unmarshal the copy record under `copy_id`.
pub fn get_copy(trail: &Trail, copy_id: &str) -> Result<Copy> {
    let value: Vec<u8> = trail
        .db()
        .query_row(
            "SELECT value FROM copies WHERE key = ?1",
            [copy_id],
            |row| row.get(0),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(StrataError::DanglingCopy {
                copy_id: copy_id.to_owned(),
            }),
            other => Err(other.into()),
        })?;
    let skel = Skel::parse(&value)?;
    marshal::parse_copy(&skel)
}

/// Remove the copy record under `copy_id`.
pub fn delete_copy(trail: &Trail, copy_id: &str) -> Result<()> {
    let deleted = trail
        .db()
        .execute("DELETE FROM copies WHERE key = ?1", [copy_id])?;
    if deleted == 0 {
        return Err(StrataError::DanglingCopy {
            copy_id: copy_id.to_owned(),
        });
    }
    Ok(())
}
