//! Working with the `representations` table.
//!
//! Keys are allocated (`r1`, `r2`, ...); values are representation
//! skeletons, validated in both directions by the marshaller.

use strata_error::{Result, StrataError};
use strata_skel::Skel;
use strata_store::Trail;
use strata_types::{marshal, Representation};

use crate::key_gen::allocate_key;

/// Fetch and unmarshal the representation under `key`.
pub fn get_rep(trail: &Trail, key: &str) -> Result<Representation> {
    let value: Vec<u8> = trail
        .db()
        .query_row(
            "SELECT value FROM representations WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(StrataError::DanglingRepresentation {
                key: key.to_owned(),
            }),
            other => Err(other.into()),
        })?;
    let skel = Skel::parse(&value)?;
    marshal::parse_representation(&skel)
}

/// Store `rep` under `key`, replacing any previous record.
pub fn put_rep(trail: &Trail, key: &str, rep: &Representation) -> Result<()> {
    let skel = marshal::unparse_representation(rep)?;
    trail.db().execute(
        "INSERT OR REPLACE INTO representations (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, skel.unparse()],
    )?;
    Ok(())
}

/// Store `rep` under a freshly allocated key; returns the key.
pub fn new_rep(trail: &Trail, rep: &Representation) -> Result<String> {
    let key = allocate_key(trail, "representations", "r")?;
    put_rep(trail, &key, rep)?;
    Ok(key)
}

/// Remove the representation under `key`.
pub fn delete_rep(trail: &Trail, key: &str) -> Result<()> {
    let deleted = trail
        .db()
        .execute("DELETE FROM representations WHERE key = ?1", [key])?;
    if deleted == 0 {
        return Err(StrataError::DanglingRepresentation {
            key: key.to_owned(),
        });
    }
    Ok(())
}
