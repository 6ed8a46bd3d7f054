//! Working with the `strings` table.
//!
//! The one table whose values are not skeletons: raw byte strings shared
//! by every representation (fulltext blobs, delta payloads, directory
//! entry lists, property lists). Keys are allocated (`s1`, `s2`, ...).

use strata_error::{Result, StrataError};
use strata_store::Trail;

use crate::key_gen::allocate_key;

/// Read the whole string stored under `key`.
pub fn read_string(trail: &Trail, key: &str) -> Result<Vec<u8>> {
    trail
        .db()
        .query_row("SELECT value FROM strings WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(StrataError::DanglingString {
                key: key.to_owned(),
            }),
            other => Err(other.into()),
        })
}

/// Store `bytes` under `key`, replacing any previous contents.
pub fn write_string(trail: &Trail, key: &str, bytes: &[u8]) -> Result<()> {
    trail.db().execute(
        "INSERT OR REPLACE INTO strings (key, value) VALUES (?1, ?2)",
        rusqlite::params![key, bytes],
    )?;
    Ok(())
}

/// Store `bytes` under a freshly allocated key; returns the key.
pub fn new_string(trail: &Trail, bytes: &[u8]) -> Result<String> {
    let key = allocate_key(trail, "strings", "s")?;
    write_string(trail, &key, bytes)?;
    Ok(key)
}

/// Append `bytes` to the string under `key`, which must exist.
///
/// Read-modify-write rather than SQL concatenation: the `||` operator
/// goes through text conversion, and these values are arbitrary bytes.
pub fn append_string(trail: &Trail, key: &str, bytes: &[u8]) -> Result<()> {
    let mut value = read_string(trail, key)?;
    value.extend_from_slice(bytes);
    write_string(trail, key, &value)
}

/// Size in bytes of the string under `key`.
pub fn string_size(trail: &Trail, key: &str) -> Result<u64> {
    trail
        .db()
        .query_row(
            "SELECT LENGTH(value) FROM strings WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(StrataError::DanglingString {
                key: key.to_owned(),
            }),
            other => Err(other.into()),
        })
}

/// Remove the string under `key`.
pub fn delete_string(trail: &Trail, key: &str) -> Result<()> {
    let deleted = trail
        .db()
        .execute("DELETE FROM strings WHERE key = ?1", [key])?;
    if deleted == 0 {
        return Err(StrataError::DanglingString {
            key: key.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::{Store, StoreOptions};

    fn scratch() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Store::create(&dir.path().join("store.db"), StoreOptions::default()).unwrap();
        (dir, store)
    }

    #[test]
    fn write_read_append() {
        let (_dir, store) = scratch();
        store
            .with_trail(|trail| {
                let key = new_string(trail, b"hello")?;
                assert_eq!(key, "s1");
                append_string(trail, &key, b", world")?;
                assert_eq!(read_string(trail, &key)?, b"hello, world");
                assert_eq!(string_size(trail, &key)?, 12);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn binary_safe() {
        let (_dir, store) = scratch();
        store
            .with_trail(|trail| {
                let payload = [0u8, 255, 0, 40, 41, 10];
                let key = new_string(trail, &payload)?;
                assert_eq!(read_string(trail, &key)?, payload);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn missing_strings_are_dangling() {
        let (_dir, store) = scratch();
        store
            .with_trail(|trail| {
                for result in [
                    read_string(trail, "s9").map(|_| ()),
                    append_string(trail, "s9", b"x"),
                    string_size(trail, "s9").map(|_| ()),
                    delete_string(trail, "s9"),
                ] {
                    assert!(matches!(result, Err(StrataError::DanglingString { .. })));
                }
                Ok(())
            })
            .unwrap();
    }
}
