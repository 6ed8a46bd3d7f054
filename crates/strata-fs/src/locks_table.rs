//! Working with the `locks` table.
//!
//! One lock per path, keyed by the path itself. The engine does not
//! consult a clock: callers pass "now" in, which keeps lock expiry
//! deterministic and testable.

use strata_error::{Result, StrataError};
use strata_skel::Skel;
use strata_store::Trail;
use strata_types::{marshal, Lock};
use tracing::debug;

/// Store `lock`, replacing any lock already on its path.
pub fn lock_path(trail: &Trail, lock: &Lock) -> Result<()> {
    let skel = marshal::unparse_lock(lock)?;
    trail.db().execute(
        "INSERT OR REPLACE INTO locks (key, value) VALUES (?1, ?2)",
        rusqlite::params![lock.path, skel.unparse()],
    )?;
    debug!(path = %lock.path, token = %lock.token, "locked path");
    Ok(())
}

/// Fetch the lock on `path`. An expired lock is reported expired, never
/// returned as live.
pub fn get_lock(trail: &Trail, path: &str, now: u64) -> Result<Lock> {
    let value: Vec<u8> = trail
        .db()
        .query_row("SELECT value FROM locks WHERE key = ?1", [path], |row| {
            row.get(0)
        })
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(StrataError::NoSuchLock {
                path: path.to_owned(),
            }),
            other => Err(other.into()),
        })?;
    let skel = Skel::parse(&value)?;
    let lock = marshal::parse_lock(&skel)?;
    if lock.is_expired(now) {
        return Err(StrataError::LockExpired {
            path: path.to_owned(),
        });
    }
    Ok(lock)
}

/// Remove the lock on `path`. The caller's token must match unless the
/// lock is being broken (`token` = `None`).
pub fn unlock_path(trail: &Trail, path: &str, token: Option<&str>, now: u64) -> Result<()> {
    let held = match get_lock(trail, path, now) {
        Ok(lock) => Some(lock),
        // Expired locks can still be broken; a token-checked unlock of
        // one reports the expiry instead.
        Err(StrataError::LockExpired { .. }) => None,
        Err(e) => return Err(e),
    };
    match (token, held) {
        (None, _) => {}
        (Some(expected), Some(lock)) if lock.token == expected => {}
        (Some(_), Some(_)) => {
            return Err(StrataError::BadLockToken {
                path: path.to_owned(),
            })
        }
        (Some(_), None) => {
            return Err(StrataError::LockExpired {
                path: path.to_owned(),
            })
        }
    }
    trail
        .db()
        .execute("DELETE FROM locks WHERE key = ?1", [path])?;
    debug!(path, "unlocked path");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_store::{Store, StoreOptions};

    const NOW: u64 = 1_754_000_000_000_000;

    fn scratch() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Store::create(&dir.path().join("store.db"), StoreOptions::default()).unwrap();
        (dir, store)
    }

    fn lock(path: &str, token: &str, expires: Option<u64>) -> Lock {
        Lock {
            path: path.to_owned(),
            token: token.to_owned(),
            owner: "jrb".to_owned(),
            comment: None,
            is_dav_comment: false,
            creation_date: NOW,
            expiration_date: expires,
        }
    }

    #[test]
    fn lock_get_unlock() {
        let (_dir, store) = scratch();
        store
            .with_trail(|trail| {
                let held = lock("/trunk/a", "token1", None);
                lock_path(trail, &held)?;
                assert_eq!(get_lock(trail, "/trunk/a", NOW)?, held);

                unlock_path(trail, "/trunk/a", Some("token1"), NOW)?;
                assert!(matches!(
                    get_lock(trail, "/trunk/a", NOW),
                    Err(StrataError::NoSuchLock { .. })
                ));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn wrong_token_refused() {
        let (_dir, store) = scratch();
        store
            .with_trail(|trail| {
                lock_path(trail, &lock("/trunk/a", "token1", None))?;
                assert!(matches!(
                    unlock_path(trail, "/trunk/a", Some("token2"), NOW),
                    Err(StrataError::BadLockToken { .. })
                ));
                // Breaking ignores the token.
                unlock_path(trail, "/trunk/a", None, NOW)?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn expiry_is_reported() {
        let (_dir, store) = scratch();
        store
            .with_trail(|trail| {
                lock_path(trail, &lock("/trunk/a", "token1", Some(NOW + 10)))?;
                assert!(get_lock(trail, "/trunk/a", NOW).is_ok());
                assert!(matches!(
                    get_lock(trail, "/trunk/a", NOW + 10),
                    Err(StrataError::LockExpired { .. })
                ));
                // A token-checked unlock of an expired lock reports the
                // expiry; breaking it works.
                assert!(matches!(
                    unlock_path(trail, "/trunk/a", Some("token1"), NOW + 10),
                    Err(StrataError::LockExpired { .. })
                ));
                unlock_path(trail, "/trunk/a", None, NOW + 10)?;
                assert!(matches!(
                    get_lock(trail, "/trunk/a", NOW + 10),
                    Err(StrataError::NoSuchLock { .. })
                ));
                Ok(())
            })
            .unwrap();
    }
}
