//! Key allocation for tables that mint their own keys.
//!
//! Each such table reserves the row `"next-key"` for a decimal counter and
//! hands out `<prefix><counter>` keys. The counter row is ordinary data:
//! the same trail discipline that guards every other write serializes
//! allocations.

use strata_error::{Result, StrataError};
use strata_store::Trail;

/// Reserved key holding a table's allocation counter.
pub const NEXT_KEY: &str = "next-key";

/// Allocate the next key in `table`, advancing its counter.
pub fn allocate_key(trail: &Trail, table: &str, prefix: &str) -> Result<String> {
    let current: Option<Vec<u8>> = trail
        .db()
        .query_row(
            &format!("SELECT value FROM {table} WHERE key = ?1"),
            [NEXT_KEY],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    let next: u64 = match current {
        Some(bytes) => std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(StrataError::malformed("next-key"))?,
        None => 1,
    };

    trail.db().execute(
        &format!("INSERT OR REPLACE INTO {table} (key, value) VALUES (?1, ?2)"),
        rusqlite::params![NEXT_KEY, (next + 1).to_string().into_bytes()],
    )?;

    Ok(format!("{prefix}{next}"))
}
