//! Working with the `transactions` table.
//!
//! Keys are allocated names (`t1`, `t2`, ...); the reserved `next-key` row
//! holds the allocation counter. Values are transaction skeletons.

use strata_error::{Result, StrataError};
use strata_skel::Skel;
use strata_store::Trail;
use strata_types::{marshal, Format, NodeRevId, Transaction};
use tracing::debug;

use crate::key_gen::{allocate_key, NEXT_KEY};

/// Create a fresh active transaction based on `base_root_id`; its root
/// starts out equal to its base. Returns the allocated name.
pub fn create_txn(trail: &Trail, format: Format, base_root_id: &NodeRevId) -> Result<String> {
    let txn_id = allocate_key(trail, "transactions", "t")?;
    let txn = Transaction::new_active(base_root_id.clone());
    put_txn(trail, format, &txn_id, &txn)?;
    debug!(txn_id = %txn_id, base = %base_root_id, "created transaction");
    Ok(txn_id)
}

/// Fetch and unmarshal the transaction named `txn_id`.
pub fn get_txn(trail: &Trail, format: Format, txn_id: &str) -> Result<Transaction> {
    let value: Vec<u8> = trail
        .db()
        .query_row(
            "SELECT value FROM transactions WHERE key = ?1",
            [txn_id],
            |row| row.get(0),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(StrataError::DanglingTransaction {
                txn_id: txn_id.to_owned(),
            }),
            other => Err(other.into()),
        })?;
    let skel = Skel::parse(&value).map_err(|_| StrataError::corrupt_txn(txn_id))?;
    marshal::parse_transaction(&skel, format)
}

/// Store `txn` under `txn_id`, replacing any previous record.
pub fn put_txn(trail: &Trail, format: Format, txn_id: &str, txn: &Transaction) -> Result<()> {
    let skel = marshal::unparse_transaction(txn, format)?;
    trail.db().execute(
        "INSERT OR REPLACE INTO transactions (key, value) VALUES (?1, ?2)",
        rusqlite::params![txn_id, skel.unparse()],
    )?;
    Ok(())
}

/// Remove the transaction record. Committed transactions are part of
/// permanent history and refuse to go.
pub fn delete_txn(trail: &Trail, format: Format, txn_id: &str) -> Result<()> {
    let txn = get_txn(trail, format, txn_id)?;
    if txn.is_committed() {
        return Err(StrataError::TransactionNotMutable {
            txn_id: txn_id.to_owned(),
        });
    }
    trail
        .db()
        .execute("DELETE FROM transactions WHERE key = ?1", [txn_id])?;
    debug!(txn_id, "deleted transaction");
    Ok(())
}

/// Names of all transactions that have not been committed (active and
/// dead alike), skipping the counter row.
pub fn list_active(trail: &Trail, format: Format) -> Result<Vec<String>> {
    let mut stmt = trail.db().prepare(
        "SELECT key, value FROM transactions WHERE key != ?1 ORDER BY key",
    )?;
    let rows = stmt.query_map([NEXT_KEY], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;

    let mut names = Vec::new();
    for row in rows {
        let (txn_id, value) = row?;
        let skel = Skel::parse(&value).map_err(|_| StrataError::corrupt_txn(&txn_id))?;
        let txn = marshal::parse_transaction(&skel, format)?;
        if !txn.is_committed() {
            names.push(txn_id);
        }
    }
    Ok(names)
}
