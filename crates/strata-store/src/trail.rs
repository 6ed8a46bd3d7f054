//! One store transaction, scoped to one body invocation.

use rusqlite::Connection;
use strata_error::Result;

/// A trail binds one store transaction to one run of a body function.
///
/// Table managers read and write through [`Trail::db`]; nothing they do is
/// observable outside the trail until [`Store::with_trail`] commits it.
/// Dropping a trail rolls the transaction back.
///
/// [`Store::with_trail`]: crate::Store::with_trail
pub struct Trail<'conn> {
    tx: rusqlite::Transaction<'conn>,
}

impl<'conn> Trail<'conn> {
    pub(crate) fn new(tx: rusqlite::Transaction<'conn>) -> Trail<'conn> {
        Trail { tx }
    }

    /// The connection, scoped to this trail's transaction.
    pub fn db(&self) -> &Connection {
        &self.tx
    }

    pub(crate) fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}
