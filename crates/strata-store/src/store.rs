//! Opening the store and running trails against it.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};
use strata_error::{Result, StrataError};
use strata_types::id::compare_node_keys;
use tracing::{debug, warn};

use crate::trail::Trail;

/// Name of the collation carrying the node-revision key order.
pub const NODES_COLLATION: &str = "noderev";

/// Tuning knobs for contention handling.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// How long the store itself blocks on a lock before reporting busy.
    pub busy_timeout: Duration,
    /// Bound on whole-body retries per trail.
    pub max_retries: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            busy_timeout: Duration::from_millis(500),
            max_retries: 8,
        }
    }
}

/// The embedded store holding every filesystem table.
///
/// One SQL table per logical table; values are serialized skeletons
/// (except the strings table, which holds raw bytes). The nodes table key
/// is ordered by the node-revision comparison, never byte order.
pub struct Store {
    conn: Mutex<Connection>,
    options: StoreOptions,
}

const SCHEMA: &str = "\
CREATE TABLE transactions (key TEXT NOT NULL, value BLOB NOT NULL, PRIMARY KEY (key));
CREATE TABLE revisions (recno INTEGER PRIMARY KEY, value BLOB NOT NULL);
CREATE TABLE nodes (key TEXT NOT NULL COLLATE noderev, value BLOB NOT NULL, PRIMARY KEY (key));
CREATE TABLE representations (key TEXT NOT NULL, value BLOB NOT NULL, PRIMARY KEY (key));
CREATE TABLE strings (key TEXT NOT NULL, value BLOB NOT NULL, PRIMARY KEY (key));
CREATE TABLE changes (id INTEGER PRIMARY KEY, key TEXT NOT NULL, value BLOB NOT NULL);
CREATE INDEX changes_by_key ON changes (key);
CREATE TABLE copies (key TEXT NOT NULL, value BLOB NOT NULL, PRIMARY KEY (key));
CREATE TABLE locks (key TEXT NOT NULL, value BLOB NOT NULL, PRIMARY KEY (key));
";

impl Store {
    /// Create a new store file with the full table schema.
    pub fn create(path: &Path, options: StoreOptions) -> Result<Store> {
        let store = Store::open_connection(path, options)?;
        {
            let conn = store.conn.lock();
            conn.execute_batch(SCHEMA)?;
        }
        debug!(path = %path.display(), "created store");
        Ok(store)
    }

    /// Open an existing store file.
    pub fn open(path: &Path, options: StoreOptions) -> Result<Store> {
        let store = Store::open_connection(path, options)?;
        debug!(path = %path.display(), "opened store");
        Ok(store)
    }

    fn open_connection(path: &Path, options: StoreOptions) -> Result<Store> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(options.busy_timeout)?;
        // The nodes table declares this collation; it has to exist before
        // the first statement that touches the table.
        conn.create_collation(NODES_COLLATION, |a, b| {
            compare_node_keys(a.as_bytes(), b.as_bytes())
        })?;
        Ok(Store {
            conn: Mutex::new(conn),
            options,
        })
    }

    /// Run `body` inside one store transaction.
    ///
    /// On success the transaction commits and the body's value is
    /// returned. On a contention signal (the store's busy/locked class)
    /// the transaction is discarded and the body re-invoked from scratch
    /// (its locals are rebuilt on every attempt), up to the configured
    /// bound, after which `RetriesExhausted` surfaces. Any other error
    /// rolls back and propagates immediately.
    ///
    /// Bodies must have no externally observable side effects until the
    /// trail commits; the retry and the rollback both assume the store
    /// transaction is the only state a body touches.
    pub fn with_trail<T>(&self, mut body: impl FnMut(&Trail) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let max = self.options.max_retries.max(1);
        for attempt in 1..=max {
            let give_up = |err: StrataError| {
                if !err.is_transient() {
                    return Some(err);
                }
                if attempt == max {
                    return Some(StrataError::RetriesExhausted { attempts: max });
                }
                warn!(attempt, "trail hit store contention, retrying");
                None
            };

            let tx = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
                Ok(tx) => tx,
                Err(e) => match give_up(e.into()) {
                    Some(err) => return Err(err),
                    None => continue,
                },
            };

            let trail = Trail::new(tx);
            let outcome = match body(&trail) {
                Ok(value) => trail.commit().map(|()| value),
                Err(e) => {
                    drop(trail);
                    Err(e)
                }
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => match give_up(e) {
                    Some(err) => return Err(err),
                    None => continue,
                },
            }
        }
        unreachable!("loop returns on success, terminal error, or exhaustion")
    }
}
