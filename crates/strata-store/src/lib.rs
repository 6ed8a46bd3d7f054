//! The embedded store underneath the filesystem tables.
//!
//! The engine delegates all isolation and crash atomicity to an embedded
//! transactional key-value store (SQLite, driven through `rusqlite`) and
//! adds exactly two things on top: the custom key ordering for the nodes
//! table (registered once at open time), and the trail harness that runs a
//! body function inside one store transaction, retrying the whole body on
//! contention.

mod store;
mod trail;

pub use store::{Store, StoreOptions, NODES_COLLATION};
pub use trail::Trail;
