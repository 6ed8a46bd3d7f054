//! Working with the `nodes` table.
//!
//! Keys are node-revision IDs in their dotted string form, ordered by the
//! custom collation the store registers at open time. That ordering puts
//! all revisions of a node together, followed by all branches from any of
//! its revisions, which is what the ID allocation probes below rely on.

use strata_error::{Result, StrataError};
use strata_skel::Skel;
use strata_store::Trail;
use strata_types::{marshal, Format, NodeRevId, NodeRevision};
use tracing::debug;

/// Fetch and unmarshal the node-revision stored under `id`.
pub fn get_node_rev(trail: &Trail, format: Format, id: &NodeRevId) -> Result<NodeRevision> {
    let value: Vec<u8> = trail
        .db()
        .query_row(
            "SELECT value FROM nodes WHERE key = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Err(StrataError::dangling_id(id.to_string())),
            other => Err(other.into()),
        })?;
    let skel = Skel::parse(&value)?;
    marshal::parse_node_revision(&skel, format)
}

/// Store `noderev` under `id`, replacing any previous record.
pub fn put_node_rev(
    trail: &Trail,
    format: Format,
    id: &NodeRevId,
    noderev: &NodeRevision,
) -> Result<()> {
    let skel = marshal::unparse_node_revision(noderev, format)?;
    trail.db().execute(
        "INSERT OR REPLACE INTO nodes (key, value) VALUES (?1, ?2)",
        rusqlite::params![id.to_string(), skel.unparse()],
    )?;
    Ok(())
}

/// Remove the node-revision stored under `id`.
pub fn delete_node_rev(trail: &Trail, id: &NodeRevId) -> Result<()> {
    let deleted = trail
        .db()
        .execute("DELETE FROM nodes WHERE key = ?1", [id.to_string()])?;
    if deleted == 0 {
        return Err(StrataError::dangling_id(id.to_string()));
    }
    Ok(())
}

fn key_exists(trail: &Trail, id: &NodeRevId) -> Result<bool> {
    let found: Option<i64> = trail
        .db()
        .query_row(
            "SELECT 1 FROM nodes WHERE key = ?1",
            [id.to_string()],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(found.is_some())
}

/// Parse a raw nodes-table key, insisting on a fully-qualified ID.
fn parse_key(key: &str) -> Result<NodeRevId> {
    NodeRevId::parse(key.as_bytes())
        .filter(NodeRevId::is_fully_qualified)
        .ok_or(StrataError::CorruptNodesKey)
}

/// The ID for the first revision of an entirely new node.
///
/// Reads the greatest key in the table and increments its node number.
/// The root node-revision is created with the repository, so an empty
/// table means the store is corrupt, not young.
pub fn new_node_id(trail: &Trail) -> Result<NodeRevId> {
    let last: Option<String> = trail
        .db()
        .query_row(
            "SELECT key FROM nodes ORDER BY key DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    let last = last.ok_or(StrataError::CorruptNodesKey)?;
    let id = parse_key(&last)?;

    let fresh = NodeRevId::from_components(vec![id.node_number() + 1, 1]).expect("two components");
    debug!(id = %fresh, "allocated new node id");
    Ok(fresh)
}

/// The ID for the next revision of `id`.
///
/// First probe: the linear successor `N.(V+1)`. If another revision has
/// already claimed it, a new branch must be minted instead: the table
/// order guarantees every existing branch from `N.V` sorts strictly
/// before the synthetic key `N.(V+1).1.1`, so the last key before that
/// synthetic ID tells us the highest branch number in use.
///
/// Both probes are point-in-time reads; callers must write the returned
/// ID inside this same trail or the answer can go stale.
pub fn new_successor_id(trail: &Trail, id: &NodeRevId) -> Result<NodeRevId> {
    let linear = id.next_revision().ok_or(StrataError::CorruptNodesKey)?;
    if !key_exists(trail, &linear)? {
        return Ok(linear);
    }

    // The linear successor is taken; find the last key before
    // N.(V+1).1.1 to learn the branch numbers already in use.
    let synthetic = linear.first_branch().expect("fully qualified");
    let before: Option<String> = trail
        .db()
        .query_row(
            "SELECT key FROM nodes WHERE key < ?1 ORDER BY key DESC LIMIT 1",
            [synthetic.to_string()],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    let last_branch = parse_key(&before.ok_or(StrataError::CorruptNodesKey)?)?;

    if last_branch.component_count() == id.component_count() {
        // No branches from this node yet; this successor starts branch 1.
        return Ok(id.first_branch().expect("fully qualified"));
    }
    if last_branch.component_count() > id.component_count() {
        // The last key is (a descendant of) the highest branch; take the
        // next branch number, revision 1.
        let mut components = last_branch.components()[..id.component_count() + 1].to_vec();
        components[id.component_count()] += 1;
        components.push(1);
        return Ok(NodeRevId::from_components(components).expect("non-empty"));
    }
    Err(StrataError::CorruptNodesKey)
}
