//! Node-revision identity.
//!
//! A node-revision ID is a dotted sequence of integers, read as
//! ⟨node-number, revision-number⟩ pairs: `3.2` is revision 2 of node 3,
//! `3.2.1.4` is revision 4 of branch 1 taken from `3.2`, and so on. An ID
//! with an odd component count is a bare node ID (no revision yet), used
//! only transiently while a new node is being created.
//!
//! The ordering here is the single source of truth for how the nodes table
//! sorts its keys; a plain lexical byte compare would interleave branches
//! with revisions and must never be used.

use std::cmp::Ordering;
use std::fmt;

/// A parsed node-revision (or bare node) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRevId {
    components: Vec<u64>,
}

impl NodeRevId {
    /// Build from raw components. Empty sequences are not valid IDs.
    pub fn from_components(components: Vec<u64>) -> Option<Self> {
        if components.is_empty() {
            None
        } else {
            Some(NodeRevId { components })
        }
    }

    /// Parse the dotted decimal form. Returns `None` for anything that is
    /// not a non-empty sequence of `.`-separated decimal integers.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        let mut components = Vec::new();
        for part in bytes.split(|&b| b == b'.') {
            if part.is_empty() {
                return None;
            }
            let mut value: u64 = 0;
            for &b in part {
                if !b.is_ascii_digit() {
                    return None;
                }
                value = value
                    .checked_mul(10)?
                    .checked_add(u64::from(b - b'0'))?;
            }
            components.push(value);
        }
        Some(NodeRevId { components })
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Number of dotted components (always at least one).
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// The node number this ID ultimately addresses (first component).
    pub fn node_number(&self) -> u64 {
        self.components[0]
    }

    /// Whether this is a fully-qualified node-revision ID (even component
    /// count), as opposed to a bare node ID.
    pub fn is_fully_qualified(&self) -> bool {
        self.components.len() % 2 == 0
    }

    /// The revision number of the final pair, if fully qualified.
    pub fn revision_number(&self) -> Option<u64> {
        if self.is_fully_qualified() {
            self.components.last().copied()
        } else {
            None
        }
    }

    /// The ID of the next linear revision: same lineage, final revision
    /// number incremented. Requires a fully-qualified ID.
    pub fn next_revision(&self) -> Option<NodeRevId> {
        if !self.is_fully_qualified() {
            return None;
        }
        let mut components = self.components.clone();
        *components.last_mut().expect("non-empty") += 1;
        Some(NodeRevId { components })
    }

    /// The first revision of the first branch taken from this revision:
    /// `N.V` → `N.V.1.1`.
    pub fn first_branch(&self) -> Option<NodeRevId> {
        if !self.is_fully_qualified() {
            return None;
        }
        let mut components = self.components.clone();
        components.push(1);
        components.push(1);
        Some(NodeRevId { components })
    }
}

impl fmt::Display for NodeRevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl Ord for NodeRevId {
    /// Pairwise comparison.
    ///
    /// Walking left to right, the first differing component decides:
    /// at a node/branch position the numbers order directly; at a revision
    /// position, an ID that ends there (a plain revision) comes before one
    /// that continues (a branch off some revision), and two that both end
    /// or both continue order by revision number. An ID that is a strict
    /// prefix of another comes first.
    fn cmp(&self, other: &Self) -> Ordering {
        let a = &self.components;
        let b = &other.components;
        let mut i = 0;
        loop {
            match (a.get(i), b.get(i)) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(&x), Some(&y)) => {
                    if x == y {
                        i += 1;
                        continue;
                    }
                    // Node and branch numbers order directly.
                    if i % 2 == 0 {
                        return x.cmp(&y);
                    }
                    // Revision position: a plain revision precedes any
                    // branch, branches order by the revision they left.
                    return match (a.get(i + 1), b.get(i + 1)) {
                        (None, None) => x.cmp(&y),
                        (None, Some(_)) => Ordering::Less,
                        (Some(_), None) => Ordering::Greater,
                        (Some(_), Some(_)) => x.cmp(&y),
                    };
                }
            }
        }
    }
}

impl PartialOrd for NodeRevId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two raw nodes-table keys.
///
/// This must order *any* two byte strings consistently, not just the keys
/// the engine writes: an inconsistent comparison under garbage keys can
/// corrupt the table's internal ordering. Two well-formed node-revision
/// keys compare by [`NodeRevId::cmp`]; a malformed key (including a bare
/// node ID, which never belongs in the table) comes before any well-formed
/// key; two malformed keys compare byte-for-byte.
pub fn compare_node_keys(a: &[u8], b: &[u8]) -> Ordering {
    let parse_qualified = |bytes: &[u8]| {
        NodeRevId::parse(bytes).filter(NodeRevId::is_fully_qualified)
    };
    match (parse_qualified(a), parse_qualified(b)) {
        (Some(ida), Some(idb)) => ida.cmp(&idb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}
