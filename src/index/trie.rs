//! Trie Directory
//!
//! Binary trie over key hash bits. Internal nodes route on bit `level`
//! (0 = left, 1 = right); leaves describe one bucket each.
//!
//! ## Architecture
//! ```text
//!              root (level 0, internal)
//!             /                       \
//!   leaf "0" (level 1)          internal "1" (level 1)
//!                               /                \
//!                      leaf "10" (level 2)   (vacant)
//! ```
//! Nodes live in an arena indexed by [`NodeId`]; parent links are indices,
//! so splitting and merging never fight the borrow checker. Freed slots are
//! recycled.
//!
//! Invariants kept by every operation:
//! - `level` equals the depth of the node and `route.len()`
//! - the root is always internal and never removed
//! - leaves split only while `level < max_depth`

use crate::types::HashBits;
use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};

/// Index of a node in the trie arena
pub type NodeId = usize;

/// Bucket descriptor stored in a leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Main-file block of this bucket
    pub block_address: u64,
    /// Records in the main block
    pub main_size: usize,
    /// Records in the overflow chain
    pub overflow_size: usize,
    /// 1 + number of overflow blocks
    pub chain_length: usize,
}

impl Bucket {
    pub fn new(block_address: u64) -> Self {
        Self {
            block_address,
            main_size: 0,
            overflow_size: 0,
            chain_length: 1,
        }
    }

    /// Records in the whole bucket
    pub fn size(&self) -> usize {
        self.main_size + self.overflow_size
    }

    pub fn has_overflow(&self) -> bool {
        self.chain_length > 1
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Internal {
        left: Option<NodeId>,
        right: Option<NodeId>,
    },
    Leaf(Bucket),
}

#[derive(Debug, Clone)]
pub struct TrieNode {
    pub parent: Option<NodeId>,
    pub level: usize,
    /// Bits taken from the root, one char per level
    pub route: String,
    pub kind: NodeKind,
}

impl TrieNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub fn bucket(&self) -> Option<&Bucket> {
        match &self.kind {
            NodeKind::Leaf(bucket) => Some(bucket),
            NodeKind::Internal { .. } => None,
        }
    }
}

/// Outcome of walking the trie for a hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The hash routes to this leaf
    Leaf(NodeId),
    /// The hash routes into an empty child slot of `parent`
    Vacant { parent: NodeId, right: bool },
}

/// Persisted leaf row; the trie is rebuilt from these on reopen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub route: String,
    pub level: usize,
    pub block_address: u64,
    pub main_size: usize,
    pub overflow_size: usize,
    pub chain_length: usize,
}

/// Binary trie directory
#[derive(Debug, Clone)]
pub struct Trie {
    nodes: Vec<Option<TrieNode>>,
    free_slots: Vec<NodeId>,
    root: NodeId,
    max_depth: usize,
}

impl Trie {
    /// Root with two level-1 leaves on the given block addresses
    pub fn new(left_address: u64, right_address: u64, max_depth: usize) -> Result<Self> {
        let mut trie = Self::empty(max_depth)?;
        trie.attach_leaf(trie.root, false, left_address)?;
        trie.attach_leaf(trie.root, true, right_address)?;
        Ok(trie)
    }

    /// Root only, no leaves
    fn empty(max_depth: usize) -> Result<Self> {
        if max_depth < 1 {
            return Err(StorageError::InvalidArgument(
                "Max depth cannot be less than 1".into(),
            ));
        }
        let root = TrieNode {
            parent: None,
            level: 0,
            route: String::new(),
            kind: NodeKind::Internal {
                left: None,
                right: None,
            },
        };
        Ok(Self {
            nodes: vec![Some(root)],
            free_slots: Vec::new(),
            root: 0,
            max_depth,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Node by id, `None` for an id that was never handed out or was freed
    pub fn get(&self, id: NodeId) -> Option<&TrieNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    /// Node by id; ids held by the store are always live
    pub(crate) fn node(&self, id: NodeId) -> &TrieNode {
        self.nodes[id].as_ref().expect("stale trie node id")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut TrieNode {
        self.nodes[id].as_mut().expect("stale trie node id")
    }

    /// Bucket of a leaf
    pub fn bucket(&self, id: NodeId) -> Result<&Bucket> {
        self.get(id)
            .and_then(TrieNode::bucket)
            .ok_or_else(|| StorageError::Corruption(format!("trie node {} is not a leaf", id)))
    }

    pub(crate) fn bucket_mut(&mut self, id: NodeId) -> Result<&mut Bucket> {
        match &mut self.node_mut(id).kind {
            NodeKind::Leaf(bucket) => Ok(bucket),
            NodeKind::Internal { .. } => Err(StorageError::Corruption(format!(
                "trie node {} is not a leaf",
                id
            ))),
        }
    }

    pub(crate) fn level(&self, id: NodeId) -> usize {
        self.node(id).level
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Whether a leaf may still be split
    pub(crate) fn can_split(&self, id: NodeId) -> bool {
        self.level(id) < self.max_depth
    }

    /// Walk from the root following `bits`; never creates nodes
    pub fn lookup(&self, bits: HashBits) -> Lookup {
        let mut current = self.root;
        loop {
            let node = self.node(current);
            match node.kind {
                NodeKind::Leaf(_) => return Lookup::Leaf(current),
                NodeKind::Internal { left, right } => {
                    let go_right = bits.bit(node.level);
                    let child = if go_right { right } else { left };
                    match child {
                        Some(child) => current = child,
                        None => {
                            return Lookup::Vacant {
                                parent: current,
                                right: go_right,
                            }
                        }
                    }
                }
            }
        }
    }

    /// Put a new empty leaf into a vacant child slot of `parent`
    pub(crate) fn attach_leaf(&mut self, parent: NodeId, right: bool, block_address: u64) -> Result<NodeId> {
        let (level, route) = {
            let p = self.node(parent);
            let mut route = p.route.clone();
            route.push(if right { '1' } else { '0' });
            (p.level + 1, route)
        };
        if level > self.max_depth {
            return Err(StorageError::Corruption(format!(
                "leaf at level {} exceeds max depth {}",
                level, self.max_depth
            )));
        }

        let id = self.alloc(TrieNode {
            parent: Some(parent),
            level,
            route,
            kind: NodeKind::Leaf(Bucket::new(block_address)),
        });
        self.set_child(parent, right, Some(id))?;
        Ok(id)
    }

    /// Turn leaf `id` into an internal node with two fresh leaves.
    ///
    /// The left child gets `new_address`, the right child keeps the old
    /// block. Returns `(left, right)`; `id` stays valid as the new parent.
    pub(crate) fn split(&mut self, id: NodeId, new_address: u64) -> Result<(NodeId, NodeId)> {
        let old = *self.bucket(id)?;
        if !self.can_split(id) {
            return Err(StorageError::CapacityExhausted(format!(
                "leaf {} is already at max depth {}",
                self.node(id).route,
                self.max_depth
            )));
        }

        self.node_mut(id).kind = NodeKind::Internal {
            left: None,
            right: None,
        };
        let left = self.attach_leaf(id, false, new_address)?;
        let right = self.attach_leaf(id, true, old.block_address)?;
        Ok((left, right))
    }

    /// Other child of this node's parent
    pub(crate) fn sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        match self.node(parent).kind {
            NodeKind::Internal { left, right } => {
                if left == Some(id) {
                    right
                } else {
                    left
                }
            }
            NodeKind::Leaf(_) => None,
        }
    }

    /// Replace leaf `id` and its leaf `sibling` (or `id` alone) with a single
    /// leaf at the parent's position. The merged leaf keeps the lower block
    /// address and returns the parent id, now a leaf.
    ///
    /// Fails when the parent is the root: level-1 leaves are never merged.
    pub(crate) fn merge(&mut self, id: NodeId, sibling: Option<NodeId>) -> Result<NodeId> {
        let parent = self
            .parent(id)
            .ok_or_else(|| StorageError::Corruption("cannot merge the root".into()))?;
        if parent == self.root {
            return Err(StorageError::InvalidArgument(
                "cannot merge further, parent is the root".into(),
            ));
        }

        let bucket = *self.bucket(id)?;
        let merged = match sibling {
            Some(sib) => {
                if self.parent(sib) != Some(parent) {
                    return Err(StorageError::Corruption(
                        "cannot merge nodes with different parents".into(),
                    ));
                }
                let other = *self.bucket(sib)?;
                Bucket {
                    block_address: bucket.block_address.min(other.block_address),
                    main_size: bucket.size() + other.size(),
                    overflow_size: 0,
                    chain_length: 1,
                }
            }
            None => bucket,
        };

        self.free(id);
        if let Some(sib) = sibling {
            self.free(sib);
        }
        self.node_mut(parent).kind = NodeKind::Leaf(merged);
        Ok(parent)
    }

    /// Detach leaf `id` from its parent, leaving a vacant slot
    pub(crate) fn remove_leaf(&mut self, id: NodeId) -> Result<()> {
        let parent = self
            .parent(id)
            .ok_or_else(|| StorageError::Corruption("cannot remove the root".into()))?;
        let right = match self.node(parent).kind {
            NodeKind::Internal { right, .. } => right == Some(id),
            NodeKind::Leaf(_) => {
                return Err(StorageError::Corruption(format!(
                    "parent of node {} is a leaf",
                    id
                )))
            }
        };
        self.set_child(parent, right, None)?;
        self.free(id);
        Ok(())
    }

    /// Leaf ids in depth-first order, left before right
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            match self.node(id).kind {
                NodeKind::Leaf(_) => leaves.push(id),
                NodeKind::Internal { left, right } => {
                    if let Some(r) = right {
                        stack.push(r);
                    }
                    if let Some(l) = left {
                        stack.push(l);
                    }
                }
            }
        }
        leaves
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Deepest leaf level
    pub fn depth(&self) -> usize {
        self.leaves().into_iter().map(|id| self.level(id)).max().unwrap_or(0)
    }

    /// One row per leaf
    pub fn dump(&self) -> Vec<LeafRecord> {
        self.leaves()
            .into_iter()
            .filter_map(|id| {
                let node = self.node(id);
                node.bucket().map(|b| LeafRecord {
                    route: node.route.clone(),
                    level: node.level,
                    block_address: b.block_address,
                    main_size: b.main_size,
                    overflow_size: b.overflow_size,
                    chain_length: b.chain_length,
                })
            })
            .collect()
    }

    /// Rebuild a trie from leaf rows, creating internal nodes along each route
    pub fn from_dump(rows: &[LeafRecord], max_depth: usize) -> Result<Self> {
        let mut trie = Self::empty(max_depth)?;

        for row in rows {
            if row.route.is_empty() || row.route.len() != row.level || row.level > max_depth {
                return Err(StorageError::Corruption(format!(
                    "invalid trie row: route '{}' at level {} (max depth {})",
                    row.route, row.level, max_depth
                )));
            }
            if row.chain_length == 0 {
                return Err(StorageError::Corruption(format!(
                    "invalid chain length 0 for route '{}'",
                    row.route
                )));
            }

            let bits: Vec<bool> = row
                .route
                .chars()
                .map(|c| match c {
                    '0' => Ok(false),
                    '1' => Ok(true),
                    other => Err(StorageError::Corruption(format!(
                        "invalid character '{}' in route '{}'",
                        other, row.route
                    ))),
                })
                .collect::<Result<_>>()?;

            let mut parent = trie.root;
            for (depth, &right) in bits.iter().enumerate() {
                let last = depth + 1 == bits.len();
                let child = trie.child(parent, right)?;

                if last {
                    if child.is_some() {
                        return Err(StorageError::Corruption(format!(
                            "route '{}' is occupied twice",
                            row.route
                        )));
                    }
                    let leaf = trie.attach_leaf(parent, right, row.block_address)?;
                    *trie.bucket_mut(leaf)? = Bucket {
                        block_address: row.block_address,
                        main_size: row.main_size,
                        overflow_size: row.overflow_size,
                        chain_length: row.chain_length,
                    };
                } else {
                    parent = match child {
                        Some(existing) if !trie.node(existing).is_leaf() => existing,
                        Some(_) => {
                            return Err(StorageError::Corruption(format!(
                                "route '{}' passes through a leaf",
                                row.route
                            )))
                        }
                        None => trie.attach_internal(parent, right)?,
                    };
                }
            }
        }

        Ok(trie)
    }

    fn attach_internal(&mut self, parent: NodeId, right: bool) -> Result<NodeId> {
        let p = self.node(parent);
        let mut route = p.route.clone();
        route.push(if right { '1' } else { '0' });
        let node = TrieNode {
            parent: Some(parent),
            level: p.level + 1,
            route,
            kind: NodeKind::Internal {
                left: None,
                right: None,
            },
        };
        let id = self.alloc(node);
        self.set_child(parent, right, Some(id))?;
        Ok(id)
    }

    fn child(&self, parent: NodeId, right: bool) -> Result<Option<NodeId>> {
        match self.node(parent).kind {
            NodeKind::Internal { left, right: r } => Ok(if right { r } else { left }),
            NodeKind::Leaf(_) => Err(StorageError::Corruption(format!(
                "node {} is a leaf, it has no children",
                parent
            ))),
        }
    }

    fn set_child(&mut self, parent: NodeId, right: bool, child: Option<NodeId>) -> Result<()> {
        match &mut self.node_mut(parent).kind {
            NodeKind::Internal { left, right: r } => {
                if right {
                    *r = child;
                } else {
                    *left = child;
                }
                Ok(())
            }
            NodeKind::Leaf(_) => Err(StorageError::Corruption(format!(
                "cannot attach a child to leaf {}",
                parent
            ))),
        }
    }

    fn alloc(&mut self, node: TrieNode) -> NodeId {
        match self.free_slots.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn free(&mut self, id: NodeId) {
        if self.nodes[id].take().is_some() {
            self.free_slots.push(id);
        }
    }
}
