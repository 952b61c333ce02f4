use std::sync::atomic::{AtomicU32, Ordering};

use slotmap::SlotMap;

use crate::errors::{HeliosError, Result};
use crate::scene::node::{ChildAction, Node, NodeKind, NodePayload};
use crate::scene::NodeKey;

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// A scene graph owning its root node and transitively all descendants.
///
/// Not intrinsically thread-safe; a single graph is traversed by at most one
/// traverser at a time.
#[derive(Debug)]
pub struct SceneGraph {
    id: u32,
    nodes: SlotMap<NodeKey, Node>,
    root: NodeKey,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(NodePayload::Empty));
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            nodes,
            root,
        }
    }

    /// Process-unique identifier of this graph.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub const fn root(&self) -> NodeKey {
        self.root
    }

    #[must_use]
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    #[must_use]
    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    /// Total number of nodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        // The root always exists.
        false
    }

    #[must_use]
    pub fn kind(&self, key: NodeKey) -> Option<NodeKind> {
        self.nodes.get(key).map(Node::kind)
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Append a new child under `parent`.
    pub fn add_child(&mut self, parent: NodeKey, payload: NodePayload) -> Result<NodeKey> {
        let index = self.child_count(parent)?;
        self.insert_child(parent, payload, index)
    }

    /// Insert a new child under `parent` at `index`; appends when `index`
    /// exceeds the current child count.
    pub fn insert_child(
        &mut self,
        parent: NodeKey,
        payload: NodePayload,
        index: usize,
    ) -> Result<NodeKey> {
        let count = self.child_count(parent)?;
        let key = self.nodes.insert(Node::new(payload));
        self.nodes[key].parent = Some(parent);
        let children = &mut self.nodes[parent].children;
        children.insert(index.min(count), key);
        Ok(key)
    }

    fn child_count(&self, parent: NodeKey) -> Result<usize> {
        self.nodes
            .get(parent)
            .map(|node| node.children.len())
            .ok_or(HeliosError::IncompatibleArgument(
                "parent node does not belong to this graph",
            ))
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove a non-root node, applying `action` to its children.
    pub fn remove(&mut self, key: NodeKey, action: ChildAction) -> Result<()> {
        if key == self.root {
            return Err(HeliosError::InvalidState("cannot remove the root node"));
        }
        if action == ChildAction::Extract {
            return Err(HeliosError::IncompatibleArgument(
                "extraction is not available through remove",
            ));
        }
        let node = self
            .nodes
            .get(key)
            .ok_or(HeliosError::IncompatibleArgument(
                "node does not belong to this graph",
            ))?;
        let parent = node.parent.expect("non-root node always has a parent");
        let children = node.children.clone();

        // Detach from the parent, remembering the position for Insert.
        let position = {
            let siblings = &mut self.nodes[parent].children;
            let position = siblings
                .iter()
                .position(|&c| c == key)
                .expect("child is listed by its parent");
            siblings.remove(position);
            position
        };

        match action {
            ChildAction::Remove => {
                self.remove_subtree(key);
                return Ok(());
            }
            ChildAction::Prepend => self.splice_children(parent, &children, 0),
            ChildAction::Insert => self.splice_children(parent, &children, position),
            ChildAction::Append => {
                let end = self.nodes[parent].children.len();
                self.splice_children(parent, &children, end);
            }
            ChildAction::Extract => unreachable!(),
        }
        self.nodes.remove(key);
        Ok(())
    }

    /// Reparent `children` into `parent` starting at `index`, preserving
    /// their relative order.
    fn splice_children(&mut self, parent: NodeKey, children: &[NodeKey], index: usize) {
        for (i, &child) in children.iter().enumerate() {
            self.nodes[child].parent = Some(parent);
            self.nodes[parent].children.insert(index + i, child);
        }
    }

    /// Recursively delete all children of `key`.
    pub fn clear_children(&mut self, key: NodeKey) -> Result<()> {
        let children = self
            .nodes
            .get(key)
            .map(|node| node.children.clone())
            .ok_or(HeliosError::IncompatibleArgument(
                "node does not belong to this graph",
            ))?;
        for child in children {
            self.remove_subtree(child);
        }
        self.nodes[key].children.clear();
        Ok(())
    }

    fn remove_subtree(&mut self, key: NodeKey) {
        let mut stack = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether `node` is a strict descendant of `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, node: NodeKey, ancestor: NodeKey) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = self.nodes.get(key).and_then(|n| n.parent);
        }
        false
    }

    /// Depth-first pre-order iteration in declared child order, starting at
    /// the root.
    pub fn iter_depth_first(&self) -> impl Iterator<Item = NodeKey> + '_ {
        DepthFirstIter {
            graph: self,
            stack: vec![self.root],
        }
    }
}

struct DepthFirstIter<'a> {
    graph: &'a SceneGraph,
    stack: Vec<NodeKey>,
}

impl Iterator for DepthFirstIter<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<NodeKey> {
        let key = self.stack.pop()?;
        if let Some(node) = self.graph.node(key) {
            self.stack.extend(node.children.iter().rev());
        }
        Some(key)
    }
}
