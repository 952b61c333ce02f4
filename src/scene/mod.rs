//! Scene Graph
//!
//! A tree of typed nodes that declaratively describe per-draw GPU state.
//! Nodes live in a slotmap arena owned by the graph and are addressed by
//! [`NodeKey`]; payloads are a tagged variant per node kind. Traversers in
//! [`crate::render`] linearize a graph into flat render data.

mod graph;
mod node;

pub use graph::SceneGraph;
pub use node::{ChildAction, Node, NodeKind, NodePayload};

slotmap::new_key_type! {
    /// Handle of a node within its owning [`SceneGraph`].
    pub struct NodeKey;
}
