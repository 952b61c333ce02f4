//! Traversal & Rendering
//!
//! Traversers walk a [`crate::scene::SceneGraph`] depth-first, propagating
//! material, push-constant and dynamic state down the tree, and emit flat
//! per-frame render data. Renderers turn that render data into recorded
//! command buffers.

mod compute;
mod graphics;
mod mesh;
mod ray_tracing;
mod traverser;

pub use compute::{ComputeDraw, ComputeRenderData, ComputeRenderer, ComputeTraverser};
pub use graphics::{
    GraphicsDraw, GraphicsRenderData, GraphicsRenderer, GraphicsTraverser, PushConstantSlot,
};
pub use mesh::Mesh;
pub use ray_tracing::{
    RayTracingDraw, RayTracingRenderData, RayTracingRenderer, RayTracingTraverser,
};
pub use traverser::{MaskPredicate, TraversalAction};
