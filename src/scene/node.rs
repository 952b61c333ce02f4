use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{HeliosError, Result};
use crate::gpu::{DynamicState, ShaderBindingTable, ShaderStages};
use crate::material::{ComputeInstanceId, GraphicsInstanceId, GraphicsMaterialId, RayTracingInstanceId};
use crate::render::Mesh;
use crate::scene::NodeKey;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// The closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Empty,
    GraphicsDynamicState,
    GraphicsMaterial,
    GraphicsPushConstant,
    ComputeMaterial,
    ComputeDispatch,
    RayTracingMaterial,
    RayTracingDispatch,
    Mesh,
}

/// Policy applied to a removed node's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildAction {
    /// Delete the children together with the node.
    Remove,
    /// Hand the subtree to the caller. Not available through
    /// [`SceneGraph::remove`](crate::scene::SceneGraph::remove).
    Extract,
    /// Reparent the children to the front of the removed node's parent.
    Prepend,
    /// Reparent the children at the removed node's former position.
    Insert,
    /// Reparent the children to the end of the removed node's parent.
    Append,
}

/// The typed payload of a node.
#[derive(Debug, Clone)]
pub enum NodePayload {
    Empty,
    /// Dynamic pipeline state applied to every draw below this node.
    GraphicsDynamicState { states: Vec<DynamicState> },
    /// A graphics material instance providing one descriptor set.
    GraphicsMaterial { instance: GraphicsInstanceId },
    /// Push-constant bytes for one range of a graphics material.
    GraphicsPushConstant {
        material: GraphicsMaterialId,
        range_index: u32,
        stages: ShaderStages,
        data: Vec<u8>,
    },
    ComputeMaterial { instance: ComputeInstanceId },
    /// A compute dispatch leaf with its workgroup counts.
    ComputeDispatch { group_count: [u32; 3] },
    RayTracingMaterial { instance: RayTracingInstanceId },
    /// A trace-rays leaf: binding-table regions plus launch dimensions.
    RayTracingDispatch {
        sbt: Arc<ShaderBindingTable>,
        extent: [u32; 3],
    },
    /// A drawable mesh leaf.
    Mesh { mesh: Arc<Mesh> },
}

impl NodePayload {
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        match self {
            Self::Empty => NodeKind::Empty,
            Self::GraphicsDynamicState { .. } => NodeKind::GraphicsDynamicState,
            Self::GraphicsMaterial { .. } => NodeKind::GraphicsMaterial,
            Self::GraphicsPushConstant { .. } => NodeKind::GraphicsPushConstant,
            Self::ComputeMaterial { .. } => NodeKind::ComputeMaterial,
            Self::ComputeDispatch { .. } => NodeKind::ComputeDispatch,
            Self::RayTracingMaterial { .. } => NodeKind::RayTracingMaterial,
            Self::RayTracingDispatch { .. } => NodeKind::RayTracingDispatch,
            Self::Mesh { .. } => NodeKind::Mesh,
        }
    }
}

/// A scene-graph node: hierarchy links, the dual mask pair, and the typed
/// payload.
#[derive(Debug)]
pub struct Node {
    id: u64,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    general_mask: u64,
    type_mask: u64,
    payload: NodePayload,
}

impl Node {
    pub(crate) fn new(payload: NodePayload) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            parent: None,
            children: Vec::new(),
            general_mask: 0,
            type_mask: 0,
            payload,
        }
    }

    /// Process-unique identifier of this node.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    #[must_use]
    pub const fn general_mask(&self) -> u64 {
        self.general_mask
    }

    #[must_use]
    pub const fn type_mask(&self) -> u64 {
        self.type_mask
    }

    pub fn set_general_mask(&mut self, value: u64) {
        self.general_mask = value;
    }

    pub fn set_type_mask(&mut self, value: u64) {
        self.type_mask = value;
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    /// Whether this node satisfies the given capability.
    #[must_use]
    pub fn supports(&self, kind: NodeKind) -> bool {
        self.kind() == kind
    }

    #[must_use]
    pub const fn payload(&self) -> &NodePayload {
        &self.payload
    }

    // ========================================================================
    // Typed accessors
    // ========================================================================

    #[must_use]
    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        match &self.payload {
            NodePayload::Mesh { mesh } => Some(mesh),
            _ => None,
        }
    }

    #[must_use]
    pub fn graphics_instance(&self) -> Option<GraphicsInstanceId> {
        match &self.payload {
            NodePayload::GraphicsMaterial { instance } => Some(*instance),
            _ => None,
        }
    }

    #[must_use]
    pub fn compute_instance(&self) -> Option<ComputeInstanceId> {
        match &self.payload {
            NodePayload::ComputeMaterial { instance } => Some(*instance),
            _ => None,
        }
    }

    #[must_use]
    pub fn ray_tracing_instance(&self) -> Option<RayTracingInstanceId> {
        match &self.payload {
            NodePayload::RayTracingMaterial { instance } => Some(*instance),
            _ => None,
        }
    }

    #[must_use]
    pub fn dynamic_states(&self) -> Option<&[DynamicState]> {
        match &self.payload {
            NodePayload::GraphicsDynamicState { states } => Some(states),
            _ => None,
        }
    }

    #[must_use]
    pub fn push_constant(&self) -> Option<(GraphicsMaterialId, u32, ShaderStages, &[u8])> {
        match &self.payload {
            NodePayload::GraphicsPushConstant {
                material,
                range_index,
                stages,
                data,
            } => Some((*material, *range_index, *stages, data.as_slice())),
            _ => None,
        }
    }

    #[must_use]
    pub fn dispatch_group_count(&self) -> Option<[u32; 3]> {
        match &self.payload {
            NodePayload::ComputeDispatch { group_count } => Some(*group_count),
            _ => None,
        }
    }

    #[must_use]
    pub fn trace_rays(&self) -> Option<(&Arc<ShaderBindingTable>, [u32; 3])> {
        match &self.payload {
            NodePayload::RayTracingDispatch { sbt, extent } => Some((sbt, *extent)),
            _ => None,
        }
    }

    // ========================================================================
    // Typed setters
    // ========================================================================

    pub fn set_mesh(&mut self, mesh: Arc<Mesh>) -> Result<()> {
        match &mut self.payload {
            NodePayload::Mesh { mesh: slot } => {
                *slot = mesh;
                Ok(())
            }
            _ => Err(HeliosError::IncompatibleArgument("node is not a mesh node")),
        }
    }

    pub fn set_graphics_instance(&mut self, instance: GraphicsInstanceId) -> Result<()> {
        match &mut self.payload {
            NodePayload::GraphicsMaterial { instance: slot } => {
                *slot = instance;
                Ok(())
            }
            _ => Err(HeliosError::IncompatibleArgument(
                "node is not a graphics material node",
            )),
        }
    }

    pub fn set_push_constant_data(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.payload {
            NodePayload::GraphicsPushConstant { data, .. } => {
                data.clear();
                data.extend_from_slice(bytes);
                Ok(())
            }
            _ => Err(HeliosError::IncompatibleArgument(
                "node is not a push-constant node",
            )),
        }
    }

    pub fn set_dynamic_states(&mut self, states: Vec<DynamicState>) -> Result<()> {
        match &mut self.payload {
            NodePayload::GraphicsDynamicState { states: slot } => {
                *slot = states;
                Ok(())
            }
            _ => Err(HeliosError::IncompatibleArgument(
                "node is not a dynamic-state node",
            )),
        }
    }

    pub fn set_dispatch_group_count(&mut self, group_count: [u32; 3]) -> Result<()> {
        match &mut self.payload {
            NodePayload::ComputeDispatch { group_count: slot } => {
                *slot = group_count;
                Ok(())
            }
            _ => Err(HeliosError::IncompatibleArgument("node is not a dispatch node")),
        }
    }

    pub fn set_trace_rays_extent(&mut self, extent: [u32; 3]) -> Result<()> {
        match &mut self.payload {
            NodePayload::RayTracingDispatch { extent: slot, .. } => {
                *slot = extent;
                Ok(())
            }
            _ => Err(HeliosError::IncompatibleArgument(
                "node is not a trace-rays node",
            )),
        }
    }
}
