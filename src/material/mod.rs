//! Materials, Material Instances & Managers
//!
//! A material is the immutable description of a pipeline: shader references,
//! ordered descriptor-set layouts, push-constant ranges, and (graphics) the
//! enabled dynamic-state kinds. A material instance binds concrete resources
//! for exactly one set index of its material.
//!
//! Managers own materials and instances in slotmap arenas; everything else
//! refers to them by key. The arena insertion is what makes the
//! material/instance/manager back-references set-once by construction.

mod compute;
mod descriptors;
mod graphics;
mod layout;
mod pipelines;
mod ray_tracing;

pub use compute::{
    ComputeInstanceDescriptor, ComputeMaterial, ComputeMaterialDescriptor,
    ComputeMaterialInstance, ComputeMaterialManager,
};
pub use graphics::{
    GraphicsInstanceDescriptor, GraphicsMaterial, GraphicsMaterialDescriptor,
    GraphicsMaterialInstance, GraphicsMaterialManager,
};
pub use layout::MaterialLayout;
pub use pipelines::PipelineCache;
pub use ray_tracing::{
    RayTracingInstanceDescriptor, RayTracingMaterial, RayTracingMaterialDescriptor,
    RayTracingMaterialInstance, RayTracingMaterialManager,
};

use std::sync::Arc;

use crate::gpu::{Buffer, Image};

slotmap::new_key_type! {
    pub struct GraphicsMaterialId;
    pub struct GraphicsInstanceId;
    pub struct ComputeMaterialId;
    pub struct ComputeInstanceId;
    pub struct RayTracingMaterialId;
    pub struct RayTracingInstanceId;
}

/// A resource bound by a material instance for its declared set index.
#[derive(Debug, Clone)]
pub enum BoundResource {
    /// CPU-fed uniform values; backed by the manager's pooled uniform buffer.
    Uniform { binding: u32 },
    StorageBuffer { binding: u32, buffer: Arc<Buffer> },
    StorageImage { binding: u32, image: Arc<Image> },
    SampledImage { binding: u32, image: Arc<Image> },
    Sampler { binding: u32, sampler: u64 },
    AccelerationStructure { binding: u32, handle: u64 },
}

/// Reference to one descriptor set resolved during traversal: the instance
/// that provides it and the set index it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRef<K> {
    pub instance: K,
    pub set_index: u32,
}
