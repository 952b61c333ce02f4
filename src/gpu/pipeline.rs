use std::sync::Arc;

use super::descriptor::DescriptorSetLayout;
use super::flags::ShaderStages;

/// A compiled shader module handle.
#[derive(Debug)]
pub struct ShaderModule {
    id: u64,
    stage: ShaderStages,
}

impl ShaderModule {
    pub(crate) const fn new(id: u64, stage: ShaderStages) -> Self {
        Self { id, stage }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn stage(&self) -> ShaderStages {
        self.stage
    }
}

/// Where a pipeline binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
    RayTracing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

/// Pipeline state supplied at record time rather than baked into the
/// pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicState {
    Viewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    Scissor {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    CullMode(CullMode),
    FrontFace(FrontFace),
}

/// The kind of a [`DynamicState`], used by materials to declare which states
/// they expect at record time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicStateKind {
    Viewport,
    Scissor,
    CullMode,
    FrontFace,
}

impl DynamicState {
    #[must_use]
    pub const fn kind(&self) -> DynamicStateKind {
        match self {
            Self::Viewport { .. } => DynamicStateKind::Viewport,
            Self::Scissor { .. } => DynamicStateKind::Scissor,
            Self::CullMode(_) => DynamicStateKind::CullMode,
            Self::FrontFace(_) => DynamicStateKind::FrontFace,
        }
    }
}

/// A push-constant range as `{offset, size, stages}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConstantRange {
    pub offset: u32,
    pub size: u32,
    pub stages: ShaderStages,
}

#[derive(Debug, Clone)]
pub struct GraphicsPipelineSettings {
    pub shaders: Vec<Arc<ShaderModule>>,
    pub set_layouts: Vec<DescriptorSetLayout>,
    pub push_constant_ranges: Vec<PushConstantRange>,
    pub dynamic_states: Vec<DynamicStateKind>,
}

#[derive(Debug, Clone)]
pub struct ComputePipelineSettings {
    pub shader: Arc<ShaderModule>,
    pub set_layouts: Vec<DescriptorSetLayout>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

#[derive(Debug, Clone)]
pub struct RayTracingPipelineSettings {
    pub shaders: Vec<Arc<ShaderModule>>,
    pub set_layouts: Vec<DescriptorSetLayout>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

#[derive(Debug, Clone)]
pub enum PipelineSettings {
    Graphics(GraphicsPipelineSettings),
    Compute(ComputePipelineSettings),
    RayTracing(RayTracingPipelineSettings),
}

impl PipelineSettings {
    #[must_use]
    pub const fn bind_point(&self) -> PipelineBindPoint {
        match self {
            Self::Graphics(_) => PipelineBindPoint::Graphics,
            Self::Compute(_) => PipelineBindPoint::Compute,
            Self::RayTracing(_) => PipelineBindPoint::RayTracing,
        }
    }
}

/// A compiled pipeline handle.
#[derive(Debug)]
pub struct Pipeline {
    id: u64,
    settings: PipelineSettings,
}

impl Pipeline {
    pub(crate) const fn new(id: u64, settings: PipelineSettings) -> Self {
        Self { id, settings }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn bind_point(&self) -> PipelineBindPoint {
        self.settings.bind_point()
    }

    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }
}

/// A shader binding table for a ray-tracing pipeline.
#[derive(Debug)]
pub struct ShaderBindingTable {
    id: u64,
    pipeline: Arc<Pipeline>,
}

impl ShaderBindingTable {
    pub(crate) const fn new(id: u64, pipeline: Arc<Pipeline>) -> Self {
        Self { id, pipeline }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}
