//! Device Layer
//!
//! A compact model of a Vulkan-class device: explicit queue families, command
//! buffers that record commands as data, fences, binary and timeline
//! semaphores, descriptor sets, pipelines and a swapchain.
//!
//! Submissions execute against host-visible storage, so the whole crate is
//! exercisable without a driver while keeping the exact shape a real backend
//! would implement: `queue_submit2` validates semaphore waits, runs the
//! recorded transfer commands, then signals. Everything above this module
//! talks to it only through the narrow surface re-exported here.

mod buffer;
mod command;
mod descriptor;
mod device;
mod flags;
mod image;
mod pipeline;
mod queue;
mod swapchain;
mod sync;

pub use buffer::{Buffer, BufferDescriptor};
pub use command::{
    BufferBarrierCmd, BufferImageCopy, Command, CommandBuffer, CommandPool, ImageBarrierCmd,
    RenderingAttachment, RenderingInfo,
};
pub use descriptor::{
    DescriptorBinding, DescriptorKind, DescriptorPool, DescriptorSet, DescriptorSetLayout,
    DescriptorWrite,
};
pub use device::{Device, DeviceDescriptor, QueueFamilyDescriptor, SemaphoreSignal, SemaphoreWait, SubmitInfo};
pub use flags::{Access, BufferUsage, ImageAspects, ImageUsage, PipelineStages, QueueCapabilities, ShaderStages};
pub use image::{Image, ImageDescriptor, ImageLayout};
pub use pipeline::{
    ComputePipelineSettings, CullMode, DynamicState, DynamicStateKind, FrontFace,
    GraphicsPipelineSettings, Pipeline, PipelineBindPoint, PipelineSettings, PushConstantRange,
    RayTracingPipelineSettings, ShaderBindingTable, ShaderModule,
};
pub use queue::{Queue, QueueFamily};
pub use swapchain::Swapchain;
pub use sync::{Fence, Semaphore, TimelineSemaphore, GPU_WAIT_TIMEOUT};

/// A three-dimensional extent in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent3 {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3 {
    #[must_use]
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Number of texels covered by this extent.
    #[must_use]
    pub const fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }

    /// Extent of the given mip level, clamped to at least one texel per axis.
    #[must_use]
    pub const fn mip(&self, level: u32) -> Self {
        Self {
            width: max_u32(self.width >> level, 1),
            height: max_u32(self.height >> level, 1),
            depth: max_u32(self.depth >> level, 1),
        }
    }
}

/// A three-dimensional texel offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offset3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Offset3 {
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

const fn max_u32(a: u32, b: u32) -> u32 {
    if a > b { a } else { b }
}
