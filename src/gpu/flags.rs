//! Flag types shared across the device layer.

use bitflags::bitflags;

bitflags! {
    /// Pipeline stage mask (synchronization2 style).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStages: u64 {
        const NONE = 0;
        const HOST = 1 << 0;
        const TRANSFER = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 4;
        const COMPUTE_SHADER = 1 << 5;
        const RAY_TRACING_SHADER = 1 << 6;
        const ALL_COMMANDS = 1 << 7;
    }
}

bitflags! {
    /// Memory access mask (synchronization2 style).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Access: u64 {
        const NONE = 0;
        const HOST_READ = 1 << 0;
        const HOST_WRITE = 1 << 1;
        const TRANSFER_READ = 1 << 2;
        const TRANSFER_WRITE = 1 << 3;
        const SHADER_READ = 1 << 4;
        const SHADER_WRITE = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const MEMORY_READ = 1 << 7;
        const MEMORY_WRITE = 1 << 8;
    }
}

bitflags! {
    /// Buffer usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const STORAGE = 1 << 3;
        const VERTEX = 1 << 4;
        const INDEX = 1 << 5;
    }
}

bitflags! {
    /// Image usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const SAMPLED = 1 << 2;
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
    }
}

bitflags! {
    /// Shader stage flags, used by descriptor bindings and push constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const RAYGEN = 1 << 3;
        const MISS = 1 << 4;
        const CLOSEST_HIT = 1 << 5;
    }
}

bitflags! {
    /// Capabilities of a queue family.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueCapabilities: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

bitflags! {
    /// Image aspect flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageAspects: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}
