//! Command pools and command buffers.
//!
//! Command buffers record commands as plain data. The submission executor in
//! [`super::Device`] interprets transfer commands against host storage;
//! rendering commands are retained for inspection, which is what the
//! renderers' tests key off.

use std::sync::Arc;

use parking_lot::Mutex;

use super::buffer::Buffer;
use super::descriptor::DescriptorSet;
use super::flags::{Access, ImageAspects, PipelineStages, ShaderStages};
use super::image::{Image, ImageLayout};
use super::pipeline::{DynamicState, Pipeline, PipelineBindPoint, ShaderBindingTable};
use super::{Extent3, Offset3};
use crate::errors::{HeliosError, Result};

/// A pool command buffers are allocated from, tied to one queue family.
#[derive(Debug)]
pub struct CommandPool {
    family: u32,
}

impl CommandPool {
    pub(crate) const fn new(family: u32) -> Self {
        Self { family }
    }

    #[must_use]
    pub const fn family_index(&self) -> u32 {
        self.family
    }
}

/// A buffer barrier as recorded into a command buffer. `src_family` /
/// `dst_family` are `Some` only for ownership-transfer barriers.
#[derive(Debug, Clone)]
pub struct BufferBarrierCmd {
    pub src_stage: PipelineStages,
    pub src_access: Access,
    pub dst_stage: PipelineStages,
    pub dst_access: Access,
    pub src_family: Option<u32>,
    pub dst_family: Option<u32>,
    pub buffer: Arc<Buffer>,
    pub offset: u64,
    pub size: u64,
}

/// An image barrier as recorded into a command buffer.
#[derive(Debug, Clone)]
pub struct ImageBarrierCmd {
    pub src_stage: PipelineStages,
    pub src_access: Access,
    pub dst_stage: PipelineStages,
    pub dst_access: Access,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_family: Option<u32>,
    pub dst_family: Option<u32>,
    pub image: Arc<Image>,
    pub aspects: ImageAspects,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// One buffer↔image copy region.
#[derive(Debug, Clone)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    pub aspects: ImageAspects,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
    pub image_offset: Offset3,
    pub image_extent: Extent3,
}

/// A color attachment of a dynamic rendering pass.
#[derive(Debug, Clone)]
pub struct RenderingAttachment {
    pub image: Arc<Image>,
    pub clear_color: Option<[f32; 4]>,
}

/// Parameters of a dynamic rendering pass.
#[derive(Debug, Clone)]
pub struct RenderingInfo {
    pub color_attachments: Vec<RenderingAttachment>,
    pub render_area: Extent3,
}

/// A recorded command.
#[derive(Debug, Clone)]
pub enum Command {
    PipelineBarrier {
        buffer_barriers: Vec<BufferBarrierCmd>,
        image_barriers: Vec<ImageBarrierCmd>,
    },
    CopyBuffer {
        src: Arc<Buffer>,
        dst: Arc<Buffer>,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToImage {
        src: Arc<Buffer>,
        dst: Arc<Image>,
        regions: Vec<BufferImageCopy>,
    },
    CopyImageToBuffer {
        src: Arc<Image>,
        dst: Arc<Buffer>,
        regions: Vec<BufferImageCopy>,
    },
    BeginRendering {
        info: RenderingInfo,
    },
    EndRendering,
    BindPipeline {
        pipeline: Arc<Pipeline>,
    },
    BindDescriptorSets {
        bind_point: PipelineBindPoint,
        first_set: u32,
        sets: Vec<Arc<DescriptorSet>>,
    },
    PushConstants {
        stages: ShaderStages,
        offset: u32,
        data: Vec<u8>,
    },
    SetDynamicState {
        state: DynamicState,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Dispatch {
        group_count: [u32; 3],
    },
    TraceRays {
        sbt: Arc<ShaderBindingTable>,
        extent: [u32; 3],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Initial,
    Recording,
    Executable,
}

#[derive(Debug)]
struct Recording {
    state: RecordState,
    commands: Vec<Command>,
}

/// A command buffer recording commands as data.
#[derive(Debug)]
pub struct CommandBuffer {
    id: u64,
    family: u32,
    recording: Mutex<Recording>,
}

impl CommandBuffer {
    pub(crate) fn new(id: u64, family: u32) -> Self {
        Self {
            id,
            family,
            recording: Mutex::new(Recording {
                state: RecordState::Initial,
                commands: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn family_index(&self) -> u32 {
        self.family
    }

    /// Reset to the initial state, discarding recorded commands.
    pub fn reset(&self) {
        let mut recording = self.recording.lock();
        recording.state = RecordState::Initial;
        recording.commands.clear();
    }

    /// Begin recording. Not legal while already recording.
    pub fn begin(&self) -> Result<()> {
        let mut recording = self.recording.lock();
        if recording.state == RecordState::Recording {
            return Err(HeliosError::InvalidState(
                "command buffer is already recording",
            ));
        }
        recording.state = RecordState::Recording;
        recording.commands.clear();
        Ok(())
    }

    /// End recording, making the buffer submittable.
    pub fn end(&self) -> Result<()> {
        let mut recording = self.recording.lock();
        if recording.state != RecordState::Recording {
            return Err(HeliosError::InvalidState("command buffer is not recording"));
        }
        recording.state = RecordState::Executable;
        Ok(())
    }

    /// Record one command. Only legal while recording.
    pub fn record(&self, command: Command) -> Result<()> {
        let mut recording = self.recording.lock();
        if recording.state != RecordState::Recording {
            return Err(HeliosError::InvalidState("command buffer is not recording"));
        }
        recording.commands.push(command);
        Ok(())
    }

    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.recording.lock().state == RecordState::Executable
    }

    #[must_use]
    pub fn command_count(&self) -> usize {
        self.recording.lock().commands.len()
    }

    /// Snapshot of the recorded commands, for execution and inspection.
    #[must_use]
    pub fn commands(&self) -> Vec<Command> {
        self.recording.lock().commands.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_state_machine() {
        let cmd = CommandBuffer::new(1, 0);
        assert!(cmd.record(Command::EndRendering).is_err());
        cmd.begin().unwrap();
        assert!(cmd.begin().is_err());
        cmd.record(Command::Dispatch { group_count: [1; 3] }).unwrap();
        cmd.end().unwrap();
        assert!(cmd.is_executable());
        assert_eq!(cmd.command_count(), 1);
        cmd.reset();
        assert_eq!(cmd.command_count(), 0);
        assert!(!cmd.is_executable());
    }
}
