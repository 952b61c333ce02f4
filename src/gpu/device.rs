//! The device: queue families, resource creation, and the submission
//! executor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::buffer::{Buffer, BufferDescriptor};
use super::command::{Command, CommandBuffer, CommandPool};
use super::descriptor::DescriptorPool;
use super::flags::{PipelineStages, QueueCapabilities, ShaderStages};
use super::image::{Image, ImageDescriptor};
use super::pipeline::{Pipeline, PipelineSettings, ShaderBindingTable, ShaderModule};
use super::queue::{Queue, QueueFamily};
use super::swapchain::Swapchain;
use super::sync::{Fence, GPU_WAIT_TIMEOUT, Semaphore, TimelineSemaphore};
use super::Extent3;
use crate::errors::{HeliosError, Result};

/// One queue family requested at device creation.
#[derive(Debug, Clone)]
pub struct QueueFamilyDescriptor {
    pub capabilities: QueueCapabilities,
}

/// Creation parameters for a [`Device`].
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub queue_families: Vec<QueueFamilyDescriptor>,
    /// Index of the family transfers are routed through.
    pub transfer_family: u32,
}

impl Default for DeviceDescriptor {
    /// A dedicated graphics, compute and transfer family, like a typical
    /// discrete adapter.
    fn default() -> Self {
        Self {
            queue_families: vec![
                QueueFamilyDescriptor {
                    capabilities: QueueCapabilities::GRAPHICS
                        | QueueCapabilities::COMPUTE
                        | QueueCapabilities::TRANSFER,
                },
                QueueFamilyDescriptor {
                    capabilities: QueueCapabilities::COMPUTE | QueueCapabilities::TRANSFER,
                },
                QueueFamilyDescriptor {
                    capabilities: QueueCapabilities::TRANSFER,
                },
            ],
            transfer_family: 2,
        }
    }
}

/// A semaphore wait of a submission.
#[derive(Debug, Clone)]
pub enum SemaphoreWait {
    Binary {
        semaphore: Arc<Semaphore>,
        stage: PipelineStages,
    },
    Timeline {
        semaphore: Arc<TimelineSemaphore>,
        value: u64,
        stage: PipelineStages,
    },
}

/// A semaphore signal of a submission.
#[derive(Debug, Clone)]
pub enum SemaphoreSignal {
    Binary {
        semaphore: Arc<Semaphore>,
        stage: PipelineStages,
    },
    Timeline {
        semaphore: Arc<TimelineSemaphore>,
        value: u64,
        stage: PipelineStages,
    },
}

/// One submission batch (`queue_submit2` shape).
#[derive(Debug, Clone, Default)]
pub struct SubmitInfo {
    pub waits: Vec<SemaphoreWait>,
    pub command_buffers: Vec<Arc<CommandBuffer>>,
    pub signals: Vec<SemaphoreSignal>,
    pub fence: Option<Arc<Fence>>,
}

/// The device. Owns the queue families and executes submissions.
#[derive(Debug)]
pub struct Device {
    families: Vec<QueueFamily>,
    queues: Vec<Arc<Queue>>,
    transfer_family: u32,
    next_id: AtomicU64,
}

impl Device {
    pub fn new(desc: &DeviceDescriptor) -> Result<Arc<Self>> {
        if desc.queue_families.is_empty() {
            return Err(HeliosError::InvalidState(
                "device needs at least one queue family",
            ));
        }
        let transfer = desc
            .queue_families
            .get(desc.transfer_family as usize)
            .ok_or(HeliosError::InvalidState("transfer family out of range"))?;
        if !transfer.capabilities.contains(QueueCapabilities::TRANSFER) {
            return Err(HeliosError::InvalidState(
                "transfer family does not support transfers",
            ));
        }

        let families: Vec<QueueFamily> = desc
            .queue_families
            .iter()
            .enumerate()
            .map(|(index, f)| QueueFamily::new(index as u32, f.capabilities))
            .collect();
        let queues = families.iter().map(|f| Arc::new(Queue::new(*f))).collect();

        Ok(Arc::new(Self {
            families,
            queues,
            transfer_family: desc.transfer_family,
            next_id: AtomicU64::new(1),
        }))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ========================================================================
    // Queues
    // ========================================================================

    #[must_use]
    pub fn queue_families(&self) -> &[QueueFamily] {
        &self.families
    }

    pub fn queue(&self, family: u32) -> Result<Arc<Queue>> {
        self.queues
            .get(family as usize)
            .cloned()
            .ok_or(HeliosError::IncompatibleArgument("queue family out of range"))
    }

    #[must_use]
    pub fn transfer_family_index(&self) -> u32 {
        self.transfer_family
    }

    pub fn transfer_queue(&self) -> Arc<Queue> {
        self.queues[self.transfer_family as usize].clone()
    }

    // ========================================================================
    // Resource creation
    // ========================================================================

    pub fn create_buffer(&self, desc: &BufferDescriptor) -> Result<Arc<Buffer>> {
        if desc.size == 0 {
            return Err(HeliosError::InvalidState("buffer size must be non-zero"));
        }
        Ok(Arc::new(Buffer::new(self.next_id(), desc)))
    }

    pub fn create_image(&self, desc: &ImageDescriptor) -> Result<Arc<Image>> {
        if desc.mip_levels == 0 || desc.array_layers == 0 || desc.bytes_per_texel == 0 {
            return Err(HeliosError::InvalidState(
                "image needs at least one mip, one layer and a texel size",
            ));
        }
        Ok(Arc::new(Image::new(self.next_id(), desc)))
    }

    pub fn create_command_pool(&self, family: u32) -> Result<Arc<CommandPool>> {
        if family as usize >= self.families.len() {
            return Err(HeliosError::IncompatibleArgument("queue family out of range"));
        }
        Ok(Arc::new(CommandPool::new(family)))
    }

    #[must_use]
    pub fn create_command_buffer(&self, pool: &CommandPool) -> Arc<CommandBuffer> {
        Arc::new(CommandBuffer::new(self.next_id(), pool.family_index()))
    }

    #[must_use]
    pub fn create_fence(&self, signaled: bool) -> Arc<Fence> {
        Arc::new(Fence::new(signaled))
    }

    #[must_use]
    pub fn create_semaphore(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new())
    }

    #[must_use]
    pub fn create_timeline_semaphore(&self, initial: u64) -> Arc<TimelineSemaphore> {
        Arc::new(TimelineSemaphore::new(initial))
    }

    #[must_use]
    pub fn create_shader_module(&self, stage: ShaderStages) -> Arc<ShaderModule> {
        Arc::new(ShaderModule::new(self.next_id(), stage))
    }

    pub fn create_pipeline(&self, settings: PipelineSettings) -> Result<Arc<Pipeline>> {
        match &settings {
            PipelineSettings::Graphics(s) if s.shaders.is_empty() => {
                return Err(HeliosError::InvalidState(
                    "graphics pipeline needs at least one shader",
                ));
            }
            PipelineSettings::RayTracing(s) if s.shaders.is_empty() => {
                return Err(HeliosError::InvalidState(
                    "ray-tracing pipeline needs at least one shader",
                ));
            }
            _ => {}
        }
        let pipeline = Arc::new(Pipeline::new(self.next_id(), settings));
        log::debug!("created pipeline {} ({:?})", pipeline.id(), pipeline.bind_point());
        Ok(pipeline)
    }

    #[must_use]
    pub fn create_descriptor_pool(&self, max_sets: u32) -> Arc<DescriptorPool> {
        Arc::new(DescriptorPool::new(self.next_id(), max_sets))
    }

    #[must_use]
    pub fn create_shader_binding_table(&self, pipeline: Arc<Pipeline>) -> Arc<ShaderBindingTable> {
        Arc::new(ShaderBindingTable::new(self.next_id(), pipeline))
    }

    #[must_use]
    pub fn create_swapchain(&self, image_count: u32, extent: Extent3) -> Arc<Swapchain> {
        Arc::new(Swapchain::new(self, image_count, extent))
    }

    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id()
    }

    // ========================================================================
    // Waits & submission
    // ========================================================================

    /// CPU-side wait until every semaphore has reached its value.
    pub fn wait_semaphores(
        &self,
        semaphores: &[Arc<TimelineSemaphore>],
        values: &[u64],
        timeout: Duration,
    ) -> Result<()> {
        if semaphores.len() != values.len() {
            return Err(HeliosError::IncompatibleArgument(
                "semaphore and value counts differ",
            ));
        }
        for (semaphore, value) in semaphores.iter().zip(values) {
            semaphore.wait(*value, timeout)?;
        }
        Ok(())
    }

    /// Submit batches to a queue. Waits are validated, recorded transfer
    /// commands are executed, then signals and the fence fire.
    pub fn queue_submit2(&self, queue: &Queue, submits: &[SubmitInfo]) -> Result<()> {
        for submit in submits {
            for wait in &submit.waits {
                match wait {
                    SemaphoreWait::Binary { semaphore, .. } => {
                        if !semaphore.consume() {
                            return Err(HeliosError::Device(
                                "binary semaphore wait was not signalled".into(),
                            ));
                        }
                    }
                    SemaphoreWait::Timeline { semaphore, value, .. } => {
                        semaphore.wait(*value, GPU_WAIT_TIMEOUT)?;
                    }
                }
            }

            for cmd in &submit.command_buffers {
                if !cmd.is_executable() {
                    return Err(HeliosError::Device(
                        "submitted command buffer is not executable".into(),
                    ));
                }
                if cmd.family_index() != queue.family_index() {
                    return Err(HeliosError::Device(
                        "command buffer was allocated for a different queue family".into(),
                    ));
                }
                self.execute(cmd.commands())?;
            }

            for signal in &submit.signals {
                match signal {
                    SemaphoreSignal::Binary { semaphore, .. } => semaphore.signal(),
                    SemaphoreSignal::Timeline { semaphore, value, .. } => semaphore.signal(*value),
                }
            }
            if let Some(fence) = &submit.fence {
                fence.signal();
            }
        }
        Ok(())
    }

    fn execute(&self, commands: Vec<Command>) -> Result<()> {
        for command in commands {
            match command {
                Command::CopyBuffer {
                    src,
                    dst,
                    src_offset,
                    dst_offset,
                    size,
                } => {
                    let bytes = src.read_raw(src_offset, size)?;
                    dst.write_raw(dst_offset, &bytes)?;
                }
                Command::CopyBufferToImage { src, dst, regions } => {
                    for region in &regions {
                        let layer_size =
                            region.image_extent.texel_count() * u64::from(dst.bytes_per_texel());
                        for layer in 0..region.layer_count {
                            let offset = region.buffer_offset + u64::from(layer) * layer_size;
                            let bytes = src.read_raw(offset, layer_size)?;
                            dst.write_region(
                                region.mip_level,
                                region.base_array_layer + layer,
                                region.image_offset,
                                region.image_extent,
                                &bytes,
                            )?;
                        }
                    }
                }
                Command::CopyImageToBuffer { src, dst, regions } => {
                    for region in &regions {
                        let layer_size =
                            region.image_extent.texel_count() * u64::from(src.bytes_per_texel());
                        for layer in 0..region.layer_count {
                            let offset = region.buffer_offset + u64::from(layer) * layer_size;
                            let bytes = src.read_region(
                                region.mip_level,
                                region.base_array_layer + layer,
                                region.image_offset,
                                region.image_extent,
                            )?;
                            dst.write_raw(offset, &bytes)?;
                        }
                    }
                }
                // Barriers and rendering commands carry no work in this model.
                _ => {}
            }
        }
        Ok(())
    }
}
