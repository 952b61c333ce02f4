//! Transfer transactions: staging, barrier synthesis, commit and wait.

use std::sync::Arc;

use crate::errors::{HeliosError, Result};
use crate::gpu::{
    Access, BufferBarrierCmd, BufferImageCopy, Command, CommandBuffer, Device, Extent3,
    ImageAspects, ImageBarrierCmd, ImageLayout, Offset3, PipelineStages, SemaphoreSignal,
    SemaphoreWait, SubmitInfo, TimelineSemaphore,
};
use crate::memory::buffer::{TransferBuffer, TransferImage};
use crate::memory::manager::TransferManager;
use crate::memory::ring_pool::StagingSpan;

/// Where a manually staged barrier is placed relative to the copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierLocation {
    BeforeCopy,
    AfterCopy,
}

/// A memory barrier on a buffer, with an optional queue-family transfer.
/// When `dst_family` is set, the buffer is owned by that family after the
/// barrier.
#[derive(Debug, Clone)]
pub struct BufferBarrier {
    pub buffer: Arc<TransferBuffer>,
    pub dst_family: Option<u32>,
    pub src_stage: PipelineStages,
    pub dst_stage: PipelineStages,
    pub src_access: Access,
    pub dst_access: Access,
}

/// A memory barrier on an image subresource range, with an optional
/// queue-family transfer and layout transition.
#[derive(Debug, Clone)]
pub struct ImageBarrier {
    pub image: Arc<TransferImage>,
    pub dst_family: Option<u32>,
    pub src_stage: PipelineStages,
    pub dst_stage: PipelineStages,
    pub src_access: Access,
    pub dst_access: Access,
    pub src_layout: ImageLayout,
    pub dst_layout: ImageLayout,
    pub aspects: ImageAspects,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// A copy from caller memory into a buffer through the staging pool.
#[derive(Debug)]
pub struct StagingBufferCopy<'a> {
    pub dst: Arc<TransferBuffer>,
    pub data: &'a [u8],
    /// Offset into the destination, added to its own sub-range offset.
    pub offset: u64,
    /// Route ownership through the transfer family for the copy, returning
    /// it (or moving it to the barrier's destination family) afterwards.
    pub dst_on_dedicated_transfer: bool,
}

/// A copy between two buffers. Never allocates staging memory.
#[derive(Debug)]
pub struct BufferToBufferCopy {
    pub src: Arc<TransferBuffer>,
    pub dst: Arc<TransferBuffer>,
    /// Bytes to copy; the whole source when `None`.
    pub size: Option<u64>,
    pub src_offset: u64,
    pub dst_offset: u64,
    pub src_on_dedicated_transfer: bool,
    pub dst_on_dedicated_transfer: bool,
}

/// One region of an image copy, tightly packed in the staging data.
#[derive(Debug, Clone)]
pub struct ImageRegion {
    pub data_offset: u64,
    pub aspects: ImageAspects,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
    pub offset: Offset3,
    pub extent: Extent3,
}

/// A copy from caller memory into an image through the staging pool.
#[derive(Debug)]
pub struct StagingImageCopy<'a> {
    pub dst: Arc<TransferImage>,
    pub data: &'a [u8],
    pub regions: Vec<ImageRegion>,
    pub dst_on_dedicated_transfer: bool,
}

/// A copy from an image into a buffer.
#[derive(Debug)]
pub struct ImageToBufferCopy {
    pub src: Arc<TransferImage>,
    pub dst: Arc<TransferBuffer>,
    pub regions: Vec<ImageRegion>,
    pub dst_on_dedicated_transfer: bool,
}

#[derive(Debug)]
struct StagingCopyRecord {
    dst: Arc<TransferBuffer>,
    dst_offset: u64,
    size: u64,
    span: StagingSpan,
}

#[derive(Debug)]
struct BufferCopyRecord {
    src: Arc<TransferBuffer>,
    dst: Arc<TransferBuffer>,
    src_offset: u64,
    dst_offset: u64,
    size: u64,
}

#[derive(Debug)]
struct ImageStagingRecord {
    dst: Arc<TransferImage>,
    regions: Vec<ImageRegion>,
    span: StagingSpan,
}

#[derive(Debug)]
struct ImageToBufferRecord {
    src: Arc<TransferImage>,
    dst: Arc<TransferBuffer>,
    regions: Vec<ImageRegion>,
}

/// A transfer transaction: barriers and copies staged against a
/// [`TransferManager`], committed as one release/acquire/copy plan.
///
/// After `commit` no further staging is accepted; `wait` is only legal after
/// `commit`. Dropping a committed transaction parks its staging spans on the
/// manager for reclaim during the next full wait.
#[derive(Debug)]
pub struct Transaction {
    manager: Arc<TransferManager>,
    index: u64,
    pre_buffer_barriers: Vec<BufferBarrier>,
    post_buffer_barriers: Vec<BufferBarrier>,
    pre_image_barriers: Vec<ImageBarrier>,
    post_image_barriers: Vec<ImageBarrier>,
    staging_copies: Vec<StagingCopyRecord>,
    buffer_copies: Vec<BufferCopyRecord>,
    image_staging_copies: Vec<ImageStagingRecord>,
    image_to_buffer_copies: Vec<ImageToBufferRecord>,
    committed: bool,
    done: bool,
    final_values: Vec<u64>,
}

impl Transaction {
    pub(crate) fn new(manager: Arc<TransferManager>) -> Self {
        Self {
            manager,
            index: 0,
            pre_buffer_barriers: Vec::new(),
            post_buffer_barriers: Vec::new(),
            pre_image_barriers: Vec::new(),
            post_image_barriers: Vec::new(),
            staging_copies: Vec::new(),
            buffer_copies: Vec::new(),
            image_staging_copies: Vec::new(),
            image_to_buffer_copies: Vec::new(),
            committed: false,
            done: false,
            final_values: Vec::new(),
        }
    }

    fn ensure_uncommitted(&self) -> Result<()> {
        if self.committed {
            return Err(HeliosError::InvalidState(
                "cannot stage into a committed transaction",
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Staging
    // ========================================================================

    /// Stage a manually placed buffer barrier.
    pub fn stage_barrier(&mut self, barrier: BufferBarrier, location: BarrierLocation) -> Result<()> {
        self.ensure_uncommitted()?;
        match location {
            BarrierLocation::BeforeCopy => self.pre_buffer_barriers.push(barrier),
            BarrierLocation::AfterCopy => self.post_buffer_barriers.push(barrier),
        }
        Ok(())
    }

    /// Stage a manually placed image barrier.
    pub fn stage_image_barrier(
        &mut self,
        barrier: ImageBarrier,
        location: BarrierLocation,
    ) -> Result<()> {
        self.ensure_uncommitted()?;
        match location {
            BarrierLocation::BeforeCopy => self.pre_image_barriers.push(barrier),
            BarrierLocation::AfterCopy => self.post_image_barriers.push(barrier),
        }
        Ok(())
    }

    /// Stage a copy from caller memory to a buffer. The bytes are copied
    /// into the staging pool immediately, so `copy.data` can be released
    /// right after this call.
    ///
    /// Returns `Ok(false)` when no staging memory is available; the
    /// transaction must then be committed before staging further copies.
    /// With `wait_on_alloc_failure`, outstanding transactions are waited out
    /// (releasing their staging memory) and the allocation retried once.
    ///
    /// With an explicit `barrier`, two barriers are placed around the copy:
    /// the before-barrier ends at the transfer stage, the after-barrier
    /// starts there and ends at the barrier's destination stage and access.
    pub fn stage_buffer_copy(
        &mut self,
        copy: &StagingBufferCopy<'_>,
        barrier: Option<&BufferBarrier>,
        wait_on_alloc_failure: bool,
    ) -> Result<bool> {
        self.ensure_uncommitted()?;
        let size = copy.data.len() as u64;
        if copy.offset + size > copy.dst.size() {
            return Err(HeliosError::IncompatibleArgument(
                "copy exceeds the destination buffer",
            ));
        }

        let pool = self.manager.staging_pool();
        let span = match pool.allocate(size) {
            Some(span) => span,
            None if wait_on_alloc_failure => {
                self.manager.wait()?;
                match pool.allocate(size) {
                    Some(span) => span,
                    None => return Ok(false),
                }
            }
            None => return Ok(false),
        };
        pool.buffer().write(span.offset(), copy.data)?;

        let transfer_family = self.manager.device().transfer_family_index();
        if let Some(barrier) = barrier {
            // Gets the destination from its current state to the transfer
            // state.
            self.pre_buffer_barriers.push(BufferBarrier {
                buffer: copy.dst.clone(),
                dst_family: copy.dst_on_dedicated_transfer.then_some(transfer_family),
                src_stage: barrier.src_stage,
                dst_stage: PipelineStages::TRANSFER,
                src_access: barrier.src_access,
                dst_access: Access::TRANSFER_WRITE,
            });
        }

        let original_family = copy.dst.queue_family();
        self.staging_copies.push(StagingCopyRecord {
            dst: copy.dst.clone(),
            dst_offset: copy.offset,
            size,
            span,
        });

        if let Some(barrier) = barrier {
            // Gets the destination from the transfer state to its final
            // state.
            let dst_family = barrier
                .dst_family
                .or(copy.dst_on_dedicated_transfer.then_some(original_family));
            self.post_buffer_barriers.push(BufferBarrier {
                buffer: copy.dst.clone(),
                dst_family,
                src_stage: PipelineStages::TRANSFER,
                dst_stage: barrier.dst_stage,
                src_access: Access::TRANSFER_WRITE,
                dst_access: barrier.dst_access,
            });
        }
        Ok(true)
    }

    /// Stage a buffer-to-buffer copy with optional barriers around it for
    /// the source and destination.
    pub fn stage_buffer_to_buffer(
        &mut self,
        copy: &BufferToBufferCopy,
        src_barrier: Option<&BufferBarrier>,
        dst_barrier: Option<&BufferBarrier>,
    ) -> Result<()> {
        self.ensure_uncommitted()?;
        let size = copy.size.unwrap_or_else(|| copy.src.size());
        if copy.src_offset + size > copy.src.size() || copy.dst_offset + size > copy.dst.size() {
            return Err(HeliosError::IncompatibleArgument(
                "copy exceeds the source or destination buffer",
            ));
        }

        let transfer_family = self.manager.device().transfer_family_index();
        if let Some(barrier) = src_barrier {
            self.pre_buffer_barriers.push(BufferBarrier {
                buffer: copy.src.clone(),
                dst_family: copy.src_on_dedicated_transfer.then_some(transfer_family),
                src_stage: barrier.src_stage,
                dst_stage: PipelineStages::TRANSFER,
                src_access: barrier.src_access,
                dst_access: Access::TRANSFER_READ,
            });
        }
        if let Some(barrier) = dst_barrier {
            self.pre_buffer_barriers.push(BufferBarrier {
                buffer: copy.dst.clone(),
                dst_family: copy.dst_on_dedicated_transfer.then_some(transfer_family),
                src_stage: barrier.src_stage,
                dst_stage: PipelineStages::TRANSFER,
                src_access: barrier.src_access,
                dst_access: Access::TRANSFER_WRITE,
            });
        }

        let src_original = copy.src.queue_family();
        let dst_original = copy.dst.queue_family();
        self.buffer_copies.push(BufferCopyRecord {
            src: copy.src.clone(),
            dst: copy.dst.clone(),
            src_offset: copy.src_offset,
            dst_offset: copy.dst_offset,
            size,
        });

        if let Some(barrier) = src_barrier {
            let dst_family = barrier
                .dst_family
                .or(copy.src_on_dedicated_transfer.then_some(src_original));
            self.post_buffer_barriers.push(BufferBarrier {
                buffer: copy.src.clone(),
                dst_family,
                src_stage: PipelineStages::TRANSFER,
                dst_stage: barrier.dst_stage,
                src_access: Access::TRANSFER_READ,
                dst_access: barrier.dst_access,
            });
        }
        if let Some(barrier) = dst_barrier {
            let dst_family = barrier
                .dst_family
                .or(copy.dst_on_dedicated_transfer.then_some(dst_original));
            self.post_buffer_barriers.push(BufferBarrier {
                buffer: copy.dst.clone(),
                dst_family,
                src_stage: PipelineStages::TRANSFER,
                dst_stage: barrier.dst_stage,
                src_access: Access::TRANSFER_WRITE,
                dst_access: barrier.dst_access,
            });
        }
        Ok(())
    }

    /// Stage a copy from caller memory to an image through the staging pool.
    /// Same allocation contract as [`Self::stage_buffer_copy`].
    pub fn stage_image_copy(
        &mut self,
        copy: &StagingImageCopy<'_>,
        barrier: Option<&ImageBarrier>,
        wait_on_alloc_failure: bool,
    ) -> Result<bool> {
        self.ensure_uncommitted()?;
        let size = copy.data.len() as u64;
        let pool = self.manager.staging_pool();
        let span = match pool.allocate(size) {
            Some(span) => span,
            None if wait_on_alloc_failure => {
                self.manager.wait()?;
                match pool.allocate(size) {
                    Some(span) => span,
                    None => return Ok(false),
                }
            }
            None => return Ok(false),
        };
        pool.buffer().write(span.offset(), copy.data)?;

        let transfer_family = self.manager.device().transfer_family_index();
        if let Some(barrier) = barrier {
            self.pre_image_barriers.push(ImageBarrier {
                image: copy.dst.clone(),
                dst_family: copy.dst_on_dedicated_transfer.then_some(transfer_family),
                src_stage: barrier.src_stage,
                dst_stage: PipelineStages::TRANSFER,
                src_access: barrier.src_access,
                dst_access: Access::TRANSFER_WRITE,
                src_layout: barrier.src_layout,
                dst_layout: ImageLayout::TransferDstOptimal,
                aspects: barrier.aspects,
                base_mip_level: barrier.base_mip_level,
                level_count: barrier.level_count,
                base_array_layer: barrier.base_array_layer,
                layer_count: barrier.layer_count,
            });
        }

        let original_family = barrier.map(|b| {
            copy.dst
                .queue_family(b.base_mip_level, b.base_array_layer)
        });
        self.image_staging_copies.push(ImageStagingRecord {
            dst: copy.dst.clone(),
            regions: copy.regions.clone(),
            span,
        });

        if let Some(barrier) = barrier {
            let dst_family = barrier.dst_family.or(if copy.dst_on_dedicated_transfer {
                original_family
            } else {
                None
            });
            self.post_image_barriers.push(ImageBarrier {
                image: copy.dst.clone(),
                dst_family,
                src_stage: PipelineStages::TRANSFER,
                dst_stage: barrier.dst_stage,
                src_access: Access::TRANSFER_WRITE,
                dst_access: barrier.dst_access,
                src_layout: ImageLayout::TransferDstOptimal,
                dst_layout: barrier.dst_layout,
                aspects: barrier.aspects,
                base_mip_level: barrier.base_mip_level,
                level_count: barrier.level_count,
                base_array_layer: barrier.base_array_layer,
                layer_count: barrier.layer_count,
            });
        }
        Ok(true)
    }

    /// Stage a copy from an image to a buffer with optional barriers.
    pub fn stage_image_to_buffer(
        &mut self,
        copy: &ImageToBufferCopy,
        src_barrier: Option<&ImageBarrier>,
        dst_barrier: Option<&BufferBarrier>,
    ) -> Result<()> {
        self.ensure_uncommitted()?;
        let transfer_family = self.manager.device().transfer_family_index();

        if let Some(barrier) = src_barrier {
            self.pre_image_barriers.push(ImageBarrier {
                image: copy.src.clone(),
                dst_family: copy.dst_on_dedicated_transfer.then_some(transfer_family),
                src_stage: barrier.src_stage,
                dst_stage: PipelineStages::TRANSFER,
                src_access: barrier.src_access,
                dst_access: Access::TRANSFER_READ,
                src_layout: barrier.src_layout,
                dst_layout: ImageLayout::TransferSrcOptimal,
                aspects: barrier.aspects,
                base_mip_level: barrier.base_mip_level,
                level_count: barrier.level_count,
                base_array_layer: barrier.base_array_layer,
                layer_count: barrier.layer_count,
            });
        }
        if let Some(barrier) = dst_barrier {
            self.pre_buffer_barriers.push(BufferBarrier {
                buffer: copy.dst.clone(),
                dst_family: copy.dst_on_dedicated_transfer.then_some(transfer_family),
                src_stage: barrier.src_stage,
                dst_stage: PipelineStages::TRANSFER,
                src_access: barrier.src_access,
                dst_access: Access::TRANSFER_WRITE,
            });
        }

        let dst_original = copy.dst.queue_family();
        self.image_to_buffer_copies.push(ImageToBufferRecord {
            src: copy.src.clone(),
            dst: copy.dst.clone(),
            regions: copy.regions.clone(),
        });

        if let Some(barrier) = src_barrier {
            self.post_image_barriers.push(ImageBarrier {
                image: copy.src.clone(),
                dst_family: barrier.dst_family,
                src_stage: PipelineStages::TRANSFER,
                dst_stage: barrier.dst_stage,
                src_access: Access::TRANSFER_READ,
                dst_access: barrier.dst_access,
                src_layout: ImageLayout::TransferSrcOptimal,
                dst_layout: barrier.dst_layout,
                aspects: barrier.aspects,
                base_mip_level: barrier.base_mip_level,
                level_count: barrier.level_count,
                base_array_layer: barrier.base_array_layer,
                layer_count: barrier.layer_count,
            });
        }
        if let Some(barrier) = dst_barrier {
            let dst_family = barrier
                .dst_family
                .or(copy.dst_on_dedicated_transfer.then_some(dst_original));
            self.post_buffer_barriers.push(BufferBarrier {
                buffer: copy.dst.clone(),
                dst_family,
                src_stage: PipelineStages::TRANSFER,
                dst_stage: barrier.dst_stage,
                src_access: Access::TRANSFER_WRITE,
                dst_access: barrier.dst_access,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Commit & wait
    // ========================================================================

    /// The per-family timeline values signalled when this transaction's
    /// submissions complete. Only available after `commit`.
    pub fn semaphore_values(&self) -> Result<&[u64]> {
        if !self.committed {
            return Err(HeliosError::InvalidState(
                "semaphore values are only available after commit",
            ));
        }
        Ok(&self.final_values)
    }

    /// Synthesize the barrier plan, submit it together with the copies, and
    /// record the final semaphore values. Legal at most once.
    pub fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Err(HeliosError::InvalidState("transaction was already committed"));
        }
        let manager = self.manager.clone();
        let device = manager.device();
        let family_count = device.queue_families().len();
        let transfer_family = device.transfer_family_index();

        // Serialize with other transactions and wait out the previous one.
        let mut state = manager.state.lock();
        manager.wait_locked(&mut state)?;
        state.transaction_index += 1;
        self.index = state.transaction_index;

        let mut plan = BarrierPlan::new(family_count);
        for barrier in &self.pre_buffer_barriers {
            plan.add_buffer(barrier, Phase::Pre);
        }
        for barrier in &self.post_buffer_barriers {
            plan.add_buffer(barrier, Phase::Post);
        }
        for barrier in &self.pre_image_barriers {
            plan.add_image(barrier, Phase::Pre);
        }
        for barrier in &self.post_image_barriers {
            plan.add_image(barrier, Phase::Post);
        }

        let copies = self.collect_copies();
        log::debug!(
            "committing transfer transaction {}: {} copies, {} buffer barriers, {} image barriers",
            self.index,
            copies.len(),
            self.pre_buffer_barriers.len() + self.post_buffer_barriers.len(),
            self.pre_image_barriers.len() + self.post_image_barriers.len(),
        );

        let semaphores = manager.semaphores();

        // 1. Pre-copy releases: no waits, signal the family's timeline.
        for family in 0..family_count {
            if plan.pre_release[family].is_empty() {
                continue;
            }
            submit_barrier_step(
                device,
                semaphores,
                &manager.pre_release_cmds[family],
                family as u32,
                plan.pre_release[family].drain_commands(),
                false,
                &mut state.values,
            )?;
        }
        // 2. Pre-copy acquires: wait on every other family's current value.
        for family in 0..family_count {
            if plan.pre_acquire[family].is_empty() {
                continue;
            }
            submit_barrier_step(
                device,
                semaphores,
                &manager.pre_acquire_cmds[family],
                family as u32,
                plan.pre_acquire[family].drain_commands(),
                true,
                &mut state.values,
            )?;
        }
        // 3. The copies, on the transfer queue.
        if !copies.is_empty() {
            let cmd = &manager.copy_cmd;
            cmd.reset();
            cmd.begin()?;
            for copy in copies {
                cmd.record(copy)?;
            }
            cmd.end()?;
            submit_step(
                device,
                semaphores,
                cmd,
                transfer_family,
                true,
                &mut state.values,
            )?;
        }
        // 4. Post-copy releases.
        for family in 0..family_count {
            if plan.post_release[family].is_empty() {
                continue;
            }
            submit_barrier_step(
                device,
                semaphores,
                &manager.post_release_cmds[family],
                family as u32,
                plan.post_release[family].drain_commands(),
                false,
                &mut state.values,
            )?;
        }
        // 5. Post-copy acquires.
        for family in 0..family_count {
            if plan.post_acquire[family].is_empty() {
                continue;
            }
            submit_barrier_step(
                device,
                semaphores,
                &manager.post_acquire_cmds[family],
                family as u32,
                plan.post_acquire[family].drain_commands(),
                true,
                &mut state.values,
            )?;
        }

        self.final_values = state.values.clone();
        self.committed = true;
        Ok(())
    }

    fn collect_copies(&self) -> Vec<Command> {
        let pool_buffer = self.manager.staging_pool().buffer();
        let mut copies = Vec::new();
        for record in &self.staging_copies {
            copies.push(Command::CopyBuffer {
                src: pool_buffer.clone(),
                dst: record.dst.buffer().clone(),
                src_offset: record.span.offset(),
                dst_offset: record.dst.offset() + record.dst_offset,
                size: record.size,
            });
        }
        for record in &self.buffer_copies {
            copies.push(Command::CopyBuffer {
                src: record.src.buffer().clone(),
                dst: record.dst.buffer().clone(),
                src_offset: record.src.offset() + record.src_offset,
                dst_offset: record.dst.offset() + record.dst_offset,
                size: record.size,
            });
        }
        for record in &self.image_staging_copies {
            copies.push(Command::CopyBufferToImage {
                src: pool_buffer.clone(),
                dst: record.dst.image().clone(),
                regions: image_copy_regions(&record.regions, record.span.offset()),
            });
        }
        for record in &self.image_to_buffer_copies {
            copies.push(Command::CopyImageToBuffer {
                src: record.src.image().clone(),
                dst: record.dst.buffer().clone(),
                regions: image_copy_regions(&record.regions, record.dst.offset()),
            });
        }
        copies
    }

    /// CPU-side wait on the final semaphore values, then release this
    /// transaction's staging memory. Legal only after `commit`.
    pub fn wait(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        if !self.committed {
            return Err(HeliosError::InvalidState(
                "cannot wait on a transaction before commit",
            ));
        }
        {
            let mut state = self.manager.state.lock();
            // Only the newest committed transaction still needs the wait;
            // any later commit already waited this one out.
            if state.transaction_index == self.index {
                self.manager.wait_locked(&mut state)?;
            }
        }
        let pool = self.manager.staging_pool();
        for record in self.staging_copies.drain(..) {
            pool.release(record.span);
        }
        for record in self.image_staging_copies.drain(..) {
            pool.release(record.span);
        }
        self.done = true;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let spans: Vec<StagingSpan> = self
            .staging_copies
            .drain(..)
            .map(|record| record.span)
            .chain(self.image_staging_copies.drain(..).map(|record| record.span))
            .collect();
        if spans.is_empty() {
            return;
        }
        if self.committed {
            // Release only once the submissions are known to be complete.
            self.manager.state.lock().pending_reclaim.extend(spans);
        } else {
            let pool = self.manager.staging_pool();
            for span in spans {
                pool.release(span);
            }
        }
    }
}

fn image_copy_regions(regions: &[ImageRegion], base_offset: u64) -> Vec<BufferImageCopy> {
    regions
        .iter()
        .map(|region| BufferImageCopy {
            buffer_offset: base_offset + region.data_offset,
            aspects: region.aspects,
            mip_level: region.mip_level,
            base_array_layer: region.base_array_layer,
            layer_count: region.layer_count,
            image_offset: region.offset,
            image_extent: region.extent,
        })
        .collect()
}

// ============================================================================
// Plan synthesis
// ============================================================================

#[derive(Clone, Copy)]
enum Phase {
    Pre,
    Post,
}

#[derive(Default)]
struct FamilyBarriers {
    buffers: Vec<BufferBarrierCmd>,
    images: Vec<ImageBarrierCmd>,
}

impl FamilyBarriers {
    fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.images.is_empty()
    }

    fn drain_commands(&mut self) -> Command {
        Command::PipelineBarrier {
            buffer_barriers: std::mem::take(&mut self.buffers),
            image_barriers: std::mem::take(&mut self.images),
        }
    }
}

/// Per-family release/acquire barrier lists for one commit.
struct BarrierPlan {
    pre_release: Vec<FamilyBarriers>,
    pre_acquire: Vec<FamilyBarriers>,
    post_release: Vec<FamilyBarriers>,
    post_acquire: Vec<FamilyBarriers>,
}

impl BarrierPlan {
    fn new(family_count: usize) -> Self {
        let make = || (0..family_count).map(|_| FamilyBarriers::default()).collect();
        Self {
            pre_release: make(),
            pre_acquire: make(),
            post_release: make(),
            post_acquire: make(),
        }
    }

    fn lists(&mut self, phase: Phase) -> (&mut Vec<FamilyBarriers>, &mut Vec<FamilyBarriers>) {
        match phase {
            Phase::Pre => (&mut self.pre_release, &mut self.pre_acquire),
            Phase::Post => (&mut self.post_release, &mut self.post_acquire),
        }
    }

    fn add_buffer(&mut self, barrier: &BufferBarrier, phase: Phase) {
        let src_family = barrier.buffer.queue_family();
        let dst_family = barrier.dst_family.unwrap_or(src_family);
        let (release, acquire) = self.lists(phase);

        if src_family == dst_family {
            // Same family: a single acquire-style barrier suffices.
            acquire[dst_family as usize].buffers.push(BufferBarrierCmd {
                src_stage: barrier.src_stage,
                src_access: barrier.src_access,
                dst_stage: barrier.dst_stage,
                dst_access: barrier.dst_access,
                src_family: None,
                dst_family: None,
                buffer: barrier.buffer.buffer().clone(),
                offset: barrier.buffer.offset(),
                size: barrier.buffer.size(),
            });
        } else {
            // Ownership transfer: release on the source family, acquire on
            // the destination family.
            release[src_family as usize].buffers.push(BufferBarrierCmd {
                src_stage: barrier.src_stage,
                src_access: barrier.src_access,
                dst_stage: PipelineStages::NONE,
                dst_access: Access::NONE,
                src_family: Some(src_family),
                dst_family: Some(dst_family),
                buffer: barrier.buffer.buffer().clone(),
                offset: barrier.buffer.offset(),
                size: barrier.buffer.size(),
            });
            acquire[dst_family as usize].buffers.push(BufferBarrierCmd {
                src_stage: PipelineStages::NONE,
                src_access: Access::NONE,
                dst_stage: barrier.dst_stage,
                dst_access: barrier.dst_access,
                src_family: Some(src_family),
                dst_family: Some(dst_family),
                buffer: barrier.buffer.buffer().clone(),
                offset: barrier.buffer.offset(),
                size: barrier.buffer.size(),
            });
            barrier.buffer.set_queue_family(dst_family);
        }
    }

    fn add_image(&mut self, barrier: &ImageBarrier, phase: Phase) {
        let src_family = barrier
            .image
            .queue_family(barrier.base_mip_level, barrier.base_array_layer);
        let dst_family = barrier.dst_family.unwrap_or(src_family);
        let (release, acquire) = self.lists(phase);

        let cmd = |src_stage, src_access, dst_stage, dst_access, families: Option<(u32, u32)>| {
            ImageBarrierCmd {
                src_stage,
                src_access,
                dst_stage,
                dst_access,
                old_layout: barrier.src_layout,
                new_layout: barrier.dst_layout,
                src_family: families.map(|(s, _)| s),
                dst_family: families.map(|(_, d)| d),
                image: barrier.image.image().clone(),
                aspects: barrier.aspects,
                base_mip_level: barrier.base_mip_level,
                level_count: barrier.level_count,
                base_array_layer: barrier.base_array_layer,
                layer_count: barrier.layer_count,
            }
        };

        if src_family == dst_family {
            acquire[dst_family as usize].images.push(cmd(
                barrier.src_stage,
                barrier.src_access,
                barrier.dst_stage,
                barrier.dst_access,
                None,
            ));
        } else {
            release[src_family as usize].images.push(cmd(
                barrier.src_stage,
                barrier.src_access,
                PipelineStages::NONE,
                Access::NONE,
                Some((src_family, dst_family)),
            ));
            acquire[dst_family as usize].images.push(cmd(
                PipelineStages::NONE,
                Access::NONE,
                barrier.dst_stage,
                barrier.dst_access,
                Some((src_family, dst_family)),
            ));
            barrier.image.set_queue_family_range(
                dst_family,
                barrier.base_mip_level,
                barrier.level_count,
                barrier.base_array_layer,
                barrier.layer_count,
            );
        }
    }
}

// ============================================================================
// Submission
// ============================================================================

/// Record one barrier command into `cmd` and submit it on `family`'s queue,
/// advancing that family's timeline.
fn submit_barrier_step(
    device: &Arc<Device>,
    semaphores: &[Arc<TimelineSemaphore>],
    cmd: &Arc<CommandBuffer>,
    family: u32,
    barrier: Command,
    wait_on_other_families: bool,
    values: &mut [u64],
) -> Result<()> {
    cmd.reset();
    cmd.begin()?;
    cmd.record(barrier)?;
    cmd.end()?;
    submit_step(device, semaphores, cmd, family, wait_on_other_families, values)
}

fn submit_step(
    device: &Arc<Device>,
    semaphores: &[Arc<TimelineSemaphore>],
    cmd: &Arc<CommandBuffer>,
    family: u32,
    wait_on_other_families: bool,
    values: &mut [u64],
) -> Result<()> {
    let mut waits = Vec::new();
    if wait_on_other_families {
        for (other, semaphore) in semaphores.iter().enumerate() {
            if other as u32 == family {
                continue;
            }
            waits.push(SemaphoreWait::Timeline {
                semaphore: semaphore.clone(),
                value: values[other],
                stage: PipelineStages::ALL_COMMANDS,
            });
        }
    }
    values[family as usize] += 1;
    let submit = SubmitInfo {
        waits,
        command_buffers: vec![cmd.clone()],
        signals: vec![SemaphoreSignal::Timeline {
            semaphore: semaphores[family as usize].clone(),
            value: values[family as usize],
            stage: PipelineStages::ALL_COMMANDS,
        }],
        fence: None,
    };
    device.queue_submit2(&*device.queue(family)?, &[submit])
}
