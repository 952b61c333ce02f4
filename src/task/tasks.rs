//! The concrete task set for the canonical frame chain.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::errors::Result;
use crate::gpu::{
    CommandBuffer, Device, Fence, GPU_WAIT_TIMEOUT, PipelineStages, Queue, RenderingInfo,
    Semaphore, SemaphoreSignal, SemaphoreWait, SubmitInfo, Swapchain,
};
use crate::material::{ComputeMaterialManager, GraphicsMaterialManager, RayTracingMaterialManager};
use crate::render::{
    ComputeRenderData, ComputeRenderer, ComputeTraverser, GraphicsRenderData, GraphicsRenderer,
    GraphicsTraverser, RayTracingRenderData, RayTracingRenderer, RayTracingTraverser,
};
use crate::scene::SceneGraph;
use crate::task::graph::Task;
use crate::task::resources::{FilteredList, FrameCursor, Indexed, IndexedList};

/// A task wrapping an arbitrary closure.
pub struct FunctionTask {
    name: String,
    function: Box<dyn FnMut() -> Result<()> + Send>,
}

impl FunctionTask {
    pub fn new(name: impl Into<String>, function: impl FnMut() -> Result<()> + Send + 'static) -> Self {
        Self {
            name: name.into(),
            function: Box::new(function),
        }
    }
}

impl Task for FunctionTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        (self.function)()
    }
}

// ============================================================================
// Fences
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceAction {
    Wait,
    Reset,
    WaitAndReset,
}

/// CPU-side wait and/or reset on the current frame's fences.
pub struct FenceTask {
    name: String,
    action: FenceAction,
    fences: IndexedList<Arc<Fence>>,
}

impl FenceTask {
    pub fn new(name: impl Into<String>, action: FenceAction, fences: IndexedList<Arc<Fence>>) -> Self {
        Self {
            name: name.into(),
            action,
            fences,
        }
    }
}

impl Task for FenceTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let fences = self.fences.get();
        if matches!(self.action, FenceAction::Wait | FenceAction::WaitAndReset) {
            for fence in fences {
                fence.wait(GPU_WAIT_TIMEOUT)?;
            }
        }
        if matches!(self.action, FenceAction::Reset | FenceAction::WaitAndReset) {
            for fence in fences {
                fence.reset();
            }
        }
        Ok(())
    }
}

// ============================================================================
// Swapchain
// ============================================================================

/// Acquire the next swapchain image, signalling the frame's available
/// semaphore and publishing the image index.
pub struct AcquireTask {
    name: String,
    swapchain: Arc<Swapchain>,
    available: Indexed<Arc<Semaphore>>,
    image_index: FrameCursor,
    on_recreate: Option<Box<dyn FnMut() + Send>>,
}

impl AcquireTask {
    pub fn new(
        name: impl Into<String>,
        swapchain: Arc<Swapchain>,
        available: Indexed<Arc<Semaphore>>,
        image_index: FrameCursor,
        on_recreate: Option<Box<dyn FnMut() + Send>>,
    ) -> Self {
        Self {
            name: name.into(),
            swapchain,
            available,
            image_index,
            on_recreate,
        }
    }
}

impl Task for AcquireTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let (index, recreate) = self
            .swapchain
            .acquire_next_image(Some(self.available.get().as_ref()), None)?;
        self.image_index.store(index, Ordering::Release);
        if recreate {
            if let Some(callback) = &mut self.on_recreate {
                callback();
            }
        }
        Ok(())
    }
}

/// Present the acquired image, waiting on the frame's done semaphores.
pub struct PresentTask {
    name: String,
    swapchain: Arc<Swapchain>,
    queue: Arc<Queue>,
    image_index: FrameCursor,
    wait_semaphores: IndexedList<Arc<Semaphore>>,
    on_recreate: Option<Box<dyn FnMut() + Send>>,
}

impl PresentTask {
    pub fn new(
        name: impl Into<String>,
        swapchain: Arc<Swapchain>,
        queue: Arc<Queue>,
        image_index: FrameCursor,
        wait_semaphores: IndexedList<Arc<Semaphore>>,
        on_recreate: Option<Box<dyn FnMut() + Send>>,
    ) -> Self {
        Self {
            name: name.into(),
            swapchain,
            queue,
            image_index,
            wait_semaphores,
            on_recreate,
        }
    }
}

impl Task for PresentTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let index = self.image_index.load(Ordering::Acquire);
        let recreate = self
            .swapchain
            .present(&self.queue, index, self.wait_semaphores.get())?;
        if recreate {
            if let Some(callback) = &mut self.on_recreate {
                callback();
            }
        }
        Ok(())
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// Clear the graphics render data and re-traverse the scene graph into it.
pub struct GraphicsTraverseTask {
    name: String,
    traverser: GraphicsTraverser,
    graph: Arc<Mutex<SceneGraph>>,
    manager: Arc<Mutex<GraphicsMaterialManager>>,
    data: Arc<Mutex<GraphicsRenderData>>,
}

impl GraphicsTraverseTask {
    pub fn new(
        name: impl Into<String>,
        traverser: GraphicsTraverser,
        graph: Arc<Mutex<SceneGraph>>,
        manager: Arc<Mutex<GraphicsMaterialManager>>,
        data: Arc<Mutex<GraphicsRenderData>>,
    ) -> Self {
        Self {
            name: name.into(),
            traverser,
            graph,
            manager,
            data,
        }
    }
}

impl Task for GraphicsTraverseTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let graph = self.graph.lock();
        let manager = self.manager.lock();
        let mut data = self.data.lock();
        self.traverser.traverse(&graph, &manager, &mut data);
        Ok(())
    }
}

/// Clear the compute render data and re-traverse the scene graph into it.
pub struct ComputeTraverseTask {
    name: String,
    traverser: ComputeTraverser,
    graph: Arc<Mutex<SceneGraph>>,
    manager: Arc<Mutex<ComputeMaterialManager>>,
    data: Arc<Mutex<ComputeRenderData>>,
}

impl ComputeTraverseTask {
    pub fn new(
        name: impl Into<String>,
        traverser: ComputeTraverser,
        graph: Arc<Mutex<SceneGraph>>,
        manager: Arc<Mutex<ComputeMaterialManager>>,
        data: Arc<Mutex<ComputeRenderData>>,
    ) -> Self {
        Self {
            name: name.into(),
            traverser,
            graph,
            manager,
            data,
        }
    }
}

impl Task for ComputeTraverseTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let graph = self.graph.lock();
        let manager = self.manager.lock();
        let mut data = self.data.lock();
        self.traverser.traverse(&graph, &manager, &mut data);
        Ok(())
    }
}

/// Clear the ray-tracing render data and re-traverse the scene graph into it.
pub struct RayTracingTraverseTask {
    name: String,
    traverser: RayTracingTraverser,
    graph: Arc<Mutex<SceneGraph>>,
    manager: Arc<Mutex<RayTracingMaterialManager>>,
    data: Arc<Mutex<RayTracingRenderData>>,
}

impl RayTracingTraverseTask {
    pub fn new(
        name: impl Into<String>,
        traverser: RayTracingTraverser,
        graph: Arc<Mutex<SceneGraph>>,
        manager: Arc<Mutex<RayTracingMaterialManager>>,
        data: Arc<Mutex<RayTracingRenderData>>,
    ) -> Self {
        Self {
            name: name.into(),
            traverser,
            graph,
            manager,
            data,
        }
    }
}

impl Task for RayTracingTraverseTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let graph = self.graph.lock();
        let manager = self.manager.lock();
        let mut data = self.data.lock();
        self.traverser.traverse(&graph, &manager, &mut data);
        Ok(())
    }
}

// ============================================================================
// Material data
// ============================================================================

/// Repack dirty uniform bytes for the current frame slot.
pub struct UpdateGraphicsMaterialDataTask {
    name: String,
    manager: Arc<Mutex<GraphicsMaterialManager>>,
    frame_index: FrameCursor,
}

impl UpdateGraphicsMaterialDataTask {
    pub fn new(
        name: impl Into<String>,
        manager: Arc<Mutex<GraphicsMaterialManager>>,
        frame_index: FrameCursor,
    ) -> Self {
        Self {
            name: name.into(),
            manager,
            frame_index,
        }
    }
}

impl Task for UpdateGraphicsMaterialDataTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let index = self.frame_index.load(Ordering::Acquire) as usize;
        self.manager.lock().update_uniform_buffers(index)
    }
}

// ============================================================================
// Recording
// ============================================================================

/// Record the current frame's graphics command buffer from the render data.
pub struct GraphicsRenderTask {
    name: String,
    renderer: GraphicsRenderer,
    manager: Arc<Mutex<GraphicsMaterialManager>>,
    data: Arc<Mutex<GraphicsRenderData>>,
    command_buffers: Indexed<Arc<CommandBuffer>>,
    frame_index: FrameCursor,
    rendering_info: RenderingInfo,
}

impl GraphicsRenderTask {
    pub fn new(
        name: impl Into<String>,
        renderer: GraphicsRenderer,
        manager: Arc<Mutex<GraphicsMaterialManager>>,
        data: Arc<Mutex<GraphicsRenderData>>,
        command_buffers: Indexed<Arc<CommandBuffer>>,
        frame_index: FrameCursor,
        rendering_info: RenderingInfo,
    ) -> Self {
        Self {
            name: name.into(),
            renderer,
            manager,
            data,
            command_buffers,
            frame_index,
            rendering_info,
        }
    }
}

impl Task for GraphicsRenderTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let manager = self.manager.lock();
        let data = self.data.lock();
        let frame = self.frame_index.load(Ordering::Acquire) as usize;
        self.renderer.record(
            &manager,
            &data,
            self.command_buffers.get(),
            frame,
            &self.rendering_info,
        )
    }
}

/// Record the current frame's compute command buffer from the render data.
pub struct ComputeRenderTask {
    name: String,
    renderer: ComputeRenderer,
    manager: Arc<Mutex<ComputeMaterialManager>>,
    data: Arc<Mutex<ComputeRenderData>>,
    command_buffers: Indexed<Arc<CommandBuffer>>,
    frame_index: FrameCursor,
}

impl ComputeRenderTask {
    pub fn new(
        name: impl Into<String>,
        renderer: ComputeRenderer,
        manager: Arc<Mutex<ComputeMaterialManager>>,
        data: Arc<Mutex<ComputeRenderData>>,
        command_buffers: Indexed<Arc<CommandBuffer>>,
        frame_index: FrameCursor,
    ) -> Self {
        Self {
            name: name.into(),
            renderer,
            manager,
            data,
            command_buffers,
            frame_index,
        }
    }
}

impl Task for ComputeRenderTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let manager = self.manager.lock();
        let data = self.data.lock();
        let frame = self.frame_index.load(Ordering::Acquire) as usize;
        self.renderer
            .record(&manager, &data, self.command_buffers.get(), frame)
    }
}

/// Record the current frame's ray-tracing command buffer from the render
/// data.
pub struct RayTracingRenderTask {
    name: String,
    renderer: RayTracingRenderer,
    manager: Arc<Mutex<RayTracingMaterialManager>>,
    data: Arc<Mutex<RayTracingRenderData>>,
    command_buffers: Indexed<Arc<CommandBuffer>>,
    frame_index: FrameCursor,
}

impl RayTracingRenderTask {
    pub fn new(
        name: impl Into<String>,
        renderer: RayTracingRenderer,
        manager: Arc<Mutex<RayTracingMaterialManager>>,
        data: Arc<Mutex<RayTracingRenderData>>,
        command_buffers: Indexed<Arc<CommandBuffer>>,
        frame_index: FrameCursor,
    ) -> Self {
        Self {
            name: name.into(),
            renderer,
            manager,
            data,
            command_buffers,
            frame_index,
        }
    }
}

impl Task for RayTracingRenderTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let manager = self.manager.lock();
        let data = self.data.lock();
        let frame = self.frame_index.load(Ordering::Acquire) as usize;
        self.renderer
            .record(&manager, &data, self.command_buffers.get(), frame)
    }
}

// ============================================================================
// Submission
// ============================================================================

/// Submit the current frame's command buffers, waiting on and signalling the
/// frame's binary semaphores.
///
/// The fence is reset immediately before the submission, so a frame aborted
/// earlier in the chain leaves it in its previously signalled state and
/// remains safe to retry.
pub struct SubmitTask {
    name: String,
    device: Arc<Device>,
    queue: Arc<Queue>,
    command_buffers: IndexedList<Arc<CommandBuffer>>,
    wait_semaphores: FilteredList<(Arc<Semaphore>, PipelineStages)>,
    signal_semaphores: IndexedList<Arc<Semaphore>>,
    fence: Option<Indexed<Arc<Fence>>>,
}

impl SubmitTask {
    pub fn new(
        name: impl Into<String>,
        device: Arc<Device>,
        queue: Arc<Queue>,
        command_buffers: IndexedList<Arc<CommandBuffer>>,
        wait_semaphores: FilteredList<(Arc<Semaphore>, PipelineStages)>,
        signal_semaphores: IndexedList<Arc<Semaphore>>,
        fence: Option<Indexed<Arc<Fence>>>,
    ) -> Self {
        Self {
            name: name.into(),
            device,
            queue,
            command_buffers,
            wait_semaphores,
            signal_semaphores,
            fence,
        }
    }
}

impl Task for SubmitTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self) -> Result<()> {
        let fence = self.fence.as_ref().map(|f| f.get().clone());
        if let Some(fence) = &fence {
            fence.reset();
        }
        let waits = self
            .wait_semaphores
            .get()
            .into_iter()
            .map(|(semaphore, stage)| SemaphoreWait::Binary { semaphore, stage })
            .collect();
        let signals = self
            .signal_semaphores
            .get()
            .iter()
            .map(|semaphore| SemaphoreSignal::Binary {
                semaphore: semaphore.clone(),
                stage: PipelineStages::ALL_COMMANDS,
            })
            .collect();
        let submit = SubmitInfo {
            waits,
            command_buffers: self.command_buffers.get().to_vec(),
            signals,
            fence,
        };
        self.device.queue_submit2(&self.queue, &[submit])
    }
}
