//! Task Graph Integration Tests
//!
//! Tests for:
//! - Dependency ordering and wait-count validation
//! - Cycle rejection and lifecycle errors
//! - Frame cursor advancement and indexed resources
//! - The canonical frame chain over several frames
//! - Error short-circuiting that keeps the frame fence retryable

use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use helios::errors::HeliosError;
use helios::gpu::{
    Command, DescriptorBinding, DescriptorKind, DescriptorSetLayout, Device, DeviceDescriptor,
    Extent3, PipelineStages, RenderingAttachment, RenderingInfo, ShaderStages,
};
use helios::material::{
    GraphicsInstanceDescriptor, GraphicsMaterialDescriptor, GraphicsMaterialManager, MaterialLayout,
};
use helios::render::{GraphicsRenderData, GraphicsRenderer, GraphicsTraverser, Mesh};
use helios::scene::{NodePayload, SceneGraph};
use helios::task::{
    AcquireTask, FenceAction, FenceTask, FilteredList, FunctionTask, GraphicsRenderTask,
    GraphicsTraverseTask, Indexed, IndexedList, PresentTask, SubmitTask, TaskGraph,
    UpdateGraphicsMaterialDataTask,
};

fn new_task_graph(max_frames: u32) -> TaskGraph {
    let _ = env_logger::builder().is_test(true).try_init();
    TaskGraph::new(max_frames).unwrap()
}

// ============================================================================
// Ordering & lifecycle
// ============================================================================

fn logging_task(name: &str, log: Arc<Mutex<Vec<String>>>) -> Box<FunctionTask> {
    let tag = name.to_string();
    Box::new(FunctionTask::new(name, move || {
        log.lock().push(tag.clone());
        Ok(())
    }))
}

#[test]
fn tasks_run_in_dependency_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut graph = new_task_graph(2);
    let c = graph.add_task(logging_task("c", log.clone())).unwrap();
    let a = graph.add_task(logging_task("a", log.clone())).unwrap();
    let b = graph.add_task(logging_task("b", log.clone())).unwrap();
    graph.depends_on(c, &[b]).unwrap();
    graph.depends_on(b, &[a]).unwrap();
    graph.finalize().unwrap();

    graph.execute_frame().unwrap();
    assert_eq!(*log.lock(), vec!["a", "b", "c"]);

    // A second pass resets the wait counters and runs again.
    graph.execute_frame().unwrap();
    assert_eq!(log.lock().len(), 6);
}

#[test]
fn cyclic_graphs_are_rejected() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut graph = new_task_graph(1);
    let a = graph.add_task(logging_task("a", log.clone())).unwrap();
    let b = graph.add_task(logging_task("b", log.clone())).unwrap();
    graph.depends_on(a, &[b]).unwrap();
    graph.depends_on(b, &[a]).unwrap();
    assert!(matches!(
        graph.finalize(),
        Err(HeliosError::InvalidState(_))
    ));
}

#[test]
fn lifecycle_misuse_is_rejected() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut graph = new_task_graph(1);
    assert!(matches!(
        graph.execute_frame(),
        Err(HeliosError::InvalidState(_))
    ));
    graph.add_task(logging_task("a", log.clone())).unwrap();
    graph.finalize().unwrap();
    assert!(matches!(
        graph.add_task(logging_task("b", log)),
        Err(HeliosError::InvalidState(_))
    ));
    assert!(matches!(
        graph.finalize(),
        Err(HeliosError::InvalidState(_))
    ));
}

#[test]
fn failing_tasks_abort_the_frame() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut graph = new_task_graph(1);
    let first = graph.add_task(logging_task("first", log.clone())).unwrap();
    let failing = graph
        .add_task(Box::new(FunctionTask::new("failing", || {
            Err(HeliosError::Device("lost".into()))
        })))
        .unwrap();
    let last = graph.add_task(logging_task("last", log.clone())).unwrap();
    graph.depends_on(failing, &[first]).unwrap();
    graph.depends_on(last, &[failing]).unwrap();
    graph.finalize().unwrap();

    assert!(matches!(
        graph.execute_frame(),
        Err(HeliosError::Device(_))
    ));
    assert_eq!(*log.lock(), vec!["first"]);
}

#[test]
fn frame_cursor_wraps_at_max_frames() {
    let mut graph = new_task_graph(3);
    graph.finalize().unwrap();
    assert_eq!(graph.frame_index(), 0);
    graph.advance_frame();
    graph.advance_frame();
    assert_eq!(graph.frame_index(), 2);
    graph.advance_frame();
    assert_eq!(graph.frame_index(), 0);
}

// ============================================================================
// The canonical frame chain
// ============================================================================

struct FrameChain {
    device: Arc<Device>,
    graph: TaskGraph,
    command_buffers: Vec<Arc<helios::gpu::CommandBuffer>>,
    fences: Vec<Arc<helios::gpu::Fence>>,
}

/// Traverse → AwaitFence → Acquire → UpdateMaterialData → Render → Submit →
/// Present over `max_frames` frame slots.
fn build_frame_chain(max_frames: usize, shaders: bool) -> FrameChain {
    let device = Device::new(&DeviceDescriptor::default()).unwrap();
    let mut manager = GraphicsMaterialManager::new(device.clone(), max_frames).unwrap();

    let set_layout = DescriptorSetLayout::new(vec![DescriptorBinding {
        binding: 0,
        kind: DescriptorKind::UniformBuffer,
        count: 1,
        stages: ShaderStages::VERTEX,
    }]);
    let material = manager.add_material(GraphicsMaterialDescriptor {
        shaders: if shaders {
            vec![
                device.create_shader_module(ShaderStages::VERTEX),
                device.create_shader_module(ShaderStages::FRAGMENT),
            ]
        } else {
            vec![]
        },
        layout: MaterialLayout::new(vec![set_layout], vec![]),
        dynamic_states: vec![],
    });
    let inst = manager
        .add_instance(
            material,
            GraphicsInstanceDescriptor {
                set_index: 0,
                resources: vec![helios::material::BoundResource::Uniform { binding: 0 }],
                uniform_data: vec![0u8; 16],
            },
        )
        .unwrap();

    let mut scene = SceneGraph::new();
    let mtl_node = scene
        .add_child(scene.root(), NodePayload::GraphicsMaterial { instance: inst })
        .unwrap();
    scene
        .add_child(
            mtl_node,
            NodePayload::Mesh {
                mesh: Arc::new(Mesh::new(3, 0)),
            },
        )
        .unwrap();

    let scene = Arc::new(Mutex::new(scene));
    let manager = Arc::new(Mutex::new(manager));
    let render_data = Arc::new(Mutex::new(GraphicsRenderData::new()));

    let swapchain = device.create_swapchain(3, Extent3::new(64, 64, 1));
    let queue = device.queue(0).unwrap();
    let pool = device.create_command_pool(0).unwrap();

    let command_buffers: Vec<_> = (0..max_frames)
        .map(|_| device.create_command_buffer(&pool))
        .collect();
    let fences: Vec<_> = (0..max_frames).map(|_| device.create_fence(true)).collect();
    let available: Vec<_> = (0..max_frames).map(|_| device.create_semaphore()).collect();
    let done: Vec<_> = (0..max_frames).map(|_| device.create_semaphore()).collect();

    let mut graph = new_task_graph(max_frames as u32);
    let frame = graph.frame_cursor();
    let image = graph.image_cursor();

    let rendering_info = RenderingInfo {
        color_attachments: vec![RenderingAttachment {
            image: swapchain.image(0).unwrap().clone(),
            clear_color: Some([0.0, 0.0, 0.0, 1.0]),
        }],
        render_area: Extent3::new(64, 64, 1),
    };

    let traverse = graph
        .add_task(Box::new(GraphicsTraverseTask::new(
            "traverse",
            GraphicsTraverser::new(),
            scene.clone(),
            manager.clone(),
            render_data.clone(),
        )))
        .unwrap();
    let await_fence = graph
        .add_task(Box::new(FenceTask::new(
            "await fence",
            FenceAction::Wait,
            IndexedList::new(
                fences.iter().map(|f| vec![f.clone()]).collect(),
                frame.clone(),
            ),
        )))
        .unwrap();
    let acquire = graph
        .add_task(Box::new(AcquireTask::new(
            "acquire",
            swapchain.clone(),
            Indexed::new(available.clone(), frame.clone()),
            image.clone(),
            None,
        )))
        .unwrap();
    let update = graph
        .add_task(Box::new(UpdateGraphicsMaterialDataTask::new(
            "update material data",
            manager.clone(),
            frame.clone(),
        )))
        .unwrap();
    let render = graph
        .add_task(Box::new(GraphicsRenderTask::new(
            "render",
            GraphicsRenderer::new(),
            manager.clone(),
            render_data.clone(),
            Indexed::new(command_buffers.clone(), frame.clone()),
            frame.clone(),
            rendering_info,
        )))
        .unwrap();
    let submit = graph
        .add_task(Box::new(SubmitTask::new(
            "submit",
            device.clone(),
            queue.clone(),
            IndexedList::new(
                command_buffers.iter().map(|c| vec![c.clone()]).collect(),
                frame.clone(),
            ),
            FilteredList::new(
                available
                    .iter()
                    .map(|s| (s.clone(), PipelineStages::COLOR_ATTACHMENT_OUTPUT))
                    .collect(),
                frame.clone(),
                |index, frame| index as u32 == frame,
            ),
            IndexedList::new(done.iter().map(|s| vec![s.clone()]).collect(), frame.clone()),
            Some(Indexed::new(fences.clone(), frame.clone())),
        )))
        .unwrap();
    let present = graph
        .add_task(Box::new(PresentTask::new(
            "present",
            swapchain,
            queue,
            image,
            IndexedList::new(done.iter().map(|s| vec![s.clone()]).collect(), frame),
            None,
        )))
        .unwrap();

    graph.depends_on(await_fence, &[traverse]).unwrap();
    graph.depends_on(acquire, &[await_fence]).unwrap();
    graph.depends_on(update, &[acquire]).unwrap();
    graph.depends_on(render, &[update]).unwrap();
    graph.depends_on(submit, &[render]).unwrap();
    graph.depends_on(present, &[submit]).unwrap();
    graph.finalize().unwrap();

    FrameChain {
        device,
        graph,
        command_buffers,
        fences,
    }
}

#[test]
fn canonical_chain_runs_across_frames() {
    let mut chain = build_frame_chain(2, true);

    for frame in 0..4u32 {
        chain.graph.execute_frame().unwrap();

        // The frame's command buffer was re-recorded this pass: begin
        // rendering, bind pipeline, bind descriptors, draw, end rendering.
        let slot = (frame % 2) as usize;
        let commands = chain.command_buffers[slot].commands();
        assert_eq!(commands.len(), 5);
        assert!(matches!(commands[0], Command::BeginRendering { .. }));
        assert!(matches!(commands.last(), Some(Command::EndRendering)));

        // Submission re-signalled the frame fence.
        assert!(chain.fences[slot].is_signaled());

        chain.graph.advance_frame();
        assert_eq!(chain.graph.frame_index(), (frame + 1) % 2);
    }
}

#[test]
fn descriptor_sets_follow_the_frame_index() {
    let mut chain = build_frame_chain(2, true);

    let mut bound_sets = Vec::new();
    for frame in 0..2usize {
        chain.graph.execute_frame().unwrap();
        for command in chain.command_buffers[frame].commands() {
            if let Command::BindDescriptorSets { sets, .. } = command {
                bound_sets.push(sets[0].id());
            }
        }
        chain.graph.advance_frame();
    }
    // Each frame slot bound its own per-frame descriptor set.
    assert_eq!(bound_sets.len(), 2);
    assert_ne!(bound_sets[0], bound_sets[1]);
}

#[test]
fn render_failure_skips_submit_and_keeps_the_fence_signalled() {
    // A material without shaders makes pipeline creation fail in Render.
    let mut chain = build_frame_chain(2, false);

    let result = chain.graph.execute_frame();
    assert!(matches!(result, Err(HeliosError::InvalidState(_))));

    // Submit never ran: the fence is still in its signalled state and the
    // frame is safe to retry.
    assert!(chain.fences[0].is_signaled());
    // Recording was aborted mid-way, the buffer never became submittable.
    assert!(!chain.command_buffers[0].is_executable());
    let _ = &chain.device;
}

// ============================================================================
// Frame-indexed resources in context
// ============================================================================

#[test]
fn indexed_resources_deref_through_the_graph_cursor() {
    let mut graph = new_task_graph(2);
    let frame = graph.frame_cursor();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let indexed = Indexed::new(vec![10u32, 20u32], frame.clone());
    let seen_for_task = seen.clone();
    graph
        .add_task(Box::new(FunctionTask::new("observe", move || {
            seen_for_task.lock().push(*indexed.get());
            Ok(())
        })))
        .unwrap();
    graph.finalize().unwrap();

    graph.execute_frame().unwrap();
    graph.advance_frame();
    graph.execute_frame().unwrap();
    assert_eq!(*seen.lock(), vec![10, 20]);
    assert_eq!(frame.load(Ordering::Acquire), 1);
}
