//! Graphics render data, traverser and renderer.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{Command, CommandBuffer, DynamicState, RenderingInfo, ShaderStages};
use crate::material::{
    DescriptorRef, GraphicsInstanceId, GraphicsMaterialId, GraphicsMaterialManager,
};
use crate::render::mesh::Mesh;
use crate::render::traverser::{
    apply_general, apply_type, visit_everything, MaskPredicate, TraversalAction, TraversalStack,
};
use crate::scene::{NodeKey, NodeKind, SceneGraph};

/// One draw emitted by the graphics traverser. The offsets index the flat
/// arrays of [`GraphicsRenderData`]; each covers as many entries as the
/// material declares.
#[derive(Debug, Clone)]
pub struct GraphicsDraw {
    pub mesh: Arc<Mesh>,
    pub material: GraphicsMaterialId,
    pub descriptor_offset: usize,
    pub push_constant_offset: usize,
    pub dynamic_state_offset: usize,
}

/// A resolved push-constant range: where its bytes live in
/// [`GraphicsRenderData::push_constant_data`] and the stages it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantSlot {
    pub data_offset: usize,
    pub stages: ShaderStages,
}

/// Flat per-frame output of a graphics traversal, consumed by
/// [`GraphicsRenderer`].
///
/// After a traversal every draw's reserved ranges are fully populated; a
/// leaf whose requirements cannot be resolved is not emitted and leaves no
/// partial entries behind.
#[derive(Debug, Default)]
pub struct GraphicsRenderData {
    pub draws: Vec<GraphicsDraw>,
    pub descriptors: Vec<DescriptorRef<GraphicsInstanceId>>,
    pub push_constant_ranges: Vec<PushConstantSlot>,
    pub push_constant_data: Vec<u8>,
    pub dynamic_states: Vec<DynamicState>,
    pub dynamic_state_references: Vec<usize>,
}

impl GraphicsRenderData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.draws.clear();
        self.descriptors.clear();
        self.push_constant_ranges.clear();
        self.push_constant_data.clear();
        self.dynamic_states.clear();
        self.dynamic_state_references.clear();
    }
}

/// Payload of a push-constant stack entry: the providing material, the range
/// it covers, and where its bytes were spilled.
#[derive(Debug, Clone, Copy)]
struct PushConstantEntry {
    material: GraphicsMaterialId,
    range_index: u32,
    stages: ShaderStages,
    data_offset: usize,
}

/// Payload of a dynamic-state stack entry: the slice of
/// [`GraphicsRenderData::dynamic_states`] spilled for the node.
#[derive(Debug, Clone, Copy)]
struct DynamicStateEntry {
    offset: usize,
    count: usize,
}

/// Depth-first traverser producing [`GraphicsRenderData`].
pub struct GraphicsTraverser {
    general_mask: MaskPredicate,
    type_mask: MaskPredicate,
    material_stack: TraversalStack<GraphicsInstanceId>,
    push_constant_stack: TraversalStack<PushConstantEntry>,
    state_stack: TraversalStack<DynamicStateEntry>,
}

impl Default for GraphicsTraverser {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsTraverser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            general_mask: visit_everything(),
            type_mask: visit_everything(),
            material_stack: TraversalStack::default(),
            push_constant_stack: TraversalStack::default(),
            state_stack: TraversalStack::default(),
        }
    }

    pub fn set_general_mask_predicate(
        &mut self,
        predicate: impl Fn(u64) -> TraversalAction + Send + 'static,
    ) {
        self.general_mask = Box::new(predicate);
    }

    pub fn set_type_mask_predicate(
        &mut self,
        predicate: impl Fn(u64) -> TraversalAction + Send + 'static,
    ) {
        self.type_mask = Box::new(predicate);
    }

    const fn supports(kind: NodeKind) -> bool {
        matches!(
            kind,
            NodeKind::Empty
                | NodeKind::GraphicsDynamicState
                | NodeKind::GraphicsMaterial
                | NodeKind::GraphicsPushConstant
                | NodeKind::Mesh
        )
    }

    /// Clear `data` and linearize `graph` into it. Draw order equals the
    /// depth-first visit order of emitting leaves.
    pub fn traverse(
        &mut self,
        graph: &SceneGraph,
        manager: &GraphicsMaterialManager,
        data: &mut GraphicsRenderData,
    ) {
        data.clear();
        self.material_stack.clear();
        self.push_constant_stack.clear();
        self.state_stack.clear();

        let mut stack = vec![graph.root()];
        while let Some(key) = stack.pop() {
            let Some(node) = graph.node(key) else { continue };

            let (mut visit, mut descend) = apply_general((self.general_mask)(node.general_mask()));
            if !visit && !descend {
                continue;
            }

            let supported = Self::supports(node.kind());
            if supported {
                (visit, descend) = apply_type((self.type_mask)(node.type_mask()), visit, descend);
            } else {
                visit = false;
            }
            if !visit && !descend {
                continue;
            }

            if supported && visit {
                self.visit_node(graph, manager, data, key);
            }
            if descend {
                stack.extend(node.children().iter().rev());
            }
        }
    }

    fn visit_node(
        &mut self,
        graph: &SceneGraph,
        manager: &GraphicsMaterialManager,
        data: &mut GraphicsRenderData,
        key: NodeKey,
    ) {
        let Some(node) = graph.node(key) else { return };
        match node.kind() {
            NodeKind::GraphicsDynamicState => {
                let states = node.dynamic_states().unwrap_or_default();
                if !states.is_empty() {
                    let offset = data.dynamic_states.len();
                    data.dynamic_states.extend(states.iter().cloned());
                    self.state_stack.push(
                        graph,
                        key,
                        DynamicStateEntry {
                            offset,
                            count: states.len(),
                        },
                    );
                }
            }
            NodeKind::GraphicsMaterial => {
                if let Some(instance) = node.graphics_instance() {
                    if manager.instance(instance).is_some() {
                        self.material_stack.push(graph, key, instance);
                    }
                }
            }
            NodeKind::GraphicsPushConstant => {
                if let Some((material, range_index, stages, bytes)) = node.push_constant() {
                    let Some(range) = manager
                        .material(material)
                        .and_then(|m| m.layout().push_constant_ranges.get(range_index as usize))
                    else {
                        return;
                    };
                    if bytes.len() != range.size as usize {
                        return;
                    }
                    let data_offset = data.push_constant_data.len();
                    data.push_constant_data.extend_from_slice(bytes);
                    self.push_constant_stack.push(
                        graph,
                        key,
                        PushConstantEntry {
                            material,
                            range_index,
                            stages,
                            data_offset,
                        },
                    );
                }
            }
            NodeKind::Mesh => {
                if let Some(mesh) = node.mesh() {
                    self.emit(graph, manager, data, key, mesh.clone());
                }
            }
            _ => {}
        }
    }

    /// Resolve descriptors, push constants and dynamic states for a mesh
    /// leaf and append one draw. Resolution happens in scratch buffers so a
    /// leaf that cannot be completed leaves the render data untouched.
    fn emit(
        &mut self,
        graph: &SceneGraph,
        manager: &GraphicsMaterialManager,
        data: &mut GraphicsRenderData,
        key: NodeKey,
        mesh: Arc<Mesh>,
    ) {
        let Some(active_index) = self.material_stack.active_for(graph, key) else {
            return;
        };
        let active_instance = self.material_stack.entry(active_index).payload;
        let Some(material_id) = manager.instance(active_instance).map(|i| i.material()) else {
            return;
        };
        let Some(material) = manager.material(material_id) else {
            return;
        };
        let layout = material.layout();

        // Walk the material stack upwards, filling one slot per set index
        // with the closest compatible instance.
        let set_count = layout.set_count();
        let mut slots: SmallVec<[Option<DescriptorRef<GraphicsInstanceId>>; 4]> =
            smallvec::smallvec![None; set_count];
        let mut missing = set_count;
        let mut cursor = Some(active_index);
        while let Some(index) = cursor {
            if missing == 0 {
                break;
            }
            let entry = self.material_stack.entry(index);
            cursor = entry.parent;
            let Some(instance) = manager.instance(entry.payload) else {
                continue;
            };
            let set_index = instance.set_index() as usize;
            if set_index >= set_count || slots[set_index].is_some() {
                continue;
            }
            let compatible = instance.material() == material_id
                || manager.material(instance.material()).is_some_and(|other| {
                    layout.compat_prefix(other.layout()) > set_index
                        && layout.push_constants_compatible(other.layout())
                });
            if compatible {
                slots[set_index] = Some(DescriptorRef {
                    instance: entry.payload,
                    set_index: set_index as u32,
                });
                missing -= 1;
            }
        }
        if missing > 0 {
            return;
        }

        // Walk the push-constant stack upwards, one slot per declared range.
        let push_constant_count = layout.push_constant_count();
        let mut push_constants: SmallVec<[Option<PushConstantSlot>; 4]> =
            smallvec::smallvec![None; push_constant_count];
        let mut missing = push_constant_count;
        let mut cursor = self.push_constant_stack.active_for(graph, key);
        while let Some(index) = cursor {
            if missing == 0 {
                break;
            }
            let entry = self.push_constant_stack.entry(index);
            cursor = entry.parent;
            let provider = entry.payload;
            let compatible = provider.material == material_id
                || manager
                    .material(provider.material)
                    .is_some_and(|other| layout.push_constants_compatible(other.layout()));
            if !compatible {
                continue;
            }
            let range = provider.range_index as usize;
            if range < push_constant_count && push_constants[range].is_none() {
                push_constants[range] = Some(PushConstantSlot {
                    data_offset: provider.data_offset,
                    stages: provider.stages,
                });
                missing -= 1;
            }
        }
        if missing > 0 {
            return;
        }

        // Walk the dynamic-state stack upwards; a state kind set by a closer
        // node shadows the same kind further up.
        let state_count = material.dynamic_states().len();
        let mut states: SmallVec<[usize; 4]> = SmallVec::new();
        let mut cursor = self.state_stack.active_for(graph, key);
        while let Some(index) = cursor {
            if states.len() == state_count {
                break;
            }
            let entry = self.state_stack.entry(index);
            cursor = entry.parent;
            let DynamicStateEntry { offset, count } = entry.payload;
            for state_index in offset..offset + count {
                let kind = data.dynamic_states[state_index].kind();
                if !material.is_dynamic_state_enabled(kind) {
                    continue;
                }
                if states
                    .iter()
                    .any(|&seen| data.dynamic_states[seen].kind() == kind)
                {
                    continue;
                }
                states.push(state_index);
                if states.len() == state_count {
                    break;
                }
            }
        }
        if states.len() < state_count {
            return;
        }

        // Everything resolved; append atomically.
        let descriptor_offset = data.descriptors.len();
        data.descriptors
            .extend(slots.into_iter().map(|slot| slot.expect("slot resolved")));
        let push_constant_offset = data.push_constant_ranges.len();
        data.push_constant_ranges
            .extend(push_constants.into_iter().map(|slot| slot.expect("slot resolved")));
        let dynamic_state_offset = data.dynamic_state_references.len();
        data.dynamic_state_references.extend(states);

        data.draws.push(GraphicsDraw {
            mesh,
            material: material_id,
            descriptor_offset,
            push_constant_offset,
            dynamic_state_offset,
        });
    }
}

/// Records a command buffer from graphics render data.
#[derive(Debug, Default)]
pub struct GraphicsRenderer;

impl GraphicsRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Reset `cmd` and record the full frame: begin rendering, then per draw
    /// bind pipeline, dynamic states, descriptors and push constants, and
    /// draw the mesh.
    pub fn record(
        &self,
        manager: &GraphicsMaterialManager,
        data: &GraphicsRenderData,
        cmd: &CommandBuffer,
        frame_index: usize,
        info: &RenderingInfo,
    ) -> Result<()> {
        cmd.reset();
        cmd.begin()?;
        cmd.record(Command::BeginRendering { info: info.clone() })?;

        for draw in &data.draws {
            let pipeline = manager.ensure_pipeline(draw.material)?;
            cmd.record(Command::BindPipeline {
                pipeline: pipeline.clone(),
            })?;

            let material = manager
                .material(draw.material)
                .expect("draw references a live material");
            let state_count = material.dynamic_states().len();
            for &state in &data.dynamic_state_references
                [draw.dynamic_state_offset..draw.dynamic_state_offset + state_count]
            {
                cmd.record(Command::SetDynamicState {
                    state: data.dynamic_states[state].clone(),
                })?;
            }

            let set_count = material.layout().set_count();
            manager.bind_descriptors(
                &data.descriptors[draw.descriptor_offset..draw.descriptor_offset + set_count],
                cmd,
                &pipeline,
                frame_index,
            )?;

            for (range_index, range) in material.layout().push_constant_ranges.iter().enumerate() {
                let slot = data.push_constant_ranges[draw.push_constant_offset + range_index];
                let bytes = &data.push_constant_data
                    [slot.data_offset..slot.data_offset + range.size as usize];
                cmd.record(Command::PushConstants {
                    stages: slot.stages,
                    offset: range.offset,
                    data: bytes.to_vec(),
                })?;
            }

            if draw.mesh.is_indexed() {
                cmd.record(Command::DrawIndexed {
                    index_count: draw.mesh.index_count(),
                    instance_count: 1,
                    first_index: 0,
                    vertex_offset: 0,
                    first_instance: 0,
                })?;
            } else {
                cmd.record(Command::Draw {
                    vertex_count: draw.mesh.vertex_count(),
                    instance_count: 1,
                    first_vertex: 0,
                    first_instance: 0,
                })?;
            }
        }

        cmd.record(Command::EndRendering)?;
        cmd.end()
    }
}
