//! Compute render data, traverser and renderer.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{Command, CommandBuffer};
use crate::material::{
    ComputeInstanceId, ComputeMaterialId, ComputeMaterialManager, DescriptorRef,
};
use crate::render::traverser::{
    apply_general, apply_type, visit_everything, MaskPredicate, TraversalAction, TraversalStack,
};
use crate::scene::{NodeKey, NodeKind, SceneGraph};

/// One dispatch emitted by the compute traverser.
#[derive(Debug, Clone)]
pub struct ComputeDraw {
    pub group_count: [u32; 3],
    pub material: ComputeMaterialId,
    pub descriptor_offset: usize,
}

/// Flat per-frame output of a compute traversal.
#[derive(Debug, Default)]
pub struct ComputeRenderData {
    pub draws: Vec<ComputeDraw>,
    pub descriptors: Vec<DescriptorRef<ComputeInstanceId>>,
}

impl ComputeRenderData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.draws.clear();
        self.descriptors.clear();
    }
}

/// Depth-first traverser producing [`ComputeRenderData`].
pub struct ComputeTraverser {
    general_mask: MaskPredicate,
    type_mask: MaskPredicate,
    material_stack: TraversalStack<ComputeInstanceId>,
}

impl Default for ComputeTraverser {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeTraverser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            general_mask: visit_everything(),
            type_mask: visit_everything(),
            material_stack: TraversalStack::default(),
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
            NodeKind::Empty | NodeKind::ComputeMaterial | NodeKind::ComputeDispatch
        )
    }

    /// Clear `data` and linearize `graph` into it.
    pub fn traverse(
        &mut self,
        graph: &SceneGraph,
        manager: &ComputeMaterialManager,
        data: &mut ComputeRenderData,
    ) {
        data.clear();
        self.material_stack.clear();

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
                match node.kind() {
                    NodeKind::ComputeMaterial => {
                        if let Some(instance) = node.compute_instance() {
                            if manager.instance(instance).is_some() {
                                self.material_stack.push(graph, key, instance);
                            }
                        }
                    }
                    NodeKind::ComputeDispatch => {
                        if let Some(group_count) = node.dispatch_group_count() {
                            self.emit(graph, manager, data, key, group_count);
                        }
                    }
                    _ => {}
                }
            }
            if descend {
                stack.extend(node.children().iter().rev());
            }
        }
    }

    fn emit(
        &mut self,
        graph: &SceneGraph,
        manager: &ComputeMaterialManager,
        data: &mut ComputeRenderData,
        key: NodeKey,
        group_count: [u32; 3],
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

        let set_count = layout.set_count();
        let mut slots: SmallVec<[Option<DescriptorRef<ComputeInstanceId>>; 4]> =
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
                || manager
                    .material(instance.material())
                    .is_some_and(|other| layout.compat_prefix(other.layout()) > set_index);
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

        let descriptor_offset = data.descriptors.len();
        data.descriptors
            .extend(slots.into_iter().map(|slot| slot.expect("slot resolved")));
        data.draws.push(ComputeDraw {
            group_count,
            material: material_id,
            descriptor_offset,
        });
    }
}

/// Records a command buffer from compute render data.
#[derive(Debug, Default)]
pub struct ComputeRenderer;

impl ComputeRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn record(
        &self,
        manager: &ComputeMaterialManager,
        data: &ComputeRenderData,
        cmd: &CommandBuffer,
        frame_index: usize,
    ) -> Result<()> {
        cmd.reset();
        cmd.begin()?;
        for draw in &data.draws {
            let pipeline = manager.ensure_pipeline(draw.material)?;
            cmd.record(Command::BindPipeline {
                pipeline: pipeline.clone(),
            })?;
            let set_count = manager
                .material(draw.material)
                .expect("draw references a live material")
                .layout()
                .set_count();
            manager.bind_descriptors(
                &data.descriptors[draw.descriptor_offset..draw.descriptor_offset + set_count],
                cmd,
                &pipeline,
                frame_index,
            )?;
            cmd.record(Command::Dispatch {
                group_count: draw.group_count,
            })?;
        }
        cmd.end()
    }
}
