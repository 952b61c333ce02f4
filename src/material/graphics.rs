use std::sync::Arc;

use slotmap::{SecondaryMap, SlotMap};

use crate::errors::{HeliosError, Result};
use crate::gpu::{
    Buffer, BufferDescriptor, BufferUsage, CommandBuffer, Command, DescriptorPool, DescriptorSet,
    Device, DynamicStateKind, GraphicsPipelineSettings, Pipeline, PipelineBindPoint,
    PipelineSettings, ShaderModule,
};
use crate::material::descriptors::{allocate_instance_sets, write_instance_sets};
use crate::material::layout::MaterialLayout;
use crate::material::pipelines::PipelineCache;
use crate::material::{BoundResource, DescriptorRef, GraphicsInstanceId, GraphicsMaterialId};

/// Uniform slices are aligned the way hardware expects dynamic offsets to be.
const UNIFORM_ALIGNMENT: u64 = 256;

/// Creation parameters for a graphics material.
#[derive(Debug, Clone)]
pub struct GraphicsMaterialDescriptor {
    pub shaders: Vec<Arc<ShaderModule>>,
    pub layout: MaterialLayout,
    pub dynamic_states: Vec<DynamicStateKind>,
}

/// An immutable graphics material: shaders, layout, enabled dynamic states.
#[derive(Debug)]
pub struct GraphicsMaterial {
    shaders: Vec<Arc<ShaderModule>>,
    layout: MaterialLayout,
    dynamic_states: Vec<DynamicStateKind>,
}

impl GraphicsMaterial {
    #[must_use]
    pub fn layout(&self) -> &MaterialLayout {
        &self.layout
    }

    #[must_use]
    pub fn dynamic_states(&self) -> &[DynamicStateKind] {
        &self.dynamic_states
    }

    #[must_use]
    pub fn is_dynamic_state_enabled(&self, kind: DynamicStateKind) -> bool {
        self.dynamic_states.contains(&kind)
    }

    #[must_use]
    pub fn shaders(&self) -> &[Arc<ShaderModule>] {
        &self.shaders
    }
}

/// Creation parameters for a graphics material instance.
#[derive(Debug, Clone, Default)]
pub struct GraphicsInstanceDescriptor {
    /// The single set index this instance provides resources for.
    pub set_index: u32,
    pub resources: Vec<BoundResource>,
    /// CPU-side uniform values, repacked into the pooled uniform buffer by
    /// [`GraphicsMaterialManager::update_uniform_buffers`].
    pub uniform_data: Vec<u8>,
}

/// A graphics material instance bound to one set index of its material.
#[derive(Debug)]
pub struct GraphicsMaterialInstance {
    material: GraphicsMaterialId,
    set_index: u32,
    resources: Vec<BoundResource>,
    uniform_data: Vec<u8>,
    dirty: Vec<bool>,
}

impl GraphicsMaterialInstance {
    #[must_use]
    pub const fn material(&self) -> GraphicsMaterialId {
        self.material
    }

    #[must_use]
    pub const fn set_index(&self) -> u32 {
        self.set_index
    }

    #[must_use]
    pub fn resources(&self) -> &[BoundResource] {
        &self.resources
    }

    #[must_use]
    pub fn uniform_data(&self) -> &[u8] {
        &self.uniform_data
    }
}

#[derive(Debug)]
struct InstanceData {
    // Kept alive for the sets allocated from it.
    _pool: Arc<DescriptorPool>,
    sets: Vec<Arc<DescriptorSet>>,
    uniform: Option<(Arc<Buffer>, u64)>,
}

/// Owns graphics materials and instances, their descriptor data, the pooled
/// uniform storage, and the lazily filled pipeline cache.
#[derive(Debug)]
pub struct GraphicsMaterialManager {
    device: Arc<Device>,
    data_set_count: usize,
    materials: SlotMap<GraphicsMaterialId, GraphicsMaterial>,
    instances: SlotMap<GraphicsInstanceId, GraphicsMaterialInstance>,
    instance_data: SecondaryMap<GraphicsInstanceId, InstanceData>,
    pipelines: PipelineCache<GraphicsMaterialId>,
}

impl GraphicsMaterialManager {
    /// `data_set_count` is the number of per-frame copies kept of every
    /// instance's descriptor set and uniform slice.
    pub fn new(device: Arc<Device>, data_set_count: usize) -> Result<Self> {
        if data_set_count == 0 {
            return Err(HeliosError::InvalidState("data set count must be non-zero"));
        }
        Ok(Self {
            device,
            data_set_count,
            materials: SlotMap::with_key(),
            instances: SlotMap::with_key(),
            instance_data: SecondaryMap::new(),
            pipelines: PipelineCache::new(),
        })
    }

    #[must_use]
    pub const fn data_set_count(&self) -> usize {
        self.data_set_count
    }

    // ========================================================================
    // Materials
    // ========================================================================

    pub fn add_material(&mut self, desc: GraphicsMaterialDescriptor) -> GraphicsMaterialId {
        self.materials.insert(GraphicsMaterial {
            shaders: desc.shaders,
            layout: desc.layout,
            dynamic_states: desc.dynamic_states,
        })
    }

    #[must_use]
    pub fn material(&self, id: GraphicsMaterialId) -> Option<&GraphicsMaterial> {
        self.materials.get(id)
    }

    pub fn destroy_material(&mut self, id: GraphicsMaterialId) -> Result<()> {
        if !self.materials.contains_key(id) {
            return Err(HeliosError::IncompatibleArgument(
                "material does not belong to this manager",
            ));
        }
        self.pipelines.destroy(id);
        let orphaned: Vec<GraphicsInstanceId> = self
            .instances
            .iter()
            .filter(|(_, instance)| instance.material == id)
            .map(|(key, _)| key)
            .collect();
        for instance in orphaned {
            self.instances.remove(instance);
            self.instance_data.remove(instance);
        }
        self.materials.remove(id);
        Ok(())
    }

    // ========================================================================
    // Instances
    // ========================================================================

    pub fn add_instance(
        &mut self,
        material: GraphicsMaterialId,
        desc: GraphicsInstanceDescriptor,
    ) -> Result<GraphicsInstanceId> {
        let mtl = self
            .materials
            .get(material)
            .ok_or(HeliosError::IncompatibleArgument(
                "material does not belong to this manager",
            ))?;
        let set_layout = mtl
            .layout
            .set_layouts
            .get(desc.set_index as usize)
            .ok_or(HeliosError::IncompatibleArgument(
                "instance set index exceeds the material layout",
            ))?
            .clone();

        let uniform = if desc.uniform_data.is_empty() {
            None
        } else {
            let stride = (desc.uniform_data.len() as u64).next_multiple_of(UNIFORM_ALIGNMENT);
            let buffer = self.device.create_buffer(&BufferDescriptor {
                size: stride * self.data_set_count as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::TRANSFER_DST,
                host_visible: true,
            })?;
            Some((buffer, stride))
        };

        let (pool, sets) =
            allocate_instance_sets(&self.device, &set_layout, self.data_set_count)?;
        write_instance_sets(
            &sets,
            &desc.resources,
            uniform.as_ref().map(|(buffer, stride)| (buffer, *stride)),
        );

        let dirty = vec![!desc.uniform_data.is_empty(); self.data_set_count];
        let key = self.instances.insert(GraphicsMaterialInstance {
            material,
            set_index: desc.set_index,
            resources: desc.resources,
            uniform_data: desc.uniform_data,
            dirty,
        });
        self.instance_data.insert(
            key,
            InstanceData {
                _pool: pool,
                sets,
                uniform,
            },
        );
        Ok(key)
    }

    #[must_use]
    pub fn instance(&self, id: GraphicsInstanceId) -> Option<&GraphicsMaterialInstance> {
        self.instances.get(id)
    }

    pub fn destroy_instance(&mut self, id: GraphicsInstanceId) -> Result<()> {
        if self.instances.remove(id).is_none() {
            return Err(HeliosError::IncompatibleArgument(
                "instance does not belong to this manager",
            ));
        }
        self.instance_data.remove(id);
        Ok(())
    }

    /// Replace an instance's CPU-side uniform values, marking every frame
    /// slice dirty.
    pub fn set_uniform_data(&mut self, id: GraphicsInstanceId, bytes: &[u8]) -> Result<()> {
        let instance = self
            .instances
            .get_mut(id)
            .ok_or(HeliosError::IncompatibleArgument(
                "instance does not belong to this manager",
            ))?;
        if instance.uniform_data.len() != bytes.len() {
            return Err(HeliosError::IncompatibleArgument(
                "uniform data size differs from the instance declaration",
            ));
        }
        instance.uniform_data.copy_from_slice(bytes);
        instance.dirty.fill(true);
        Ok(())
    }

    /// Repack dirty uniform bytes into slice `index` of the pooled buffers
    /// and clear that slice's dirty flag.
    pub fn update_uniform_buffers(&mut self, index: usize) -> Result<()> {
        if index >= self.data_set_count {
            return Err(HeliosError::IncompatibleArgument(
                "frame index exceeds the data set count",
            ));
        }
        for (key, instance) in &mut self.instances {
            if !instance.dirty[index] {
                continue;
            }
            if let Some((buffer, stride)) =
                self.instance_data.get(key).and_then(|data| data.uniform.as_ref())
            {
                buffer.write(stride * index as u64, &instance.uniform_data)?;
            }
            instance.dirty[index] = false;
        }
        Ok(())
    }

    // ========================================================================
    // Pipelines & binding
    // ========================================================================

    /// Get the material's pipeline, building it on first use.
    pub fn ensure_pipeline(&self, id: GraphicsMaterialId) -> Result<Arc<Pipeline>> {
        let material = self.materials.get(id).ok_or(HeliosError::IncompatibleArgument(
            "material does not belong to this manager",
        ))?;
        self.pipelines.ensure(id, || {
            self.device
                .create_pipeline(PipelineSettings::Graphics(GraphicsPipelineSettings {
                    shaders: material.shaders.clone(),
                    set_layouts: material.layout.set_layouts.clone(),
                    push_constant_ranges: material.layout.push_constant_ranges.clone(),
                    dynamic_states: material.dynamic_states.clone(),
                }))
        })
    }

    /// Look up a previously created pipeline.
    pub fn pipeline(&self, id: GraphicsMaterialId) -> Result<Arc<Pipeline>> {
        self.pipelines.get(id)
    }

    #[must_use]
    pub fn descriptor_set(
        &self,
        instance: GraphicsInstanceId,
        index: usize,
    ) -> Option<&Arc<DescriptorSet>> {
        self.instance_data.get(instance).and_then(|data| data.sets.get(index))
    }

    /// Bind the `index`-th descriptor set of every referenced instance in a
    /// single recorded bind.
    pub fn bind_descriptors(
        &self,
        refs: &[DescriptorRef<GraphicsInstanceId>],
        cmd: &CommandBuffer,
        _pipeline: &Pipeline,
        index: usize,
    ) -> Result<()> {
        let mut sets = Vec::with_capacity(refs.len());
        for reference in refs {
            let set = self
                .descriptor_set(reference.instance, index)
                .ok_or(HeliosError::IncompatibleArgument(
                    "instance does not belong to this manager",
                ))?;
            sets.push(set.clone());
        }
        cmd.record(Command::BindDescriptorSets {
            bind_point: PipelineBindPoint::Graphics,
            first_set: 0,
            sets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{
        DescriptorBinding, DescriptorKind, DescriptorSetLayout, DeviceDescriptor, ShaderStages,
    };

    fn manager() -> GraphicsMaterialManager {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        GraphicsMaterialManager::new(device, 2).unwrap()
    }

    fn material_descriptor(device: &Device) -> GraphicsMaterialDescriptor {
        let set_layout = DescriptorSetLayout::new(vec![DescriptorBinding {
            binding: 0,
            kind: DescriptorKind::UniformBuffer,
            count: 1,
            stages: ShaderStages::FRAGMENT,
        }]);
        GraphicsMaterialDescriptor {
            shaders: vec![
                device.create_shader_module(ShaderStages::VERTEX),
                device.create_shader_module(ShaderStages::FRAGMENT),
            ],
            layout: MaterialLayout::new(vec![set_layout], vec![]),
            dynamic_states: vec![],
        }
    }

    #[test]
    fn add_instance_allocates_one_set_per_data_set() {
        let mut manager = manager();
        let material = manager.add_material(material_descriptor(&manager.device));
        let instance = manager
            .add_instance(
                material,
                GraphicsInstanceDescriptor {
                    set_index: 0,
                    resources: vec![BoundResource::Uniform { binding: 0 }],
                    uniform_data: vec![0; 64],
                },
            )
            .unwrap();
        assert!(manager.descriptor_set(instance, 0).is_some());
        assert!(manager.descriptor_set(instance, 1).is_some());
        assert!(manager.descriptor_set(instance, 2).is_none());
        // The declared resources were written once per set.
        assert_eq!(manager.descriptor_set(instance, 0).unwrap().write_count(), 1);
    }

    #[test]
    fn instance_set_index_is_validated() {
        let mut manager = manager();
        let material = manager.add_material(material_descriptor(&manager.device));
        let result = manager.add_instance(
            material,
            GraphicsInstanceDescriptor {
                set_index: 3,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(HeliosError::IncompatibleArgument(_))));
    }

    #[test]
    fn uniform_update_clears_only_the_written_slice() {
        let mut manager = manager();
        let material = manager.add_material(material_descriptor(&manager.device));
        let instance = manager
            .add_instance(
                material,
                GraphicsInstanceDescriptor {
                    set_index: 0,
                    resources: vec![BoundResource::Uniform { binding: 0 }],
                    uniform_data: vec![7; 16],
                },
            )
            .unwrap();
        manager.update_uniform_buffers(0).unwrap();
        assert!(!manager.instance(instance).unwrap().dirty[0]);
        assert!(manager.instance(instance).unwrap().dirty[1]);
        manager.update_uniform_buffers(1).unwrap();
        assert!(!manager.instance(instance).unwrap().dirty[1]);
    }

    #[test]
    fn destroy_material_removes_its_instances_and_pipeline() {
        let mut manager = manager();
        let material = manager.add_material(material_descriptor(&manager.device));
        let instance = manager
            .add_instance(material, GraphicsInstanceDescriptor::default())
            .unwrap();
        manager.ensure_pipeline(material).unwrap();

        manager.destroy_material(material).unwrap();
        assert!(manager.material(material).is_none());
        assert!(manager.instance(instance).is_none());
        assert!(matches!(
            manager.ensure_pipeline(material),
            Err(HeliosError::IncompatibleArgument(_))
        ));
    }
}
