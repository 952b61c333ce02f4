use std::sync::Arc;

use slotmap::{SecondaryMap, SlotMap};

use crate::errors::{HeliosError, Result};
use crate::gpu::{
    Command, CommandBuffer, DescriptorPool, DescriptorSet, Device, Pipeline, PipelineBindPoint,
    PipelineSettings, RayTracingPipelineSettings, ShaderModule,
};
use crate::material::descriptors::{allocate_instance_sets, write_instance_sets};
use crate::material::layout::MaterialLayout;
use crate::material::pipelines::PipelineCache;
use crate::material::{BoundResource, DescriptorRef, RayTracingInstanceId, RayTracingMaterialId};

/// Creation parameters for a ray-tracing material: the raygen/miss/hit shader
/// groups and the layout.
#[derive(Debug, Clone)]
pub struct RayTracingMaterialDescriptor {
    pub shaders: Vec<Arc<ShaderModule>>,
    pub layout: MaterialLayout,
}

/// An immutable ray-tracing material.
#[derive(Debug)]
pub struct RayTracingMaterial {
    shaders: Vec<Arc<ShaderModule>>,
    layout: MaterialLayout,
}

impl RayTracingMaterial {
    #[must_use]
    pub fn layout(&self) -> &MaterialLayout {
        &self.layout
    }

    #[must_use]
    pub fn shaders(&self) -> &[Arc<ShaderModule>] {
        &self.shaders
    }
}

/// Creation parameters for a ray-tracing material instance.
#[derive(Debug, Clone, Default)]
pub struct RayTracingInstanceDescriptor {
    pub set_index: u32,
    pub resources: Vec<BoundResource>,
}

/// A ray-tracing material instance bound to one set index of its material.
#[derive(Debug)]
pub struct RayTracingMaterialInstance {
    material: RayTracingMaterialId,
    set_index: u32,
}

impl RayTracingMaterialInstance {
    #[must_use]
    pub const fn material(&self) -> RayTracingMaterialId {
        self.material
    }

    #[must_use]
    pub const fn set_index(&self) -> u32 {
        self.set_index
    }
}

#[derive(Debug)]
struct InstanceData {
    _pool: Arc<DescriptorPool>,
    sets: Vec<Arc<DescriptorSet>>,
}

/// Owns ray-tracing materials and instances plus their descriptor data and
/// pipeline cache.
#[derive(Debug)]
pub struct RayTracingMaterialManager {
    device: Arc<Device>,
    data_set_count: usize,
    materials: SlotMap<RayTracingMaterialId, RayTracingMaterial>,
    instances: SlotMap<RayTracingInstanceId, RayTracingMaterialInstance>,
    instance_data: SecondaryMap<RayTracingInstanceId, InstanceData>,
    pipelines: PipelineCache<RayTracingMaterialId>,
}

impl RayTracingMaterialManager {
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

    pub fn add_material(&mut self, desc: RayTracingMaterialDescriptor) -> RayTracingMaterialId {
        self.materials.insert(RayTracingMaterial {
            shaders: desc.shaders,
            layout: desc.layout,
        })
    }

    #[must_use]
    pub fn material(&self, id: RayTracingMaterialId) -> Option<&RayTracingMaterial> {
        self.materials.get(id)
    }

    pub fn destroy_material(&mut self, id: RayTracingMaterialId) -> Result<()> {
        if !self.materials.contains_key(id) {
            return Err(HeliosError::IncompatibleArgument(
                "material does not belong to this manager",
            ));
        }
        self.pipelines.destroy(id);
        let orphaned: Vec<RayTracingInstanceId> = self
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

    pub fn add_instance(
        &mut self,
        material: RayTracingMaterialId,
        desc: RayTracingInstanceDescriptor,
    ) -> Result<RayTracingInstanceId> {
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

        let (pool, sets) =
            allocate_instance_sets(&self.device, &set_layout, self.data_set_count)?;
        write_instance_sets(&sets, &desc.resources, None);

        let key = self.instances.insert(RayTracingMaterialInstance {
            material,
            set_index: desc.set_index,
        });
        self.instance_data.insert(key, InstanceData { _pool: pool, sets });
        Ok(key)
    }

    #[must_use]
    pub fn instance(&self, id: RayTracingInstanceId) -> Option<&RayTracingMaterialInstance> {
        self.instances.get(id)
    }

    pub fn destroy_instance(&mut self, id: RayTracingInstanceId) -> Result<()> {
        if self.instances.remove(id).is_none() {
            return Err(HeliosError::IncompatibleArgument(
                "instance does not belong to this manager",
            ));
        }
        self.instance_data.remove(id);
        Ok(())
    }

    pub fn ensure_pipeline(&self, id: RayTracingMaterialId) -> Result<Arc<Pipeline>> {
        let material = self.materials.get(id).ok_or(HeliosError::IncompatibleArgument(
            "material does not belong to this manager",
        ))?;
        self.pipelines.ensure(id, || {
            self.device
                .create_pipeline(PipelineSettings::RayTracing(RayTracingPipelineSettings {
                    shaders: material.shaders.clone(),
                    set_layouts: material.layout.set_layouts.clone(),
                    push_constant_ranges: material.layout.push_constant_ranges.clone(),
                }))
        })
    }

    pub fn pipeline(&self, id: RayTracingMaterialId) -> Result<Arc<Pipeline>> {
        self.pipelines.get(id)
    }

    #[must_use]
    pub fn descriptor_set(
        &self,
        instance: RayTracingInstanceId,
        index: usize,
    ) -> Option<&Arc<DescriptorSet>> {
        self.instance_data.get(instance).and_then(|data| data.sets.get(index))
    }

    pub fn bind_descriptors(
        &self,
        refs: &[DescriptorRef<RayTracingInstanceId>],
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
            bind_point: PipelineBindPoint::RayTracing,
            first_set: 0,
            sets,
        })
    }
}
