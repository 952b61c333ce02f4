//! Shared descriptor-pool and descriptor-set helpers for the material
//! managers.

use std::sync::Arc;

use crate::errors::Result;
use crate::gpu::{
    Buffer, DescriptorPool, DescriptorSet, DescriptorSetLayout, DescriptorWrite, Device,
};
use crate::material::BoundResource;

/// Create a pool sized for `count` copies of one declared set and allocate
/// them all.
pub(crate) fn allocate_instance_sets(
    device: &Device,
    layout: &DescriptorSetLayout,
    count: usize,
) -> Result<(Arc<DescriptorPool>, Vec<Arc<DescriptorSet>>)> {
    let pool = device.create_descriptor_pool(count as u32);
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        sets.push(pool.allocate(layout, device.allocate_id())?);
    }
    Ok((pool, sets))
}

/// Write the resources declared by an instance into each of its sets once.
/// Uniform bindings reference the pooled uniform buffer at that set's slice.
pub(crate) fn write_instance_sets(
    sets: &[Arc<DescriptorSet>],
    resources: &[BoundResource],
    uniform_buffer: Option<(&Arc<Buffer>, u64)>,
) {
    for (index, set) in sets.iter().enumerate() {
        let writes = resources.iter().filter_map(|resource| match resource {
            BoundResource::Uniform { binding } => {
                uniform_buffer.map(|(buffer, stride)| DescriptorWrite::UniformBuffer {
                    binding: *binding,
                    buffer: buffer.clone(),
                    offset: stride * index as u64,
                    size: stride,
                })
            }
            BoundResource::StorageBuffer { binding, buffer } => {
                Some(DescriptorWrite::StorageBuffer {
                    binding: *binding,
                    buffer: buffer.clone(),
                })
            }
            BoundResource::StorageImage { binding, image } => Some(DescriptorWrite::StorageImage {
                binding: *binding,
                image: image.clone(),
            }),
            BoundResource::SampledImage { binding, image } => Some(DescriptorWrite::SampledImage {
                binding: *binding,
                image: image.clone(),
            }),
            BoundResource::Sampler { binding, sampler } => Some(DescriptorWrite::Sampler {
                binding: *binding,
                sampler: *sampler,
            }),
            BoundResource::AccelerationStructure { binding, handle } => {
                Some(DescriptorWrite::AccelerationStructure {
                    binding: *binding,
                    handle: *handle,
                })
            }
        });
        set.update(writes);
    }
}
